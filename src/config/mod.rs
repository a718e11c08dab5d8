mod loader;

pub use loader::{
    BinaryConfig, Categories, Config, FilterConfig, ReportConfig, ScanConfig, STAGE_NAMES,
};
