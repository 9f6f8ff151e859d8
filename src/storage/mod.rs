mod scan;
pub mod store;

pub use store::{RecordStore, ScanProgress};
