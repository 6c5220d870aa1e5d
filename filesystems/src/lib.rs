pub mod fat32;
pub mod test_helpers;

pub use fat32::{analyze, AnalysisReport, Catalog, DefragEngine, Fat32Volume};
