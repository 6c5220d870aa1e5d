pub mod analyzer;
pub mod boot_sector;
pub mod catalog;
pub mod constants;
pub mod defrag;
pub mod directory;
pub mod volume;

pub use analyzer::{analyze, chain_stats, AnalysisReport, ChainStats};
pub use boot_sector::{FatType, VolumeGeometry};
pub use catalog::{Catalog, CatalogEntry};
pub use defrag::{DefragEngine, ProgressCallback};
pub use volume::Fat32Volume;
