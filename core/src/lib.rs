pub mod device;
pub mod error;
pub mod test_utils;

pub use device::{FileDevice, SectorDevice};
pub use error::DefragError;
