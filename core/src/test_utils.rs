// Test helpers shared by the workspace's unit tests.

use crate::device::SectorDevice;
use crate::error::DefragError;

/// In-memory sector device for tests that don't need a real image file.
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    pub fn new(size: usize) -> Self {
        MemoryDevice {
            data: vec![0u8; size],
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        MemoryDevice { data }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl SectorDevice for MemoryDevice {
    fn read_sectors(
        &mut self,
        lba: u64,
        count: u32,
        bytes_per_sector: u32,
        buf: &mut [u8],
    ) -> Result<(), DefragError> {
        let start = (lba * bytes_per_sector as u64) as usize;
        let len = (count * bytes_per_sector) as usize;
        if start + len > self.data.len() {
            return Err(DefragError::ShortTransfer {
                lba,
                got: 0,
                wanted: count,
            });
        }
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(())
    }

    fn write_sectors(
        &mut self,
        lba: u64,
        count: u32,
        bytes_per_sector: u32,
        buf: &[u8],
    ) -> Result<(), DefragError> {
        let start = (lba * bytes_per_sector as u64) as usize;
        let len = (count * bytes_per_sector) as usize;
        if start + len > self.data.len() {
            return Err(DefragError::ShortTransfer {
                lba,
                got: 0,
                wanted: count,
            });
        }
        self.data[start..start + len].copy_from_slice(&buf[..len]);
        Ok(())
    }
}
