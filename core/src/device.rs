// Sector-level access to a volume image.
// Everything above this layer addresses the image in whole sectors; a short
// read or write is reported as an error, never as a silent partial transfer.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::info;

use crate::error::DefragError;

/// Dumb byte-range primitive over sector-aligned transfers.
///
/// `buf` must be exactly `count * bytes_per_sector` bytes long; implementors
/// transfer the full range or fail.
pub trait SectorDevice {
    fn read_sectors(
        &mut self,
        lba: u64,
        count: u32,
        bytes_per_sector: u32,
        buf: &mut [u8],
    ) -> Result<(), DefragError>;

    fn write_sectors(
        &mut self,
        lba: u64,
        count: u32,
        bytes_per_sector: u32,
        buf: &[u8],
    ) -> Result<(), DefragError>;
}

/// A FAT32 volume image backed by a regular file.
pub struct FileDevice {
    file: File,
    path: String,
}

impl FileDevice {
    /// Open an image file read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DefragError> {
        let path_str = path.as_ref().display().to_string();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        info!("Opened image file: {}", path_str);
        Ok(FileDevice {
            file,
            path: path_str,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SectorDevice for FileDevice {
    fn read_sectors(
        &mut self,
        lba: u64,
        count: u32,
        bytes_per_sector: u32,
        buf: &mut [u8],
    ) -> Result<(), DefragError> {
        debug_assert_eq!(buf.len(), (count * bytes_per_sector) as usize);
        self.file
            .seek(SeekFrom::Start(lba * bytes_per_sector as u64))?;
        // read_exact either fills the buffer or errors with UnexpectedEof,
        // which is the short-count signal the upper layers rely on.
        self.file.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DefragError::ShortTransfer {
                    lba,
                    got: 0,
                    wanted: count,
                }
            } else {
                DefragError::IoError(e)
            }
        })?;
        Ok(())
    }

    fn write_sectors(
        &mut self,
        lba: u64,
        count: u32,
        bytes_per_sector: u32,
        buf: &[u8],
    ) -> Result<(), DefragError> {
        debug_assert_eq!(buf.len(), (count * bytes_per_sector) as usize);
        self.file
            .seek(SeekFrom::Start(lba * bytes_per_sector as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}
