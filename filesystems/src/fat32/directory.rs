// Directory cluster codec: fixed 32-byte records, decoded in place.
// Decoding the same bytes twice is pure; nothing here touches the device.

use byteorder::{ByteOrder, LittleEndian};

use super::constants::{ATTR_DIRECTORY, ATTR_LONG_NAME, DIR_ENTRY_ERASED, DIR_ENTRY_SIZE};

// Field offsets within a 32-byte directory record. The start cluster is
// split across two 16-bit halves.
const NAME_OFFSET: usize = 0;
const ATTR_OFFSET: usize = 11;
const START_CLUSTER_HI_OFFSET: usize = 20;
const START_CLUSTER_LO_OFFSET: usize = 26;

/// Borrowed view of one 32-byte directory record.
#[derive(Clone, Copy)]
pub struct DirEntry<'a> {
    bytes: &'a [u8],
}

impl<'a> DirEntry<'a> {
    pub fn name(&self) -> &[u8] {
        &self.bytes[NAME_OFFSET..NAME_OFFSET + 11]
    }

    pub fn attributes(&self) -> u8 {
        self.bytes[ATTR_OFFSET]
    }

    /// First name byte 0x00 marks the end of the directory listing.
    pub fn is_end_marker(&self) -> bool {
        self.bytes[NAME_OFFSET] == 0x00
    }

    pub fn is_erased(&self) -> bool {
        self.bytes[NAME_OFFSET] == DIR_ENTRY_ERASED
    }

    pub fn is_long_name_fragment(&self) -> bool {
        self.attributes() == ATTR_LONG_NAME
    }

    /// "." or ".." self/parent references.
    pub fn is_dot_entry(&self) -> bool {
        &self.bytes[..8] == b".       " || &self.bytes[..8] == b"..      "
    }

    /// A record the analysis walk cares about: present, not a long-name
    /// fragment, and not a "." / ".." reference.
    pub fn is_significant(&self) -> bool {
        !self.is_end_marker()
            && !self.is_erased()
            && !self.is_long_name_fragment()
            && !self.is_dot_entry()
    }

    pub fn is_directory(&self) -> bool {
        self.attributes() & ATTR_DIRECTORY != 0
    }

    pub fn start_cluster(&self) -> u32 {
        let hi = LittleEndian::read_u16(&self.bytes[START_CLUSTER_HI_OFFSET..]) as u32;
        let lo = LittleEndian::read_u16(&self.bytes[START_CLUSTER_LO_OFFSET..]) as u32;
        (hi << 16) | lo
    }
}

/// Decode a directory cluster's raw bytes into its ordered records.
pub fn entries(cluster: &[u8]) -> impl Iterator<Item = DirEntry<'_>> {
    cluster
        .chunks_exact(DIR_ENTRY_SIZE)
        .map(|bytes| DirEntry { bytes })
}

/// Record at `index` within a directory cluster.
pub fn entry_at(cluster: &[u8], index: usize) -> DirEntry<'_> {
    DirEntry {
        bytes: &cluster[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE],
    }
}

/// Rewrite the start-cluster field of the record at `index`, splitting the
/// value back into its two 16-bit halves.
pub fn set_entry_start_cluster(cluster: &mut [u8], index: usize, value: u32) {
    let base = index * DIR_ENTRY_SIZE;
    LittleEndian::write_u16(
        &mut cluster[base + START_CLUSTER_HI_OFFSET..],
        (value >> 16) as u16,
    );
    LittleEndian::write_u16(
        &mut cluster[base + START_CLUSTER_LO_OFFSET..],
        (value & 0xFFFF) as u16,
    );
}
