// FAT32 on-disk constants.

// Boot sector / BPB field offsets
pub const BPB_BYTES_PER_SEC: usize = 0x0B;
pub const BPB_SEC_PER_CLUS: usize = 0x0D;
pub const BPB_RSVD_SEC_CNT: usize = 0x0E;
pub const BPB_NUM_FATS: usize = 0x10;
pub const BPB_ROOT_ENT_CNT: usize = 0x11;
pub const BPB_TOT_SEC16: usize = 0x13;
pub const BPB_FAT_SZ16: usize = 0x16;
pub const BPB_TOT_SEC32: usize = 0x20;
pub const BPB_FAT_SZ32: usize = 0x24;
pub const BPB_EXT_FLAGS: usize = 0x28;
pub const BPB_ROOT_CLUS: usize = 0x2C;
pub const BS32_FIL_SYS_TYPE: usize = 0x52;

// Boot sector signature
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

// FAT32 entries are 32 bits on disk but only the low 28 are meaningful;
// the top nibble is reserved and must be preserved on writes.
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;
pub const FAT32_RESERVED_MASK: u32 = 0xF000_0000;

// FAT entry values (after masking to 28 bits)
pub const FAT32_FREE: u32 = 0x0000_0000;
pub const FAT32_RESERVED: u32 = 0x0000_0001;
pub const FAT32_BAD: u32 = 0x0FFF_FFF7;
pub const FAT32_EOC_MIN: u32 = 0x0FFF_FFF8; // values >= this end a chain

// ext_flags: bit 7 clear = FAT mirroring enabled, low nibble = active FAT
pub const EXT_FLAGS_NO_MIRRORING: u16 = 0x0080;
pub const EXT_FLAGS_ACTIVE_FAT_MASK: u16 = 0x000F;

// Cluster count thresholds (FAT type determination)
pub const FAT12_MAX_CLUSTERS: u32 = 4084;
pub const FAT16_MAX_CLUSTERS: u32 = 65524;

// Directory entries
pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_ENTRY_ERASED: u8 = 0xE5;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// Is `value` an end-of-chain marker?
#[inline]
pub fn is_end_of_chain(value: u32) -> bool {
    value >= FAT32_EOC_MIN
}
