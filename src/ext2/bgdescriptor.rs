//! Block group descriptor codec.
//!
//! Descriptors are 32-byte records stored consecutively in the Block Group
//! Descriptor Table (BGDT), which occupies the block following the
//! superblock.

use crate::Result;
use crate::cursor::Cursor;

/// The size of one descriptor record on disk.
pub const DESCRIPTOR_SIZE: usize = 32;

/// A block group descriptor, locating one group's metadata structures.
#[derive(Clone)]
pub struct BlockGroupDescriptor {
    /// The block address of the block usage bitmap.
    pub block_usage_bitmap_addr: u32,
    /// The block address of the inode usage bitmap.
    pub inode_usage_bitmap_addr: u32,
    /// Starting block address of the inode table.
    pub inode_table_start_addr: u32,
    /// Number of unallocated blocks in the group.
    pub unallocated_blocks_number: u16,
    /// Number of unallocated inodes in the group.
    pub unallocated_inodes_number: u16,
    /// Number of directories in the group.
    pub directories_number: u16,
}

impl BlockGroupDescriptor {
    /// Decodes one descriptor at the cursor's position, advancing by the
    /// full 32-byte record (14 reserved bytes included).
    pub fn read(cursor: &mut Cursor) -> Result<Self> {
        let desc = Self {
            block_usage_bitmap_addr: cursor.read_u32()?,
            inode_usage_bitmap_addr: cursor.read_u32()?,
            inode_table_start_addr: cursor.read_u32()?,
            unallocated_blocks_number: cursor.read_u16()?,
            unallocated_inodes_number: cursor.read_u16()?,
            directories_number: cursor.read_u16()?,
        };
        cursor.skip(14)?;
        Ok(desc)
    }

    /// Decodes `count` consecutive descriptors.
    pub fn read_table(count: u32, cursor: &mut Cursor) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::read(cursor)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_table() {
        let mut buf = vec![0; 64];
        buf[0] = 3; // block bitmap
        buf[4] = 4; // inode bitmap
        buf[8] = 5; // inode table
        buf[12] = 10; // free blocks
        buf[14] = 20; // free inodes
        buf[16] = 2; // dir inodes
        buf[32] = 103; // next record

        let mut cursor = Cursor::new(buf);
        let table = BlockGroupDescriptor::read_table(2, &mut cursor).unwrap();

        assert_eq!(cursor.pos(), 64);
        assert_eq!(table[0].block_usage_bitmap_addr, 3);
        assert_eq!(table[0].inode_usage_bitmap_addr, 4);
        assert_eq!(table[0].inode_table_start_addr, 5);
        assert_eq!(table[0].unallocated_blocks_number, 10);
        assert_eq!(table[0].unallocated_inodes_number, 20);
        assert_eq!(table[0].directories_number, 2);
        assert_eq!(table[1].block_usage_bitmap_addr, 103);
    }
}
