//! Block groups.
//!
//! The filesystem is divided into groups of `blocks_per_group` blocks; each
//! group carries a copy of the superblock, the descriptor table, a block
//! usage bitmap, an inode usage bitmap and an inode table. Reading a group
//! decodes and caches all of its metadata; file and directory contents are
//! then served from the shared image through the group's data cursor.

use crate::Error;
use crate::Result;
use crate::bgdescriptor::BlockGroupDescriptor;
use crate::bgdescriptor::DESCRIPTOR_SIZE;
use crate::cursor::Cursor;
use crate::dir;
use crate::dir::DirEntry;
use crate::inode;
use crate::inode::Inode;
use crate::superblock::Superblock;
use crate::term;

/// A block group's decoded metadata.
pub struct BlockGroup {
    /// The group's number.
    num: u32,
    /// The filesystem's superblock.
    pub sb: Superblock,
    /// The group's descriptor.
    pub desc: BlockGroupDescriptor,

    /// Block usage bitmap, one bit per block of the group.
    block_bitmap: Vec<u8>,
    /// Inode usage bitmap, one bit per inode of the group.
    inode_bitmap: Vec<u8>,
    /// The decoded inode table.
    inodes: Vec<Inode>,

    /// Cursor over the image for data block access.
    data: Cursor,
}

impl BlockGroup {
    /// Reads the metadata of group `num`.
    ///
    /// `cursor` must be positioned at the end of the boot area (byte 1024),
    /// where the superblock starts.
    pub fn read(num: u32, cursor: &mut Cursor) -> Result<Self> {
        let sb = Superblock::read(cursor)?;
        let block_size = sb.get_block_size() as usize;

        // On larger block sizes the superblock shares block 0 with the boot
        // area and the descriptor table starts at block 1
        if block_size != 1024 {
            cursor.seek(block_size)?;
        }
        cursor.skip(num as usize * DESCRIPTOR_SIZE)?;
        let desc = BlockGroupDescriptor::read(cursor)?;

        let mut block_bitmap = vec![0; block_size];
        cursor.seek(desc.block_usage_bitmap_addr as usize * block_size)?;
        cursor.copy(&mut block_bitmap)?;

        let mut inode_bitmap = vec![0; block_size];
        cursor.seek(desc.inode_usage_bitmap_addr as usize * block_size)?;
        cursor.copy(&mut inode_bitmap)?;

        cursor.seek(desc.inode_table_start_addr as usize * block_size)?;
        let tail = sb.get_inode_size() as usize - 128;
        let mut inodes = Vec::with_capacity(sb.inodes_per_group as usize);
        for _ in 0..sb.inodes_per_group {
            inodes.push(Inode::read(cursor)?);
            cursor.skip(tail)?;
        }

        let data = cursor.clone();
        Ok(Self {
            num,
            sb,
            desc,
            block_bitmap,
            inode_bitmap,
            inodes,
            data,
        })
    }

    /// Returns the byte offset of the filesystem block `block` within the
    /// image.
    pub fn offset_block(&self, block: u32) -> usize {
        block as usize * self.sb.get_block_size() as usize
    }

    /// Returns the index of the given inode number in this group's table.
    /// Inode numbers are 1-based and global.
    pub fn inode_to_index(&self, inodenum: u32) -> u32 {
        (inodenum - 1) % self.sb.inodes_per_group
    }

    /// Returns a copy of the inode with the given global number.
    pub fn get_inode(&self, inodenum: u32) -> Result<Inode> {
        let index = self.inode_to_index(inodenum) as usize;
        self.inodes.get(index).cloned().ok_or(Error::NotFound)
    }

    /// Returns the decoded inode table.
    pub fn get_inodes(&self) -> &[Inode] {
        &self.inodes
    }

    /// Returns the size in bytes of the file described by `inode`.
    pub fn get_inode_size(&self, inode: &Inode) -> u64 {
        inode.get_size(&self.sb)
    }

    /// Decodes the directory entries of the directory inode `inodenum`.
    ///
    /// Only the first data block is decoded; a directory spanning several
    /// blocks lists its further entries there.
    pub fn read_dir(&mut self, inodenum: u32) -> Result<Vec<DirEntry>> {
        let ino = self.get_inode(inodenum)?;
        if ino.mode & inode::MODE_DIRECTORY == 0 {
            return Err(Error::NotADir);
        }
        if ino.flags & inode::FLAG_INDEX_DIR != 0 {
            term::warn("directory uses a hash index, reading it as a linked list");
        }

        let offset = self.offset_block(ino.direct_block_ptrs[0]);
        self.data.seek(offset)?;
        dir::read_block(&mut self.data, self.sb.get_block_size())
    }

    /// Reads the whole contents of the regular file `inodenum`.
    ///
    /// Only the twelve direct blocks are followed; larger files would need
    /// the indirect pointers and are rejected.
    pub fn read_file(&mut self, inodenum: u32) -> Result<Vec<u8>> {
        let ino = self.get_inode(inodenum)?;
        if ino.mode & inode::MODE_REGULAR == 0 {
            return Err(Error::NotAFile);
        }

        let block_size = self.sb.get_block_size();
        let size = self.get_inode_size(&ino) as usize;
        if size.div_ceil(block_size as usize) > ino.direct_block_ptrs.len() {
            term::warn(format_args!(
                "file spans more than {} direct blocks, which needs indirect blocks",
                ino.direct_block_ptrs.len()
            ));
            return Err(Error::Unimplemented);
        }

        // `used_sectors` counts 512-byte sectors; `2 << block_size_log` of
        // them make one filesystem block
        let max_blocks = ino.used_sectors / (2 << self.sb.block_size_log);
        let max_blocks = (max_blocks as usize).min(ino.direct_block_ptrs.len());

        let mut contents = vec![0; size];
        let mut read = 0;
        for i in 0..max_blocks {
            if read >= size {
                break;
            }
            let offset = self.offset_block(ino.direct_block_ptrs[i]);
            self.data.seek(offset)?;

            let chunk = (size - read).min(block_size as usize);
            self.data.copy(&mut contents[read..read + chunk])?;
            read += chunk;
        }

        Ok(contents)
    }

    /// Byte offset of this group's descriptor record within the image.
    fn desc_offset(&self) -> usize {
        let block_size = self.sb.get_block_size() as usize;
        let table_start = (self.sb.superblock_block_number as usize + 1) * block_size;
        table_start + self.num as usize * DESCRIPTOR_SIZE
    }

    /// Clears bit `index` of a usage bitmap, both in the cached copy and in
    /// the image bytes.
    fn clear_bitmap_bit(
        data: &mut Cursor,
        bitmap: &mut [u8],
        bitmap_addr: u32,
        block_size: u32,
        index: u32,
    ) -> Result<()> {
        let byte = (index / 8) as usize;
        let mask = !(1u8 << (index % 8));
        bitmap[byte] &= mask;

        data.seek(bitmap_addr as usize * block_size as usize + byte)?;
        let value = data.read_u8()?;
        data.rewind(1)?;
        data.write_u8(value & mask)
    }

    /// Releases the inode `inodenum`: clears its usage bit, stamps the
    /// deletion time and drops the link count, and bumps the group's free
    /// inode count. All mutations land in the image bytes.
    pub fn deallocate_inode(&mut self, inodenum: u32, dtime: i32) -> Result<()> {
        let block_size = self.sb.get_block_size();
        let index = self.inode_to_index(inodenum);

        Self::clear_bitmap_bit(
            &mut self.data,
            &mut self.inode_bitmap,
            self.desc.inode_usage_bitmap_addr,
            block_size,
            index,
        )?;

        // Deletion time and link count live at offsets 20 and 26 of the
        // inode record
        let slot = self.desc.inode_table_start_addr as usize * block_size as usize
            + index as usize * self.sb.get_inode_size() as usize;
        self.data.seek(slot + 20)?;
        self.data.write_i32(dtime)?;
        self.data.seek(slot + 26)?;
        self.data.write_u16(0)?;

        let ino = &mut self.inodes[index as usize];
        ino.dtime = dtime;
        ino.hard_links_count = 0;

        self.desc.unallocated_inodes_number += 1;
        self.data.seek(self.desc_offset() + 14)?;
        self.data.write_u16(self.desc.unallocated_inodes_number)
    }

    /// Releases the data block `block` (an absolute block ID owned by this
    /// group): clears its usage bit and bumps the group's free block count.
    pub fn deallocate_block(&mut self, block: u32) -> Result<()> {
        let first = self.sb.superblock_block_number + self.num * self.sb.blocks_per_group;
        if block < first || block >= first + self.sb.blocks_per_group {
            return Err(Error::NotFound);
        }

        Self::clear_bitmap_bit(
            &mut self.data,
            &mut self.block_bitmap,
            self.desc.block_usage_bitmap_addr,
            self.sb.get_block_size(),
            block - first,
        )?;

        self.desc.unallocated_blocks_number += 1;
        self.data.seek(self.desc_offset() + 12)?;
        self.data.write_u16(self.desc.unallocated_blocks_number)
    }
}
