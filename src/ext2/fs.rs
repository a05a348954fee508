//! The ext2 filesystem.
//!
//! [`Ext2`] owns the image bytes and the decoded block groups, and routes
//! inode-numbered requests to the group owning the inode.

use crate::Error;
use crate::Result;
use crate::bg::BlockGroup;
use crate::cursor::Cursor;
use crate::dir::DirEntry;
use crate::dir::FileType;
use crate::inode;
use crate::inode::Inode;
use crate::superblock::SUPERBLOCK_OFFSET;
use crate::superblock::Superblock;
use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current timestamp since the Unix epoch.
fn get_timestamp() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i32)
        .unwrap_or_default()
}

/// An opened ext2 filesystem image.
pub struct Ext2 {
    /// Cursor over the whole image.
    cursor: Cursor,
    /// The filesystem's block groups.
    bgs: Vec<BlockGroup>,
}

impl Ext2 {
    /// Opens the filesystem image at `path`, reading it fully into memory.
    pub fn open(path: &Path) -> Result<Self> {
        Self::load(Cursor::open(path)?)
    }

    /// Decodes a filesystem from an image cursor.
    ///
    /// The first 1024 bytes of the image are the boot area and are skipped;
    /// every block group's metadata is decoded eagerly.
    pub fn load(mut cursor: Cursor) -> Result<Self> {
        cursor.seek(SUPERBLOCK_OFFSET)?;
        let first = BlockGroup::read(0, &mut cursor)?;

        let bg_count =
            (first.sb.total_blocks as usize).div_ceil(first.sb.blocks_per_group as usize);
        let mut bgs = Vec::with_capacity(bg_count);
        bgs.push(first);
        for num in 1..bg_count {
            cursor.seek(SUPERBLOCK_OFFSET)?;
            bgs.push(BlockGroup::read(num as u32, &mut cursor)?);
        }

        Ok(Self { cursor, bgs })
    }

    /// Returns the filesystem's superblock.
    pub fn get_superblock(&self) -> &Superblock {
        &self.bgs[0].sb
    }

    /// Returns the filesystem's block groups.
    pub fn get_groups(&self) -> &[BlockGroup] {
        &self.bgs
    }

    /// Returns the number of block groups.
    pub fn get_bg_count(&self) -> usize {
        self.bgs.len()
    }

    /// Returns the index of the group owning the given inode number.
    pub fn inode_to_bg(&self, inodenum: u32) -> Result<usize> {
        let sb = self.get_superblock();
        if inodenum == 0 || inodenum > sb.total_inodes {
            return Err(Error::NotFound);
        }

        let num = ((inodenum - 1) / sb.inodes_per_group) as usize;
        if num < self.bgs.len() {
            Ok(num)
        } else {
            Err(Error::NotFound)
        }
    }

    /// Returns a copy of the inode with the given global number.
    pub fn get_inode(&self, inodenum: u32) -> Result<Inode> {
        self.bgs[self.inode_to_bg(inodenum)?].get_inode(inodenum)
    }

    /// Returns the size in bytes of the file described by `inode`.
    pub fn get_inode_size(&self, inode: &Inode) -> u64 {
        inode.get_size(self.get_superblock())
    }

    /// Decodes the entries of the directory inode `inodenum`.
    pub fn read_dir(&mut self, inodenum: u32) -> Result<Vec<DirEntry>> {
        let num = self.inode_to_bg(inodenum)?;
        self.bgs[num].read_dir(inodenum)
    }

    /// Reads the whole contents of the regular file `inodenum`.
    pub fn read_file(&mut self, inodenum: u32) -> Result<Vec<u8>> {
        let num = self.inode_to_bg(inodenum)?;
        self.bgs[num].read_file(inodenum)
    }

    /// Deletes the regular file `entry` from the directory `parent`.
    ///
    /// The entry is unlinked from the parent's directory block, then the
    /// file's inode and direct data blocks are released in the usage
    /// bitmaps. Everything happens on the in-memory image; [`Self::save`]
    /// persists it.
    pub fn delete_file(&mut self, parent: u32, entry: &DirEntry) -> Result<()> {
        if entry.get_type() != Some(FileType::Regular) {
            return Err(Error::NotAFile);
        }

        self.unlink_entry(parent, entry)?;
        self.deallocate(entry.inode)
    }

    /// Recursively deletes the directory `entry` from the directory
    /// `parent`, then releases the directory's own inode and blocks.
    pub fn delete_dir(&mut self, parent: u32, entry: &DirEntry) -> Result<()> {
        if entry.get_type() != Some(FileType::Directory) {
            return Err(Error::NotADir);
        }

        for child in self.read_dir(entry.inode)? {
            if child.name == "." || child.name == ".." {
                continue;
            }
            match child.get_type() {
                Some(FileType::Directory) => self.delete_dir(entry.inode, &child)?,
                _ => self.delete_file(entry.inode, &child)?,
            }
        }

        self.unlink_entry(parent, entry)?;
        self.deallocate(entry.inode)
    }

    /// Writes the whole in-memory image to the file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.cursor.save(path)
    }

    /// Removes `entry` from the record chain of `parent`'s first directory
    /// block, by folding its record length into the preceding record, or by
    /// freeing the record in place when it opens the block.
    fn unlink_entry(&mut self, parent: u32, entry: &DirEntry) -> Result<()> {
        let num = self.inode_to_bg(parent)?;
        let dir_ino = self.bgs[num].get_inode(parent)?;
        if dir_ino.mode & inode::MODE_DIRECTORY == 0 {
            return Err(Error::NotADir);
        }

        let block_size = self.get_superblock().get_block_size() as usize;
        let base = dir_ino.direct_block_ptrs[0] as usize * block_size;

        let mut walked = 0;
        let mut prev: Option<usize> = None;
        while walked < block_size {
            let offset = base + walked;
            self.cursor.seek(offset)?;

            let inodenum = self.cursor.read_u32()?;
            if inodenum == 0 {
                break;
            }
            let record_length = self.cursor.read_u16()?;
            let name_length = self.cursor.read_u8()?;
            self.cursor.skip(1)?;
            let mut name = vec![0; name_length as usize];
            self.cursor.copy(&mut name)?;

            if inodenum == entry.inode && name == entry.name.as_bytes() {
                return match prev {
                    Some(prev_offset) => {
                        self.cursor.seek(prev_offset + 4)?;
                        let prev_length = self.cursor.read_u16()?;
                        self.cursor.rewind(2)?;
                        self.cursor.write_u16(prev_length + record_length)
                    }
                    // The block's first record cannot be folded; mark it
                    // free instead
                    None => {
                        self.cursor.seek(offset)?;
                        self.cursor.write_u32(0)
                    }
                };
            }

            if record_length == 0 {
                break;
            }
            prev = Some(offset);
            walked += record_length as usize;
        }

        Err(Error::NotFound)
    }

    /// Releases an inode and its direct data blocks in the usage bitmaps,
    /// and maintains the free counters of the superblock and of the
    /// descriptors involved.
    fn deallocate(&mut self, inodenum: u32) -> Result<()> {
        let num = self.inode_to_bg(inodenum)?;
        let ino = self.bgs[num].get_inode(inodenum)?;

        let sb = self.get_superblock();
        let first_data_block = sb.superblock_block_number;
        let blocks_per_group = sb.blocks_per_group;
        let fs_blocks = ino.used_sectors / (2 << sb.block_size_log);
        let max_blocks = (fs_blocks as usize).min(ino.direct_block_ptrs.len());

        let mut freed = 0;
        for &block in &ino.direct_block_ptrs[..max_blocks] {
            if block == 0 {
                continue;
            }
            let owner = ((block - first_data_block) / blocks_per_group) as usize;
            let owner = self.bgs.get_mut(owner).ok_or(Error::NotFound)?;
            owner.deallocate_block(block)?;
            freed += 1;
        }

        self.bgs[num].deallocate_inode(inodenum, get_timestamp())?;

        let sb = &mut self.bgs[0].sb;
        sb.total_unallocated_blocks += freed;
        sb.total_unallocated_inodes += 1;
        let free_blocks = sb.total_unallocated_blocks;
        let free_inodes = sb.total_unallocated_inodes;

        // Free counters live at offsets 12 and 16 of the superblock
        self.cursor.seek(SUPERBLOCK_OFFSET + 12)?;
        self.cursor.write_u32(free_blocks)?;
        self.cursor.write_u32(free_inodes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn w16(img: &mut [u8], off: usize, data: u16) {
        img[off..off + 2].copy_from_slice(&data.to_le_bytes());
    }

    fn w32(img: &mut [u8], off: usize, data: u32) {
        img[off..off + 4].copy_from_slice(&data.to_le_bytes());
    }

    fn record(img: &mut [u8], off: usize, inode: u32, record_length: u16, name: &[u8], ft: u8) {
        w32(img, off, inode);
        w16(img, off + 4, record_length);
        img[off + 6] = name.len() as u8;
        img[off + 7] = ft;
        img[off + 8..off + 8 + name.len()].copy_from_slice(name);
    }

    /// Builds a one-group image with 1024-byte blocks: the root directory
    /// (inode 2) holds a 13-byte file `hello` (inode 12) and a directory
    /// `sub` (inode 13).
    ///
    /// Layout: boot area, superblock, descriptor table, block bitmap, inode
    /// bitmap, inode table (blocks 5 and 6), root entries (7), `hello` data
    /// (8), `sub` entries (9).
    fn build_image() -> Vec<u8> {
        let mut img = vec![0; 10 * 1024];

        let sb = 1024;
        w32(&mut img, sb, 16); // total inodes
        w32(&mut img, sb + 4, 10); // total blocks
        w32(&mut img, sb + 12, 1); // unallocated blocks
        w32(&mut img, sb + 16, 3); // unallocated inodes
        w32(&mut img, sb + 20, 1); // first data block
        w32(&mut img, sb + 32, 128); // blocks per group
        w32(&mut img, sb + 40, 16); // inodes per group
        w16(&mut img, sb + 56, 0xef53);
        w16(&mut img, sb + 58, 1); // state: clean
        w16(&mut img, sb + 60, 1); // error action: ignore
        w32(&mut img, sb + 76, 1); // major version
        w32(&mut img, sb + 84, 11); // first non reserved inode
        w16(&mut img, sb + 88, 128); // inode size

        let bgd = 2 * 1024;
        w32(&mut img, bgd, 3); // block bitmap
        w32(&mut img, bgd + 4, 4); // inode bitmap
        w32(&mut img, bgd + 8, 5); // inode table
        w16(&mut img, bgd + 12, 1); // unallocated blocks
        w16(&mut img, bgd + 14, 3); // unallocated inodes
        w16(&mut img, bgd + 16, 2); // directories

        img[3 * 1024] = 0xff; // blocks 1..=9 in use
        img[3 * 1024 + 1] = 0x01;
        img[4 * 1024] = 0xff; // inodes 1..=13 in use
        img[4 * 1024 + 1] = 0x1f;

        let root = 5 * 1024 + 128; // inode 2
        w16(&mut img, root, 0x4000 | 0o755);
        w32(&mut img, root + 4, 1024);
        w16(&mut img, root + 26, 3);
        w32(&mut img, root + 28, 2); // sectors
        w32(&mut img, root + 40, 7); // first data block ptr

        let hello = 5 * 1024 + 11 * 128; // inode 12
        w16(&mut img, hello, 0x8000 | 0o644);
        w32(&mut img, hello + 4, 13);
        w16(&mut img, hello + 26, 1);
        w32(&mut img, hello + 28, 2);
        w32(&mut img, hello + 40, 8);

        let sub = 5 * 1024 + 12 * 128; // inode 13
        w16(&mut img, sub, 0x4000 | 0o755);
        w32(&mut img, sub + 4, 1024);
        w16(&mut img, sub + 26, 2);
        w32(&mut img, sub + 28, 2);
        w32(&mut img, sub + 40, 9);

        let dir = 7 * 1024;
        record(&mut img, dir, 2, 12, b".", 2);
        record(&mut img, dir + 12, 2, 12, b"..", 2);
        record(&mut img, dir + 24, 12, 16, b"hello", 1);
        record(&mut img, dir + 40, 13, 984, b"sub", 2);

        img[8 * 1024..8 * 1024 + 13].copy_from_slice(b"hello, world\n");

        let dir = 9 * 1024;
        record(&mut img, dir, 13, 12, b".", 2);
        record(&mut img, dir + 12, 2, 1012, b"..", 2);

        img
    }

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn open_geometry() {
        let fs = Ext2::load(Cursor::new(build_image())).unwrap();

        let sb = fs.get_superblock();
        assert_eq!(sb.signature, 0xef53);
        assert_eq!(sb.get_block_size(), 1024);
        assert_eq!(
            fs.get_bg_count(),
            (sb.total_blocks as usize).div_ceil(sb.blocks_per_group as usize)
        );
        assert_eq!(fs.get_bg_count(), 1);
    }

    #[test]
    fn bad_magic_fails_open() {
        let mut img = build_image();
        img[1080] = 0;
        img[1081] = 0;

        let res = Ext2::load(Cursor::new(img));
        assert!(matches!(res, Err(Error::BadMagic(0))));
    }

    #[test]
    fn inode_addressing_round_trip() {
        let fs = Ext2::load(Cursor::new(build_image())).unwrap();
        let per_group = fs.get_superblock().inodes_per_group;

        for inodenum in 1..=16 {
            let bg = fs.inode_to_bg(inodenum).unwrap() as u32;
            let index = fs.get_groups()[bg as usize].inode_to_index(inodenum);
            assert_eq!(bg * per_group + index + 1, inodenum);
        }

        assert!(matches!(fs.inode_to_bg(0), Err(Error::NotFound)));
        assert!(matches!(fs.inode_to_bg(17), Err(Error::NotFound)));
    }

    #[test]
    fn list_root() {
        let mut fs = Ext2::load(Cursor::new(build_image())).unwrap();
        let entries = fs.read_dir(2).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [".", "..", "hello", "sub"]);
        assert_eq!(entries[2].inode, 12);
        assert_eq!(entries[2].get_type(), Some(FileType::Regular));
        assert_eq!(entries[3].inode, 13);
        assert_eq!(entries[3].get_type(), Some(FileType::Directory));

        let total: u32 = entries.iter().map(|e| e.record_length as u32).sum();
        assert_eq!(total, 1024);
    }

    #[test]
    fn read_whole_file() {
        let mut fs = Ext2::load(Cursor::new(build_image())).unwrap();
        let contents = fs.read_file(12).unwrap();

        assert_eq!(contents, b"hello, world\n");
    }

    #[test]
    fn type_mismatches() {
        let mut fs = Ext2::load(Cursor::new(build_image())).unwrap();

        assert!(matches!(fs.read_dir(12), Err(Error::NotADir)));
        assert!(matches!(fs.read_file(2), Err(Error::NotAFile)));
    }

    #[test]
    fn indirect_blocks_rejected() {
        let mut img = build_image();
        let hello = 5 * 1024 + 11 * 128;
        w32(&mut img, hello + 4, 13 * 1024); // larger than 12 direct blocks
        w32(&mut img, hello + 28, 26);

        let mut fs = Ext2::load(Cursor::new(img)).unwrap();
        assert!(matches!(fs.read_file(12), Err(Error::Unimplemented)));
    }

    #[test]
    fn inode_size_revision_rule() {
        let fs = Ext2::load(Cursor::new(build_image())).unwrap();
        let ino = fs.get_inode(12).unwrap();
        assert_eq!(fs.get_inode_size(&ino), 13);
    }

    #[test]
    fn save_round_trip() {
        let img = build_image();
        let fs = Ext2::load(Cursor::new(img.clone())).unwrap();

        let path = temp_path("ext2p_save_round_trip.img");
        fs.save(&path).unwrap();
        let written = fs::read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(written, img);
    }

    #[test]
    fn delete_file_releases_everything() {
        let mut fs = Ext2::load(Cursor::new(build_image())).unwrap();

        let entries = fs.read_dir(2).unwrap();
        let hello = entries.iter().find(|e| e.name == "hello").unwrap();
        fs.delete_file(2, hello).unwrap();

        // Unlinked from the parent
        let names: Vec<String> = fs.read_dir(2).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, [".", "..", "sub"]);

        // Counters maintained
        let sb = fs.get_superblock();
        assert_eq!(sb.total_unallocated_blocks, 2);
        assert_eq!(sb.total_unallocated_inodes, 4);

        // Bitmap bits cleared and record folded, in the image itself
        let path = temp_path("ext2p_delete_file.img");
        fs.save(&path).unwrap();
        let img = fs::read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(img[3 * 1024], 0x7f); // block 8 free
        assert_eq!(img[4 * 1024 + 1], 0x17); // inode 12 free
        let folded = u16::from_le_bytes([img[7 * 1024 + 16], img[7 * 1024 + 17]]);
        assert_eq!(folded, 28); // `..` swallowed the 16-byte record
        let links = u16::from_le_bytes([img[5 * 1024 + 11 * 128 + 26], img[5 * 1024 + 11 * 128 + 27]]);
        assert_eq!(links, 0);
    }

    #[test]
    fn delete_file_requires_file() {
        let mut fs = Ext2::load(Cursor::new(build_image())).unwrap();

        let entries = fs.read_dir(2).unwrap();
        let sub = entries.iter().find(|e| e.name == "sub").unwrap();
        assert!(matches!(fs.delete_file(2, sub), Err(Error::NotAFile)));
    }

    #[test]
    fn delete_dir_recurses() {
        let mut fs = Ext2::load(Cursor::new(build_image())).unwrap();

        let entries = fs.read_dir(2).unwrap();
        let sub = entries.iter().find(|e| e.name == "sub").unwrap().clone();
        assert!(matches!(fs.delete_dir(2, &sub), Ok(())));

        let names: Vec<String> = fs.read_dir(2).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, [".", "..", "hello"]);

        let sb = fs.get_superblock();
        assert_eq!(sb.total_unallocated_blocks, 2); // block 9 released
        assert_eq!(sb.total_unallocated_inodes, 4); // inode 13 released
    }
}
