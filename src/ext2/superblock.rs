//! Superblock codec.
//!
//! The superblock lives 1024 bytes into the image and describes the whole
//! filesystem's geometry. A backup copy may be present in other block
//! groups; only the primary copy is consulted here.

use crate::Error;
use crate::Result;
use crate::cursor::Cursor;
use crate::term;

/// The offset of the superblock from the beginning of the image.
pub const SUPERBLOCK_OFFSET: usize = 1024;
/// The filesystem's signature.
pub const EXT2_SIGNATURE: u16 = 0xef53;

/// Revision 0: fixed inode size.
pub const REV0_INODE_SIZE: u16 = 128;
/// Revision 0: fixed first usable inode.
pub const REV0_FIRST_INODE: u32 = 11;

/// Major version: revision 0.
pub const REV_OLD: u32 = 0;
/// Major version: revision 1, with variable inode sizes.
pub const REV_DYNAMIC: u32 = 1;

/// Filesystem state: the filesystem is clean.
pub const FS_STATE_CLEAN: u16 = 1;
/// Filesystem state: the filesystem has errors.
pub const FS_STATE_ERROR: u16 = 2;

/// Error handle action: ignore.
pub const ERR_ACTION_IGNORE: u16 = 1;
/// Error handle action: mount as read-only.
pub const ERR_ACTION_READ_ONLY: u16 = 2;
/// Error handle action: trigger a kernel panic.
pub const ERR_ACTION_KERNEL_PANIC: u16 = 3;

/// Creator OS: Linux.
pub const OS_LINUX: u32 = 0;
/// Creator OS: GNU Hurd.
pub const OS_HURD: u32 = 1;
/// Creator OS: Masix.
pub const OS_MASIX: u32 = 2;
/// Creator OS: FreeBSD.
pub const OS_FREEBSD: u32 = 3;
/// Creator OS: Lites.
pub const OS_LITES: u32 = 4;

/// Optional feature: preallocation of a specified number of blocks for each
/// new directory.
pub const OPTIONAL_FEATURE_DIRECTORY_PREALLOCATION: u32 = 0x1;
/// Optional feature: imagic inodes.
pub const OPTIONAL_FEATURE_IMAGIC_INODES: u32 = 0x2;
/// Optional feature: journal.
pub const OPTIONAL_FEATURE_JOURNAL: u32 = 0x4;
/// Optional feature: inodes have extended attributes.
pub const OPTIONAL_FEATURE_INODE_EXTENDED: u32 = 0x8;
/// Optional feature: filesystem can resize itself for larger partitions.
pub const OPTIONAL_FEATURE_RESIZE: u32 = 0x10;
/// Optional feature: directories use hash index.
pub const OPTIONAL_FEATURE_HASH_INDEX: u32 = 0x20;

/// Required feature: compression.
pub const REQUIRED_FEATURE_COMPRESSION: u32 = 0x1;
/// Required feature: directory entries have a type field.
pub const REQUIRED_FEATURE_DIRECTORY_TYPE: u32 = 0x2;
/// Required feature: filesystem needs to replay its journal.
pub const REQUIRED_FEATURE_JOURNAL_REPLAY: u32 = 0x4;
/// Required feature: filesystem uses a journal device.
pub const REQUIRED_FEATURE_JOURNAL_DEVICE: u32 = 0x8;
/// Required feature: meta block groups.
pub const REQUIRED_FEATURE_META_BG: u32 = 0x10;

/// Write-required feature: sparse superblocks and group descriptor tables.
pub const WRITE_REQUIRED_SPARSE_SUPERBLOCKS: u32 = 0x1;
/// Write-required feature: filesystem uses a 64-bit file size.
pub const WRITE_REQUIRED_64_BITS: u32 = 0x2;
/// Write-required feature: directory contents are stored as a binary tree.
pub const WRITE_REQUIRED_DIRECTORY_BINARY_TREE: u32 = 0x4;

/// Compression algorithm: LZV1.
pub const COMPRESSION_LZV1: u32 = 0x1;
/// Compression algorithm: LZRW3-A.
pub const COMPRESSION_LZRW3A: u32 = 0x2;
/// Compression algorithm: gzip.
pub const COMPRESSION_GZIP: u32 = 0x4;
/// Compression algorithm: bzip2.
pub const COMPRESSION_BZIP2: u32 = 0x8;
/// Compression algorithm: LZO.
pub const COMPRESSION_LZO: u32 = 0x10;

/// The ext2 superblock structure.
///
/// Only the first 264 bytes carry fields; the remaining 760 bytes of the
/// superblock's 1024 are reserved and skipped on read.
#[derive(Clone)]
pub struct Superblock {
    /// Total number of inodes in the filesystem.
    pub total_inodes: u32,
    /// Total number of blocks in the filesystem.
    pub total_blocks: u32,
    /// Number of blocks reserved for the superuser.
    pub superuser_blocks: u32,
    /// Total number of unallocated blocks.
    pub total_unallocated_blocks: u32,
    /// Total number of unallocated inodes.
    pub total_unallocated_inodes: u32,
    /// Block number of the block containing the superblock.
    pub superblock_block_number: u32,
    /// log2(block_size) - 10
    pub block_size_log: u32,
    /// log2(fragment_size) - 10, negative for sub-1024 fragments.
    pub fragment_size_log: i32,
    /// The number of blocks per block group.
    pub blocks_per_group: u32,
    /// The number of fragments per block group.
    pub fragments_per_group: u32,
    /// The number of inodes per block group.
    pub inodes_per_group: u32,
    /// The timestamp of the last mount operation.
    pub last_mount_timestamp: i32,
    /// The timestamp of the last write operation.
    pub last_write_timestamp: i32,
    /// The number of mounts since the last consistency check.
    pub mount_count_since_fsck: u16,
    /// The number of mounts allowed before a consistency check must be done.
    pub mount_count_before_fsck: u16,
    /// The ext2 signature.
    pub signature: u16,
    /// The filesystem's state.
    pub fs_state: u16,
    /// The action to perform when an error is detected.
    pub error_action: u16,
    /// The minor version.
    pub minor_version: u16,
    /// The timestamp of the last consistency check.
    pub last_fsck_timestamp: i32,
    /// The interval between mandatory consistency checks.
    pub fsck_interval: i32,
    /// The id of the operating system from which the filesystem was created.
    pub os_id: u32,
    /// The major version.
    pub major_version: u32,
    /// The UID of the user that can use reserved blocks.
    pub uid_reserved: u16,
    /// The GID of the group that can use reserved blocks.
    pub gid_reserved: u16,

    // Extended superblock fields
    /// The first non reserved inode.
    pub first_non_reserved_inode: u32,
    /// The size of the inode structure in bytes.
    pub inode_size: u16,
    /// The block group containing the superblock.
    pub superblock_group: u16,
    /// Optional features for the implementation to support.
    pub optional_features: u32,
    /// Required features for the implementation to support.
    pub required_features: u32,
    /// Required features for the implementation to support for writing.
    pub write_required_features: u32,
    /// The filesystem id.
    pub filesystem_id: [u8; 16],
    /// The volume name.
    pub volume_name: [u8; 16],
    /// The path the volume was last mounted to.
    pub last_mount_path: [u8; 64],
    /// Used compression algorithms.
    pub compression_algorithms: u32,
    /// The number of blocks to preallocate for files.
    pub files_preallocate_count: u8,
    /// The number of blocks to preallocate for directories.
    pub directories_preallocate_count: u8,
    /// Group descriptor table entries reserved for future expansion.
    pub reserved_gdt_blocks: u16,
    /// The journal ID.
    pub journal_id: [u8; 16],
    /// The journal inode.
    pub journal_inode: u32,
    /// The journal device.
    pub journal_device: u32,
    /// The head of the orphan inodes list.
    pub orphan_inode_head: u32,
    /// Seeds used for directory indexing.
    pub dir_hash_seeds: [u32; 4],
    /// Default hash version used for directory indexing.
    pub default_hash_version: u8,
    /// Default mount options.
    pub default_mount_options: u32,
    /// The first meta block group.
    pub first_meta_bg: u32,
}

impl Superblock {
    /// Decodes the superblock at the cursor's position.
    ///
    /// The cursor advances by 1024 bytes: 264 bytes of fields, the rest
    /// reserved. A wrong signature fails the read; other out-of-range values
    /// only produce warnings.
    pub fn read(cursor: &mut Cursor) -> Result<Self> {
        let sb = Self {
            total_inodes: cursor.read_u32()?,
            total_blocks: cursor.read_u32()?,
            superuser_blocks: cursor.read_u32()?,
            total_unallocated_blocks: cursor.read_u32()?,
            total_unallocated_inodes: cursor.read_u32()?,
            superblock_block_number: cursor.read_u32()?,
            block_size_log: cursor.read_u32()?,
            fragment_size_log: cursor.read_i32()?,
            blocks_per_group: cursor.read_u32()?,
            fragments_per_group: cursor.read_u32()?,
            inodes_per_group: cursor.read_u32()?,
            last_mount_timestamp: cursor.read_i32()?,
            last_write_timestamp: cursor.read_i32()?,
            mount_count_since_fsck: cursor.read_u16()?,
            mount_count_before_fsck: cursor.read_u16()?,
            signature: cursor.read_u16()?,
            fs_state: cursor.read_u16()?,
            error_action: cursor.read_u16()?,
            minor_version: cursor.read_u16()?,
            last_fsck_timestamp: cursor.read_i32()?,
            fsck_interval: cursor.read_i32()?,
            os_id: cursor.read_u32()?,
            major_version: cursor.read_u32()?,
            uid_reserved: cursor.read_u16()?,
            gid_reserved: cursor.read_u16()?,
            first_non_reserved_inode: cursor.read_u32()?,
            inode_size: cursor.read_u16()?,
            superblock_group: cursor.read_u16()?,
            optional_features: cursor.read_u32()?,
            required_features: cursor.read_u32()?,
            write_required_features: cursor.read_u32()?,
            filesystem_id: {
                let mut id = [0; 16];
                cursor.copy(&mut id)?;
                id
            },
            volume_name: {
                let mut name = [0; 16];
                cursor.copy(&mut name)?;
                name
            },
            last_mount_path: {
                let mut path = [0; 64];
                cursor.copy(&mut path)?;
                path
            },
            compression_algorithms: cursor.read_u32()?,
            files_preallocate_count: cursor.read_u8()?,
            directories_preallocate_count: cursor.read_u8()?,
            reserved_gdt_blocks: cursor.read_u16()?,
            journal_id: {
                let mut id = [0; 16];
                cursor.copy(&mut id)?;
                id
            },
            journal_inode: cursor.read_u32()?,
            journal_device: cursor.read_u32()?,
            orphan_inode_head: cursor.read_u32()?,
            dir_hash_seeds: [
                cursor.read_u32()?,
                cursor.read_u32()?,
                cursor.read_u32()?,
                cursor.read_u32()?,
            ],
            default_hash_version: cursor.read_u8()?,
            default_mount_options: {
                cursor.skip(3)?;
                cursor.read_u32()?
            },
            first_meta_bg: cursor.read_u32()?,
        };
        cursor.skip(760)?;

        if sb.signature != EXT2_SIGNATURE {
            return Err(Error::BadMagic(sb.signature));
        }
        if sb.fs_state == 0 || sb.fs_state > FS_STATE_ERROR {
            term::warn(format_args!(
                "superblock has bad state '{}', ignoring",
                sb.fs_state
            ));
        }
        if sb.error_action == 0 || sb.error_action > ERR_ACTION_KERNEL_PANIC {
            term::warn(format_args!(
                "superblock has bad error action '{}', ignoring",
                sb.error_action
            ));
        }
        if sb.os_id > OS_LITES {
            term::warn(format_args!("superblock has bad OS '{}', ignoring", sb.os_id));
        }
        if sb.major_version > REV_DYNAMIC {
            term::warn(format_args!(
                "superblock has bad revision '{}', ignoring",
                sb.major_version
            ));
        }

        Ok(sb)
    }

    /// Returns the size of a block in bytes.
    pub fn get_block_size(&self) -> u32 {
        1024 << self.block_size_log
    }

    /// Returns the size of a fragment in bytes.
    pub fn get_frag_size(&self) -> u32 {
        if self.fragment_size_log >= 0 {
            1024 << self.fragment_size_log
        } else {
            1024 >> -self.fragment_size_log
        }
    }

    /// Returns the size of an inode in bytes.
    ///
    /// Revision 0 filesystems have a fixed inode size; the declared one only
    /// applies from revision 1 on.
    pub fn get_inode_size(&self) -> u16 {
        if self.major_version >= REV_DYNAMIC {
            self.inode_size
        } else {
            REV0_INODE_SIZE
        }
    }

    /// Returns the first usable inode number.
    pub fn get_first_inode(&self) -> u32 {
        if self.major_version >= REV_DYNAMIC {
            self.first_non_reserved_inode
        } else {
            REV0_FIRST_INODE
        }
    }

    /// Returns the volume name, if set.
    pub fn get_volume_name(&self) -> Option<String> {
        cstr_field(&self.volume_name)
    }

    /// Returns the path the volume was last mounted to, if recorded.
    pub fn get_last_mount_path(&self) -> Option<String> {
        cstr_field(&self.last_mount_path)
    }
}

/// Decodes a NUL-terminated fixed-width field, `None` when empty.
fn cstr_field(field: &[u8]) -> Option<String> {
    let len = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    if len == 0 {
        None
    } else {
        Some(String::from_utf8_lossy(&field[..len]).into_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn w16(buf: &mut [u8], off: usize, data: u16) {
        buf[off..off + 2].copy_from_slice(&data.to_le_bytes());
    }

    fn w32(buf: &mut [u8], off: usize, data: u32) {
        buf[off..off + 4].copy_from_slice(&data.to_le_bytes());
    }

    fn sample_block() -> Vec<u8> {
        let mut buf = vec![0; 1024];
        w32(&mut buf, 0, 128); // total inodes
        w32(&mut buf, 4, 512); // total blocks
        w32(&mut buf, 12, 100); // unallocated blocks
        w32(&mut buf, 16, 50); // unallocated inodes
        w32(&mut buf, 20, 1); // superblock block number
        w32(&mut buf, 24, 0); // block size log (1024)
        w32(&mut buf, 28, (-1i32) as u32); // fragment size log (512)
        w32(&mut buf, 32, 256); // blocks per group
        w32(&mut buf, 40, 64); // inodes per group
        w16(&mut buf, 56, EXT2_SIGNATURE);
        w16(&mut buf, 58, FS_STATE_CLEAN);
        w16(&mut buf, 60, ERR_ACTION_IGNORE);
        w32(&mut buf, 76, REV_DYNAMIC);
        w32(&mut buf, 84, 11); // first non reserved inode
        w16(&mut buf, 88, 256); // inode size
        buf[120..125].copy_from_slice(b"mydsk"); // volume name
        buf
    }

    #[test]
    fn decode() {
        let mut cursor = Cursor::new(sample_block());
        let sb = Superblock::read(&mut cursor).unwrap();

        assert_eq!(cursor.pos(), 1024);
        assert_eq!(sb.total_inodes, 128);
        assert_eq!(sb.total_blocks, 512);
        assert_eq!(sb.blocks_per_group, 256);
        assert_eq!(sb.inodes_per_group, 64);
        assert_eq!(sb.signature, EXT2_SIGNATURE);
        assert_eq!(sb.get_block_size(), 1024);
        assert_eq!(sb.get_frag_size(), 512);
        assert_eq!(sb.get_inode_size(), 256);
        assert_eq!(sb.get_first_inode(), 11);
        assert_eq!(sb.get_volume_name().as_deref(), Some("mydsk"));
        assert_eq!(sb.get_last_mount_path(), None);
    }

    #[test]
    fn rev0_fixed_values() {
        let mut block = sample_block();
        w32(&mut block, 76, REV_OLD);
        let sb = Superblock::read(&mut Cursor::new(block)).unwrap();

        assert_eq!(sb.get_inode_size(), 128);
        assert_eq!(sb.get_first_inode(), 11);
    }

    #[test]
    fn bad_magic() {
        let mut block = sample_block();
        w16(&mut block, 56, 0x1234);
        let res = Superblock::read(&mut Cursor::new(block));

        assert!(matches!(res, Err(Error::BadMagic(0x1234))));
    }
}
