//! Human-readable dumps of the filesystem's on-disk structures.

use crate::util::fmt_time;
use ext2::Ext2;
use ext2::bgdescriptor::BlockGroupDescriptor;
use ext2::inode;
use ext2::inode::INODE_ROOT_DIR;
use ext2::inode::Inode;
use ext2::superblock;
use ext2::superblock::Superblock;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use uuid::Uuid;

/// Dump the superblock.
pub const DUMP_SUPERBLOCK: u32 = 0x01;
/// Dump the first 32 block group descriptors.
pub const DUMP_BGDESCRIPTOR: u32 = 0x02;
/// Dump every block group descriptor.
pub const DUMP_ALL_BGDESCRIPTOR: u32 = 0x04;
/// Dump the first 32 inodes.
pub const DUMP_INODE: u32 = 0x08;
/// Dump every inode of the first group.
pub const DUMP_INODE_ALL: u32 = 0x10;
/// Dump the root directory's inode.
pub const DUMP_INODE_ROOT: u32 = 0x20;
/// Dump everything, in its abridged form.
pub const DUMP_ALL: u32 = DUMP_SUPERBLOCK | DUMP_BGDESCRIPTOR | DUMP_INODE;

/// Prints the structures selected by `flags`.
pub fn dump(fs: &Ext2, flags: u32) {
    let sb = fs.get_superblock();

    if flags & DUMP_SUPERBLOCK != 0 {
        dump_superblock(sb);
        println!();
    }

    if flags & DUMP_BGDESCRIPTOR != 0 {
        for (i, bg) in fs.get_groups().iter().take(32).enumerate() {
            dump_descriptor(&bg.desc, i);
            println!();
        }
    }
    if flags & DUMP_ALL_BGDESCRIPTOR != 0 {
        for (i, bg) in fs.get_groups().iter().enumerate() {
            dump_descriptor(&bg.desc, i);
            println!();
        }
    }

    if flags & DUMP_INODE != 0 {
        for (i, ino) in fs.get_groups()[0].get_inodes().iter().take(32).enumerate() {
            dump_inode(ino, sb, i as u32 + 1);
            println!();
        }
    }
    if flags & DUMP_INODE_ALL != 0 {
        for (i, ino) in fs.get_groups()[0].get_inodes().iter().enumerate() {
            dump_inode(ino, sb, i as u32 + 1);
            println!();
        }
    }
    if flags & DUMP_INODE_ROOT != 0 {
        if let Ok(root) = fs.get_inode(INODE_ROOT_DIR) {
            dump_inode(&root, sb, INODE_ROOT_DIR);
        }
    }
}

fn yesno(cond: bool) -> &'static str {
    if cond { "yes" } else { "no" }
}

fn os_name(os_id: u32) -> &'static str {
    match os_id {
        superblock::OS_LINUX => "Linux",
        superblock::OS_HURD => "GNU Hurd",
        superblock::OS_MASIX => "Masix",
        superblock::OS_FREEBSD => "FreeBSD",
        superblock::OS_LITES => "Lites",
        _ => "unknown",
    }
}

fn revision_name(major_version: u32) -> &'static str {
    match major_version {
        superblock::REV_OLD => "0 (old)",
        superblock::REV_DYNAMIC => "1 (dynamic)",
        _ => "unknown",
    }
}

fn state_name(fs_state: u16) -> &'static str {
    match fs_state {
        superblock::FS_STATE_CLEAN => "OK (unmounted cleanly)",
        superblock::FS_STATE_ERROR => "error(s) occurred",
        _ => "unknown",
    }
}

fn error_action_name(action: u16) -> &'static str {
    match action {
        superblock::ERR_ACTION_IGNORE => "ignore errors",
        superblock::ERR_ACTION_READ_ONLY => "remount read-only",
        superblock::ERR_ACTION_KERNEL_PANIC => "cause kernel panic",
        _ => "unknown",
    }
}

/// Tells whether the mount count warrants a filesystem check.
fn mount_check(count: u16, max: u16) -> String {
    if count == max {
        "yes (max mount count reached)".to_owned()
    } else if count > max {
        format!("yes ({} more than max)", count - max)
    } else {
        format!("no ({} less than max)", max - count)
    }
}

/// Tells whether the time since the last check warrants a new one.
fn fsck_check(last: i32, interval: i32) -> String {
    if interval == 0 {
        return "yes (set to check at boot)".to_owned();
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let due = now - last as i64 >= interval as i64;
    format!("{} (check every {} seconds)", yesno(due), interval)
}

fn dump_superblock(sb: &Superblock) {
    let compat = |mask| yesno(sb.optional_features & mask != 0);
    let incompat = |mask| yesno(sb.required_features & mask != 0);
    let compat_ro = |mask| yesno(sb.write_required_features & mask != 0);
    let compressed = |mask| yesno(sb.compression_algorithms & mask != 0);

    println!(
        "* Superblock (block #{}, group #{})",
        sb.superblock_block_number, sb.superblock_group
    );
    println!("│");

    println!("├─ Created by (OS)... {}", os_name(sb.os_id));
    println!("├─ Revision.......... {}", revision_name(sb.major_version));
    println!("├─ Minor revision.... {}", sb.minor_version);
    println!("│");

    println!("├─ FS state....... {}", state_name(sb.fs_state));
    println!("├─ Error policy... {}", error_action_name(sb.error_action));
    println!("│");

    println!("├─ Times mounted........ {}", sb.mount_count_since_fsck);
    println!(
        "├─ Warrants fs check?... {}",
        mount_check(sb.mount_count_since_fsck, sb.mount_count_before_fsck)
    );
    println!("│");

    println!(
        "├─ Last mount time... {}",
        fmt_time(sb.last_mount_timestamp as i64)
    );
    println!(
        "├─ Last write time... {}",
        fmt_time(sb.last_write_timestamp as i64)
    );
    println!("│");

    println!(
        "├─ Last fs check........ {}",
        fmt_time(sb.last_fsck_timestamp as i64)
    );
    println!(
        "├─ Warrants fs check?... {}",
        fsck_check(sb.last_fsck_timestamp, sb.fsck_interval)
    );
    println!("│");

    println!("├─┬─ Block groups:");
    println!("│ ├─── Inodes per group...... {}", sb.inodes_per_group);
    println!("│ ├─── Blocks per group...... {}", sb.blocks_per_group);
    println!("│ ├─── Fragments per group... {}", sb.fragments_per_group);
    println!("│ └─── Reserved GDT blocks... {}", sb.reserved_gdt_blocks);
    println!("│");

    println!("├─┬─ Inodes:");
    println!(
        "│ ├─── Count........... {} ({} free)",
        sb.total_inodes, sb.total_unallocated_inodes
    );
    println!("│ ├─── Size............ {} bytes", sb.get_inode_size());
    println!("│ └─── First usable.... #{}", sb.get_first_inode());
    println!("│");

    println!("├─┬─ Blocks:");
    println!(
        "│ ├─── Count........ {} ({} free, {} reserved for super user)",
        sb.total_blocks, sb.total_unallocated_blocks, sb.superuser_blocks
    );
    let block_size = sb.get_block_size();
    println!(
        "│ ├─── Size......... {}KiB ({} bytes)",
        block_size / 1024,
        block_size
    );
    let frag_size = sb.get_frag_size();
    println!(
        "│ ├─── Frag size.... {}KiB ({} bytes)",
        frag_size / 1024,
        frag_size
    );
    println!("│ ├─── User ID...... {}", sb.uid_reserved);
    println!("│ └─── Group ID..... {}", sb.gid_reserved);
    println!("│");

    println!("├─┬─ Features:");
    println!("│ ├─┬─ Compatible:");
    println!(
        "│ │ ├─── Prealloc dirs?... {}",
        compat(superblock::OPTIONAL_FEATURE_DIRECTORY_PREALLOCATION)
    );
    println!(
        "│ │ ├─── Imagic inodes?... {}",
        compat(superblock::OPTIONAL_FEATURE_IMAGIC_INODES)
    );
    println!(
        "│ │ ├─── Has journal?..... {}",
        compat(superblock::OPTIONAL_FEATURE_JOURNAL)
    );
    println!(
        "│ │ ├─── Extended attr?... {}",
        compat(superblock::OPTIONAL_FEATURE_INODE_EXTENDED)
    );
    println!(
        "│ │ ├─── Resized inode?... {}",
        compat(superblock::OPTIONAL_FEATURE_RESIZE)
    );
    println!(
        "│ │ └─── Dir indexing?.... {}",
        compat(superblock::OPTIONAL_FEATURE_HASH_INDEX)
    );
    println!("│ │");
    println!("│ ├─┬─ Incompatible:");
    println!(
        "│ │ ├─── Compressed?......... {}",
        incompat(superblock::REQUIRED_FEATURE_COMPRESSION)
    );
    println!(
        "│ │ ├─── Filetype in dirs?... {}",
        incompat(superblock::REQUIRED_FEATURE_DIRECTORY_TYPE)
    );
    println!(
        "│ │ ├─── Needs recovery?..... {}",
        incompat(superblock::REQUIRED_FEATURE_JOURNAL_REPLAY)
    );
    println!(
        "│ │ ├─── Journal device?..... {}",
        incompat(superblock::REQUIRED_FEATURE_JOURNAL_DEVICE)
    );
    println!(
        "│ │ └─── Meta block group?... {}",
        incompat(superblock::REQUIRED_FEATURE_META_BG)
    );
    println!("│ │");
    println!("│ └─┬─ Compatible (read-only):");
    println!(
        "│   ├─── Sparse Superblock?... {}",
        compat_ro(superblock::WRITE_REQUIRED_SPARSE_SUPERBLOCKS)
    );
    println!(
        "│   ├─── Large files?......... {}",
        compat_ro(superblock::WRITE_REQUIRED_64_BITS)
    );
    println!(
        "│   └─── BTree sorted dirs?... {}",
        compat_ro(superblock::WRITE_REQUIRED_DIRECTORY_BINARY_TREE)
    );
    println!("│");

    println!("├─┬─ Volume:");
    println!("│ ├─── UUID...... {}", Uuid::from_bytes(sb.filesystem_id));
    println!(
        "│ ├─── Name...... {}",
        sb.get_volume_name().as_deref().unwrap_or("N/A")
    );
    println!(
        "│ └─── Mounted... {}",
        sb.get_last_mount_path().as_deref().unwrap_or("N/A")
    );
    println!("│");

    println!("├─┬─ Compression:");
    println!("│ ├─── LZV1 used?...... {}", compressed(superblock::COMPRESSION_LZV1));
    println!("│ ├─── LZRW3-A used?... {}", compressed(superblock::COMPRESSION_LZRW3A));
    println!("│ ├─── gzip used?...... {}", compressed(superblock::COMPRESSION_GZIP));
    println!("│ ├─── bzip2 used?..... {}", compressed(superblock::COMPRESSION_BZIP2));
    println!("│ └─── LZO used?....... {}", compressed(superblock::COMPRESSION_LZO));
    println!("│");

    println!("├─┬─ Performance:");
    println!("│ ├─── Prealloc (files)... {}", sb.files_preallocate_count);
    println!(
        "│ └─── Prealloc (dirs).... {}",
        sb.directories_preallocate_count
    );
    println!("│");

    if sb.optional_features & superblock::OPTIONAL_FEATURE_JOURNAL != 0 {
        println!("├─┬─ Journaling:");
        println!("│ ├─── Journal UUID..... {}", Uuid::from_bytes(sb.journal_id));
        println!("│ ├─── Journal inode.... {}", sb.journal_inode);
        println!("│ ├─── Journal device... {}", sb.journal_device);
        println!("│ └─── Last orphan...... {}", sb.orphan_inode_head);
    } else {
        println!("├─ Journaling: not present");
    }
    println!("│");

    if sb.optional_features & superblock::OPTIONAL_FEATURE_HASH_INDEX != 0 {
        println!(
            "├─┬─ Dir indexing:\n│ ├─── Seeds.......... {:#x}, {:#x}, {:#x}, {:#x}",
            sb.dir_hash_seeds[0], sb.dir_hash_seeds[1], sb.dir_hash_seeds[2], sb.dir_hash_seeds[3]
        );
        println!("│ └─── Hash version... {}", sb.default_hash_version);
    } else {
        println!("├─ Dir indexing: not present");
    }
    println!("│");

    println!("└─┬─ Other options:");
    println!("  ├─── Mount options.. {:#04x}", sb.default_mount_options);
    println!("  └─── 1st meta BG.... {}", sb.first_meta_bg);
}

fn dump_descriptor(desc: &BlockGroupDescriptor, num: usize) {
    println!("* Block Group Descriptor (#{num})");
    println!("│");

    println!("├─ Block bitmap... {}", desc.block_usage_bitmap_addr);
    println!("├─ Inode bitmap... {}", desc.inode_usage_bitmap_addr);
    println!("│");
    println!("├─ Inode table.... {}", desc.inode_table_start_addr);
    println!("│");
    println!("├─ Free blocks.... {}", desc.unallocated_blocks_number);
    println!("├─ Free inodes.... {}", desc.unallocated_inodes_number);
    println!("│");
    println!("└─ Dir inodes..... {}", desc.directories_number);
}

/// Renders a read/write/execute triplet of the inode's mode.
fn perms(mode: u16, read: u16, write: u16, exec: u16) -> String {
    let mut s = String::with_capacity(3);
    s.push(if mode & read != 0 { 'R' } else { '-' });
    s.push(if mode & write != 0 { 'W' } else { '-' });
    s.push(if mode & exec != 0 { 'X' } else { '-' });
    s
}

fn dump_inode(ino: &Inode, sb: &Superblock, num: u32) {
    let mode = |mask| yesno(ino.mode & mask != 0);
    let flag = |mask| yesno(ino.flags & mask != 0);

    println!("* Inode (#{num})");
    println!("│");

    println!("├─┬─ Mode:");
    println!(
        "│ ├─── User......... {}",
        perms(ino.mode, inode::MODE_USER_R, inode::MODE_USER_W, inode::MODE_USER_X)
    );
    println!(
        "│ ├─── Group........ {}",
        perms(ino.mode, inode::MODE_GROUP_R, inode::MODE_GROUP_W, inode::MODE_GROUP_X)
    );
    println!(
        "│ ├─── Others....... {}",
        perms(ino.mode, inode::MODE_OTHER_R, inode::MODE_OTHER_W, inode::MODE_OTHER_X)
    );
    println!("│ │");

    println!("│ ├─── Set UID...... {}", mode(inode::MODE_SET_UID));
    println!("│ ├─── Set GID...... {}", mode(inode::MODE_SET_GID));
    println!("│ ├─── Sticky bit... {}", mode(inode::MODE_STICKY));
    println!("│ │");

    println!("│ └─┬─ Format:");
    println!("│   ├─── Socket?......... {}", mode(inode::MODE_SOCKET));
    println!("│   ├─── Symlink?........ {}", mode(inode::MODE_SYMLINK));
    println!("│   ├─── Regular file?... {}", mode(inode::MODE_REGULAR));
    println!("│   ├─── Block device?... {}", mode(inode::MODE_BLOCK_DEVICE));
    println!("│   ├─── Directory?...... {}", mode(inode::MODE_DIRECTORY));
    println!("│   ├─── Char. device?... {}", mode(inode::MODE_CHAR_DEVICE));
    println!("│   └─── FIFO?........... {}", mode(inode::MODE_FIFO));
    println!("│");

    println!("├─ UID.... {}", ino.uid);
    println!("├─ Size... {} bytes", ino.get_size(sb));
    println!("│");

    println!("├─ Access time......... {}", fmt_time(ino.atime as i64));
    println!("├─ Creation time....... {}", fmt_time(ino.ctime as i64));
    println!("├─ Modification time... {}", fmt_time(ino.mtime as i64));
    println!("├─ Deletion time....... {}", fmt_time(ino.dtime as i64));
    println!("│");

    println!("├─ Group with access... {}", ino.gid);
    println!("├─ Linked to........... {} times", ino.hard_links_count);
    println!("│");

    println!("├─┬─ Flags:");
    println!("│ ├─── Secure rm?..... {}", flag(inode::FLAG_SECURE_RM));
    println!("│ ├─── Record unrm?... {}", flag(inode::FLAG_RECORD_UNRM));
    println!("│ ├─── Compress?...... {}", flag(inode::FLAG_COMPRESS));
    println!("│ ├─── Sync?.......... {}", flag(inode::FLAG_SYNC));
    println!("│ ├─── Immutable?..... {}", flag(inode::FLAG_IMMUTABLE));
    println!("│ ├─── Append?........ {}", flag(inode::FLAG_APPEND));
    println!("│ ├─── No dump?....... {}", flag(inode::FLAG_NO_DUMP));
    println!("│ ├─── No atime?...... {}", flag(inode::FLAG_NO_ATIME));
    println!("│ │");

    if ino.flags & inode::FLAG_COMPRESS != 0 {
        println!("│ ├─┬─ Compression:");
        println!("│ │ ├─── Dirty?............. {}", flag(inode::FLAG_DIRTY));
        println!(
            "│ │ ├─── Compress blocks?... {}",
            flag(inode::FLAG_COMPRESSED_BLOCKS)
        );
        println!("│ │ ├─── Access raw data?... {}", flag(inode::FLAG_RAW_DATA));
        println!(
            "│ │ └─── Compress error?.... {}",
            flag(inode::FLAG_COMPRESSION_ERROR)
        );
    } else {
        println!("│ ├─── Compression: not used");
    }
    println!("│ │");

    println!("│ ├─── BTree/hash dir?... {}", flag(inode::FLAG_INDEX_DIR));
    println!("│ ├─── Imagic?........... {}", flag(inode::FLAG_IMAGIC_DIR));
    println!("│ ├─── Journal data?..... {}", flag(inode::FLAG_JOURNAL_DATA));
    println!("│ └─── Reserved?......... {}", flag(inode::FLAG_RESERVED));
    println!("│");

    println!("├─┬─ Blocks:");
    println!("│ ├─── 512-byte blocks count... {}", ino.used_sectors);

    println!("│ ├─┬─ Direct blocks:");
    for ptr in &ino.direct_block_ptrs[..11] {
        println!("│ │ ├─── Block #{ptr}");
    }
    println!("│ │ └─── Block #{}", ino.direct_block_ptrs[11]);
    println!("│ │");

    println!(
        "│ ├─── Indirect block.......... #{}",
        ino.singly_indirect_block_ptr
    );
    println!(
        "│ ├─── Doubly-indirect block... #{}",
        ino.doubly_indirect_block_ptr
    );
    println!(
        "│ └─── Trebly-indirect block... #{}",
        ino.triply_indirect_block_ptr
    );
}
