//! Parser and limited editor for `ext2` filesystem images.
//!
//! The whole image is held in memory: opening a filesystem slurps the file
//! into a buffer, and every subsequent operation is pointer arithmetic
//! against that buffer. Modifications stay in memory until they are written
//! back with [`fs::Ext2::save`].

use std::fmt;
use std::io;
use std::process::exit;

pub mod bg;
pub mod bgdescriptor;
pub mod cursor;
pub mod dir;
pub mod fs;
pub mod inode;
pub mod superblock;
pub mod term;

pub use fs::Ext2;

/// Errors reported by the filesystem layer.
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure while reading or writing the image file.
    Io(io::Error),
    /// The superblock signature does not match `0xef53`.
    BadMagic(u16),
    /// An access ran past the end of the image.
    OutOfBounds,
    /// The inode is not a directory.
    NotADir,
    /// The inode is not a regular file.
    NotAFile,
    /// No directory entry with the requested name.
    NotFound,
    /// Invalid arguments to a command.
    BadArgs,
    /// The operation requires a mounted filesystem.
    NotMounted,
    /// The operation is not supported on this filesystem.
    Unimplemented,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(fmt, "{e}"),
            Self::BadMagic(magic) => {
                write!(fmt, "bad superblock magic {magic:04x} (should be ef53)")
            }
            Self::OutOfBounds => write!(fmt, "tried to read past the end of the image"),
            Self::NotADir => write!(fmt, "not a directory"),
            Self::NotAFile => write!(fmt, "not a regular file"),
            Self::NotFound => write!(fmt, "entry not found"),
            Self::BadArgs => write!(fmt, "bad arguments"),
            Self::NotMounted => write!(fmt, "no filesystem is mounted"),
            Self::Unimplemented => write!(fmt, "operation not supported"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Writes an error to stderr, then exits.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}
