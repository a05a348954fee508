//! `ext2p` is an interactive reader and limited editor for ext2 filesystem
//! images.
//!
//! The image is read fully into memory; the shell then navigates its
//! directory tree and can persist modifications back to a file with the
//! `save` command.

mod shell;
mod util;

use shell::Shell;
use std::env;
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The path to the filesystem image to open.
    images: Vec<PathBuf>,
}

fn parse_args() -> Args {
    let mut res: Args = Default::default();
    for arg in env::args_os().skip(1) {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            _ => res.images.push(arg.into()),
        }
    }
    res
}

/// Prints command usage.
fn print_usage() {
    eprintln!("usage: ext2p [IMAGE]");
    eprintln!("Try 'ext2p --help' for more information.");
}

/// Prints command help.
fn print_help() {
    println!();
    println!("Usage:");
    println!(" ext2p [IMAGE]");
    println!();
    println!("Opens an interactive shell on the ext2 filesystem image at IMAGE.");
    println!("Without an image, the shell starts unmounted; use its 'mount' command.");
    println!();
    println!("Options:");
    println!(" -h, --help\tPrints help.");
}

fn main() {
    let args = parse_args();
    if args.help {
        print_help();
        exit(0);
    }
    if args.images.len() > 1 {
        print_usage();
        exit(1);
    }

    let mut shell = match args.images.first() {
        Some(path) => Shell::open(path).unwrap_or_else(|e| {
            ext2::error("ext2p", format_args!("{}: {e}", path.display()));
        }),
        None => Shell::new(),
    };
    shell.run();
}
