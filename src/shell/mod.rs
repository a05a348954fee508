//! Interactive shell over an ext2 filesystem image.
//!
//! The shell keeps a current-directory inode and a path stack for the
//! prompt; every command resolves names against the current directory's
//! entries. A failed command tints the next prompt red.

mod dump;

use crate::util::ByteSize;
use crate::util::fmt_time;
use crate::util::levenshtein;
use ext2::Error;
use ext2::Ext2;
use ext2::Result;
use ext2::dir::DirEntry;
use ext2::dir::FileType;
use ext2::inode::INODE_ROOT_DIR;
use ext2::term;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;

/// Maximum number of tokens a command line is split into.
const ARGS_MAX: usize = 64;
/// Maximum depth of the displayed path stack.
const PATH_DEPTH_MAX: usize = 128;

/// Every command name, aliases included.
const COMMANDS: [&str; 18] = [
    "cat", "cd", "clear", "cls", "dir", "exit", "fsdump", "help", "ls", "man", "mnt", "mount",
    "rm", "rmdir", "save", "stat", "umnt", "umount",
];

/// Returns the known command closest to `cmd`, if any is close enough to
/// look like a typo.
fn suggest(cmd: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .map(|name| (levenshtein(cmd, name), *name))
        .min_by_key(|(dist, _)| *dist)
        .filter(|(dist, _)| *dist <= 2)
        .map(|(_, name)| name)
}

/// The interactive shell's state.
pub struct Shell {
    /// The mounted filesystem, if any.
    fs: Option<Ext2>,
    /// The current directory's inode.
    cwd: u32,
    /// Names of the directories walked into, for the prompt.
    path: Vec<String>,

    /// Cleared by `exit`.
    run: bool,
    /// Tells whether the previous command failed.
    failed: bool,
}

impl Shell {
    /// Creates a shell with no mounted filesystem.
    pub fn new() -> Self {
        Self {
            fs: None,
            cwd: INODE_ROOT_DIR,
            path: Vec::new(),
            run: true,
            failed: false,
        }
    }

    /// Creates a shell over the filesystem image at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            fs: Some(Ext2::open(path)?),
            ..Self::new()
        })
    }

    /// Runs the command loop until `exit` or end of input.
    pub fn run(&mut self) {
        println!("== ext2 shell ==");
        println!("type 'help' for help");

        while self.run {
            self.print_prompt();

            let Some(Ok(line)) = io::stdin().lock().lines().next() else {
                break;
            };
            let mut argv: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
            if argv.is_empty() {
                continue;
            }
            if argv.len() > ARGS_MAX {
                term::warn(format_args!(
                    "only up to {ARGS_MAX} arguments can be passed to a shell command \
                     (command will be truncated at arg '{}')",
                    argv[ARGS_MAX - 1]
                ));
                argv.truncate(ARGS_MAX);
            }

            let res = self.dispatch(&argv);
            self.failed = res.is_err();
            if let Err(e) = res {
                // Bad arguments already printed their usage
                if !matches!(e, Error::BadArgs) {
                    term::report(e);
                }
            }
        }
    }

    fn print_prompt(&self) {
        print!("\n/");
        for name in &self.path {
            print!("{name}/");
        }

        if self.failed && term::stdout_is_tty() {
            print!("\n{}> {}", term::ANSI_RED, term::ANSI_RESET);
        } else {
            print!("\n> ");
        }
        let _ = io::stdout().flush();
    }

    fn dispatch(&mut self, argv: &[&str]) -> Result<()> {
        match argv[0] {
            "cat" => self.cmd_cat(argv),
            "cd" => self.cmd_cd(argv),
            "clear" | "cls" => {
                print!("{}", term::ANSI_CLEAR);
                Ok(())
            }
            "dir" | "ls" => self.cmd_ls(),
            "exit" => {
                self.run = false;
                Ok(())
            }
            "fsdump" => self.cmd_fsdump(argv),
            "help" => {
                print_help();
                Ok(())
            }
            "man" => self.cmd_man(argv),
            "mount" | "mnt" => self.cmd_mount(argv),
            "rm" => self.cmd_rm(argv),
            "rmdir" => self.cmd_rmdir(argv),
            "save" => self.cmd_save(argv),
            "stat" => self.cmd_stat(argv),
            "umount" | "umnt" => self.cmd_umount(),
            cmd => {
                match suggest(cmd) {
                    Some(best) => println!("no such command '{cmd}' (did you mean '{best}'?)"),
                    None => println!("no such command '{cmd}'"),
                }
                Err(Error::BadArgs)
            }
        }
    }

    /// Returns the mounted filesystem.
    fn get_fs(&mut self) -> Result<&mut Ext2> {
        self.fs.as_mut().ok_or(Error::NotMounted)
    }

    /// Reads the current directory's entries.
    fn read_cwd(&mut self) -> Result<Vec<DirEntry>> {
        let cwd = self.cwd;
        self.get_fs()?.read_dir(cwd)
    }

    /// Finds the entry named `name`, reporting the miss.
    fn find_entry<'e>(entries: &'e [DirEntry], name: &str) -> Result<&'e DirEntry> {
        match entries.iter().find(|e| e.name == name) {
            Some(entry) => Ok(entry),
            None => {
                term::report(format_args!("'{name}' not found"));
                Err(Error::BadArgs)
            }
        }
    }

    fn cmd_cat(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: cat FILE");
            return Err(Error::BadArgs);
        }

        let entries = self.read_cwd()?;
        let entry = Self::find_entry(&entries, argv[1])?;
        if entry.get_type() != Some(FileType::Regular) {
            println!("'{}' is not a file (is a {})", argv[1], entry.type_name());
            return Err(Error::BadArgs);
        }

        let inodenum = entry.inode;
        let contents = self.get_fs()?.read_file(inodenum)?;
        io::stdout().write_all(&contents).map_err(Error::Io)
    }

    fn cmd_cd(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: cd DIR");
            return Err(Error::BadArgs);
        }

        let into = argv[1];
        if into == "." {
            return Ok(());
        }

        let entries = self.read_cwd()?;
        let entry = Self::find_entry(&entries, into)?;
        if entry.get_type() != Some(FileType::Directory) {
            println!("'{}' is not a dir (is a {})", into, entry.type_name());
            return Err(Error::BadArgs);
        }

        self.cwd = entry.inode;
        if into == ".." {
            self.path.pop();
        } else if self.path.len() < PATH_DEPTH_MAX {
            self.path.push(entry.name.clone());
        }

        Ok(())
    }

    fn cmd_ls(&mut self) -> Result<()> {
        let entries = self.read_cwd()?;
        for entry in &entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            println!("  {:<7} {}", entry.type_name(), entry.name);
        }

        Ok(())
    }

    fn cmd_stat(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: stat FILE");
            return Err(Error::BadArgs);
        }

        let entries = self.read_cwd()?;
        let entry = Self::find_entry(&entries, argv[1])?;

        let fs = self.fs.as_mut().ok_or(Error::NotMounted)?;
        let inode = fs.get_inode(entry.inode)?;
        let size = fs.get_inode_size(&inode);
        let fs_blocks = inode.used_sectors / (2 << fs.get_superblock().block_size_log);

        println!("data:");
        println!("  name.... {}", entry.name);
        println!("  type.... {}", entry.type_name());
        println!(
            "  size.... {:<8} blocks... {:<6} fs blocks... {}",
            ByteSize(size).to_string(),
            inode.used_sectors,
            fs_blocks
        );
        println!("  inode... {:<8} links.... {}", entry.inode, inode.hard_links_count);
        println!();
        println!("times:");
        println!("  access... {}", fmt_time(inode.atime as i64));
        println!("  modify... {}", fmt_time(inode.mtime as i64));
        println!("  create... {}", fmt_time(inode.ctime as i64));
        println!("  delete... {}", fmt_time(inode.dtime as i64));

        Ok(())
    }

    fn cmd_fsdump(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            print_fsdump_usage();
            return Err(Error::BadArgs);
        }

        let mut flags = 0;
        for c in argv[1].chars() {
            match c {
                'a' => flags = dump::DUMP_ALL,
                'b' => {
                    flags |= dump::DUMP_BGDESCRIPTOR;
                    flags &= !dump::DUMP_ALL_BGDESCRIPTOR;
                }
                'B' => {
                    flags |= dump::DUMP_ALL_BGDESCRIPTOR;
                    flags &= !dump::DUMP_BGDESCRIPTOR;
                }
                'i' => {
                    flags |= dump::DUMP_INODE;
                    flags &= !(dump::DUMP_INODE_ALL | dump::DUMP_INODE_ROOT);
                }
                'I' => {
                    flags |= dump::DUMP_INODE_ALL;
                    flags &= !(dump::DUMP_INODE | dump::DUMP_INODE_ROOT);
                }
                'r' => {
                    flags |= dump::DUMP_INODE_ROOT;
                    flags &= !(dump::DUMP_INODE | dump::DUMP_INODE_ALL);
                }
                's' => flags |= dump::DUMP_SUPERBLOCK,
                _ => {
                    println!("unknown character in format string '{c}'");
                    println!();
                    print_fsdump_usage();
                    return Err(Error::BadArgs);
                }
            }
        }

        dump::dump(self.get_fs()?, flags);
        Ok(())
    }

    fn cmd_mount(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: mount IMAGE");
            return Err(Error::BadArgs);
        }
        if self.fs.is_some() {
            println!("a filesystem is already mounted (umount it first)");
            return Err(Error::BadArgs);
        }

        self.fs = Some(Ext2::open(Path::new(argv[1]))?);
        self.cwd = INODE_ROOT_DIR;
        self.path.clear();
        Ok(())
    }

    fn cmd_umount(&mut self) -> Result<()> {
        self.get_fs()?;
        self.fs = None;
        self.cwd = INODE_ROOT_DIR;
        self.path.clear();
        Ok(())
    }

    fn cmd_save(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: save PATH");
            return Err(Error::BadArgs);
        }

        self.get_fs()?.save(Path::new(argv[1]))?;
        term::log(format_args!("image saved to '{}'", argv[1]));
        Ok(())
    }

    fn cmd_rm(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: rm FILE");
            return Err(Error::BadArgs);
        }

        let entries = self.read_cwd()?;
        let entry = Self::find_entry(&entries, argv[1])?;
        if entry.get_type() != Some(FileType::Regular) {
            println!("'{}' is not a file (is a {})", argv[1], entry.type_name());
            return Err(Error::BadArgs);
        }

        let entry = entry.clone();
        let cwd = self.cwd;
        self.get_fs()?.delete_file(cwd, &entry)
    }

    fn cmd_rmdir(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: rmdir DIR");
            return Err(Error::BadArgs);
        }

        let entries = self.read_cwd()?;
        let entry = Self::find_entry(&entries, argv[1])?;
        if entry.get_type() != Some(FileType::Directory) {
            println!("'{}' is not a dir (is a {})", argv[1], entry.type_name());
            return Err(Error::BadArgs);
        }
        if entry.name == "." || entry.name == ".." {
            println!("refusing to remove '{}'", entry.name);
            return Err(Error::BadArgs);
        }

        let entry = entry.clone();
        let cwd = self.cwd;
        self.get_fs()?.delete_dir(cwd, &entry)
    }

    fn cmd_man(&mut self, argv: &[&str]) -> Result<()> {
        if argv.len() != 2 {
            println!("usage: man COMMAND");
            return Err(Error::BadArgs);
        }

        let (usage, about) = match argv[1] {
            "cat" => ("cat FILE", "displays the contents of FILE"),
            "cd" => ("cd DIR", "changes the current directory to DIR"),
            "clear" | "cls" => ("clear", "clears the screen"),
            "dir" | "ls" => ("ls", "lists the contents of the current directory"),
            "exit" => ("exit", "exits the shell"),
            "fsdump" => ("fsdump FORMAT", "dumps filesystem structures (see 'fsdump' alone)"),
            "help" => ("help", "displays general help"),
            "man" => ("man COMMAND", "displays a command's usage"),
            "mount" | "mnt" => ("mount IMAGE", "opens the filesystem image at IMAGE"),
            "rm" => ("rm FILE", "deletes FILE and frees its inode and blocks"),
            "rmdir" => ("rmdir DIR", "recursively deletes the directory DIR"),
            "save" => ("save PATH", "writes the in-memory image to PATH"),
            "stat" => ("stat FILE", "displays information about FILE"),
            "umount" | "umnt" => ("umount", "closes the current filesystem image"),
            cmd => {
                println!("no manual entry for '{cmd}'");
                return Err(Error::BadArgs);
            }
        };
        println!("usage: {usage}");
        println!("  {about}");

        Ok(())
    }
}

fn print_help() {
    println!("== ext2 shell ==");
    println!();
    println!("about:");
    println!("  this is a small shell for interfacing with ext2 filesystem images");
    println!();
    println!("commands:");
    println!("  cat              displays the contents of a file");
    println!("  cd               changes the current directory");
    println!("  clear            clears the screen");
    println!("  cls              'clear' alias -- clears the screen");
    println!("  dir              'ls' alias -- lists the contents of a directory");
    println!("  exit             exits the shell");
    println!("  fsdump           dumps information about the filesystem");
    println!("  help             display this help text");
    println!("  ls               lists the contents of a directory");
    println!("  man              displays a command's usage");
    println!("  mnt              'mount' alias -- opens a filesystem image");
    println!("  mount            opens a filesystem image");
    println!("  rm               deletes a file");
    println!("  rmdir            recursively deletes a directory");
    println!("  save             writes the in-memory image to a file");
    println!("  stat             displays information about a file");
    println!("  umnt             'umount' alias -- closes the current image");
    println!("  umount           closes the current image");
    println!();
    println!("faq:");
    println!("  how do i exit?   ctrl+c or type 'exit'");
}

fn print_fsdump_usage() {
    println!("usage: fsdump FORMAT");
    println!("  a               dumps all");
    println!("  b               dumps the first 32 block group descriptors");
    println!("  B               dumps all block group descriptors");
    println!("  i               dumps the first 32 inodes");
    println!("  I               dumps all inodes");
    println!("  r               dumps the root inode");
    println!("  s               dumps the superblock");
    println!();
    println!("example:");
    println!("  fsdump a        dumps all");
    println!("  fsdump si       dumps the superblock and inodes");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn suggestions() {
        assert_eq!(suggest("lss"), Some("ls"));
        assert_eq!(suggest("ls"), Some("ls"));
        assert_eq!(suggest("exot"), Some("exit"));
        assert_eq!(suggest("moutn"), Some("mount"));
        assert_eq!(suggest("blorbfrobnicate"), None);
    }
}
