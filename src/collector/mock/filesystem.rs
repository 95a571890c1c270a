//! In-memory mock filesystem for testing the provider without real `/proc`.

use crate::collector::traits::{FileSystem, FsStat};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores text files, binary files, directories and per-mount capacity in
/// memory, so tests can describe a whole host (procfs, sysfs, `/etc`, utmp).
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    binary: HashMap<PathBuf, Vec<u8>>,
    directories: HashSet<PathBuf>,
    mounts: HashMap<PathBuf, FsStat>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds a binary file.
    pub fn add_binary(&mut self, path: impl AsRef<Path>, content: Vec<u8>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.binary.insert(path, content);
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Registers capacity figures returned by `statvfs` for a mount point.
    pub fn add_mount_stat(&mut self, path: impl AsRef<Path>, stat: FsStat) {
        self.mounts.insert(path.as_ref().to_path_buf(), stat);
    }

    /// Removes a file, simulating a source that disappeared.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
        self.binary.remove(path.as_ref());
    }

    /// Adds a process with its `/proc/[pid]/{stat,status,comm}` files.
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, comm: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        self.add_file(base.join("comm"), comm);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found: {:?}", what, path),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        if let Some(content) = self.files.get(path) {
            return Ok(content.clone());
        }
        match self.binary.get(path) {
            Some(bytes) => String::from_utf8(bytes.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Err(not_found("file", path)),
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(bytes) = self.binary.get(path) {
            return Ok(bytes.clone());
        }
        self.files
            .get(path)
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| not_found("file", path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
            || self.binary.contains_key(path)
            || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(not_found("directory", path));
        }

        let mut entries = HashSet::new();
        let is_child = |p: &Path| p.parent().is_some_and(|parent| parent == path);

        for file_path in self.files.keys().chain(self.binary.keys()) {
            if is_child(file_path) {
                entries.insert(file_path.clone());
            }
        }
        for dir_path in &self.directories {
            if is_child(dir_path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        let mut entries: Vec<PathBuf> = entries.into_iter().collect();
        entries.sort();
        Ok(entries)
    }

    fn statvfs(&self, path: &Path) -> io::Result<FsStat> {
        self.mounts
            .get(path)
            .copied()
            .ok_or_else(|| not_found("mount", path))
    }
}
