//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait lets the provider read the real `/proc`, `/sys` and
//! `/etc` trees on Linux, or an in-memory `MockFs` in tests.

use std::io;
use std::path::{Path, PathBuf};

/// Capacity figures for one mounted filesystem, as reported by `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStat {
    /// Fragment size in bytes (`f_frsize`).
    pub block_size: u64,
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks, including those reserved for root.
    pub blocks_free: u64,
    /// Blocks available to unprivileged users.
    pub blocks_avail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub files_free: u64,
}

/// Abstraction for filesystem operations.
///
/// This trait allows the provider to read from the real filesystem or from
/// a mock implementation for testing purposes.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Reads the entire contents of a file as raw bytes (utmp and friends).
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    ///
    /// # Returns
    /// A vector of paths to entries in the directory, or an I/O error.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Queries capacity of the filesystem mounted at `path`.
    fn statvfs(&self, path: &Path) -> io::Result<FsStat>;
}

/// Real filesystem implementation that delegates to `std::fs` and libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    #[cfg(unix)]
    fn statvfs(&self, path: &Path) -> io::Result<FsStat> {
        use std::ffi::CString;
        use std::mem::MaybeUninit;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();

        // SAFETY: c_path is a valid NUL-terminated string and stat points to
        // writable memory large enough for a statvfs struct.
        let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: statvfs returned 0, so the struct is initialized.
        let stat = unsafe { stat.assume_init() };
        Ok(FsStat {
            block_size: stat.f_frsize as u64,
            blocks: stat.f_blocks as u64,
            blocks_free: stat.f_bfree as u64,
            blocks_avail: stat.f_bavail as u64,
            files: stat.f_files as u64,
            files_free: stat.f_ffree as u64,
        })
    }

    #[cfg(not(unix))]
    fn statvfs(&self, _path: &Path) -> io::Result<FsStat> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "statvfs is not available on this platform",
        ))
    }
}
