//! Filesystem access, routed through a narrow interface so that tests can
//! substitute an in-memory implementation.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

/// MTime info gathered for a file.  This also models "file is absent".
/// It's not an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MTime {
    Missing,
    /// Seconds since the epoch.
    Stamp(i64),
}

impl MTime {
    pub fn stamp(&self) -> Option<i64> {
        match self {
            MTime::Missing => None,
            MTime::Stamp(t) => Some(*t),
        }
    }
}

pub trait Disk {
    /// stat() an on-disk path, producing its MTime.
    fn stat(&self, path: &str) -> io::Result<MTime>;
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;
    /// Create a single directory; an already-existing directory is not an
    /// error.
    fn make_dir(&self, path: &str) -> io::Result<()>;
    /// Remove a file, reporting whether it existed.
    fn remove_file(&self, path: &str) -> io::Result<bool>;
}

pub struct SystemDisk;

impl Disk for SystemDisk {
    fn stat(&self, path: &str) -> io::Result<MTime> {
        match std::fs::metadata(path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                Ok(MTime::Stamp(mtime))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(MTime::Missing),
            Err(err) => Err(err),
        }
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn make_dir(&self, path: &str) -> io::Result<()> {
        match std::fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn remove_file(&self, path: &str) -> io::Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Create `path` and any missing ancestor directories.
pub fn make_dirs(disk: &dyn Disk, path: &str) -> io::Result<()> {
    match disk.make_dir(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let parent = match path.rsplit_once(['/', '\\']) {
                Some((parent, _)) if !parent.is_empty() => parent,
                _ => return Err(err),
            };
            make_dirs(disk, parent)?;
            disk.make_dir(path)
        }
        Err(err) => Err(err),
    }
}

/// The directory component of a path, if it has one.
pub fn parent_dir(path: &str) -> Option<&str> {
    match path.rsplit_once(['/', '\\']) {
        Some((parent, _)) if !parent.is_empty() => Some(parent),
        _ => None,
    }
}
