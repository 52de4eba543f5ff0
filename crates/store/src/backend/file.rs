//! File-based storage backend using whole-image atomic replacement.
//!
//! Each commit writes the complete image to `<path>.tmp`, optionally syncs it,
//! and renames it over `<path>`. Rename is atomic on the platforms we support,
//! so readers of the path always see a complete image.
//!
//! Writes are serialized via a lightweight [`parking_lot::Mutex`] guard. The
//! database already guarantees at most one committing write transaction, so
//! the guard only protects against misuse of a shared backend.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::warn;

use super::StorageBackend;
use crate::error::Result;

/// File-based storage backend.
pub struct FileBackend {
    /// Location of the committed image.
    path: PathBuf,
    /// Location of the in-flight image during a commit.
    tmp_path: PathBuf,
    /// Serializes image replacement.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens a backend rooted at `path`, creating parent directories as needed.
    ///
    /// The image file itself is created on first commit. A leftover temporary
    /// image from an interrupted commit is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the parent directory cannot
    /// be created or a stale temporary image cannot be removed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        match fs::remove_file(&tmp_path) {
            Ok(()) => {
                warn!(
                    path = %tmp_path.display(),
                    "Removed temporary image from interrupted commit"
                );
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }

        Ok(Self { path, tmp_path, write_lock: Mutex::new(()) })
    }

    /// Returns the path of the committed image.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    const PERSISTENT: bool = true;

    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, image: &[u8], sync: bool) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut file =
            OpenOptions::new().write(true).create(true).truncate(true).open(&self.tmp_path)?;
        file.write_all(image)?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;

        if sync {
            sync_parent_dir(&self.path)?;
        }

        Ok(())
    }
}

/// Makes a completed rename durable by syncing the containing directory.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            File::open(parent)?.sync_all()?;
            Ok(())
        },
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
