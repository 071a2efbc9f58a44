//! Capability-scoped access to a workspace root.

use super::{StorageError, StorageResult, TASKS_DIR};
use crate::task::domain::TaskId;
use cap_std::ambient_authority;
use cap_std::fs::{Dir, OpenOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Handle on a workspace root directory.
///
/// All paths passed to this type are relative to the root; the underlying
/// [`Dir`] capability prevents escaping it.
#[derive(Debug, Clone)]
pub struct WorkspaceDir {
    root: PathBuf,
    dir: Arc<Dir>,
}

impl WorkspaceDir {
    /// Opens (creating if needed) the workspace root at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the directory cannot be created or
    /// opened.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        Dir::create_ambient_dir_all(&root, ambient_authority())
            .map_err(|err| StorageError::io(&root, err))?;
        let dir = Dir::open_ambient_dir(&root, ambient_authority())
            .map_err(|err| StorageError::io(&root, err))?;
        Ok(Self {
            root,
            dir: Arc::new(dir),
        })
    }

    /// Returns the absolute root path this handle was opened with.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomically replaces `path` with the JSON encoding of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when encoding or any filesystem step fails.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StorageResult<()> {
        let mut buf =
            serde_json::to_vec_pretty(value).map_err(|err| StorageError::codec(path, err))?;
        buf.push(b'\n');
        self.write_atomic(path, &buf)
    }

    /// Reads and decodes the JSON record at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the file cannot be read or decoded.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> StorageResult<Option<T>> {
        let contents = match self.dir.read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(path, err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| StorageError::codec(path, err))
    }

    /// Reads the raw bytes at `path`, or `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the file cannot be read.
    pub fn read_bytes(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match self.dir.read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    /// Returns whether `path` exists.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.dir.exists(path)
    }

    /// Writes `bytes` to `path` via a temporary sibling, fsync and rename.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when any filesystem step fails.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let parent = non_empty_parent(path);
        if let Some(parent) = parent {
            self.dir
                .create_dir_all(parent)
                .map_err(|err| StorageError::io(parent, err))?;
        }

        let tmp_path = temporary_sibling(path);
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        let mut file = self
            .dir
            .open_with(&tmp_path, &options)
            .map_err(|err| StorageError::io(&tmp_path, err))?;
        file.write_all(bytes)
            .map_err(|err| StorageError::io(&tmp_path, err))?;
        file.sync_all()
            .map_err(|err| StorageError::io(&tmp_path, err))?;
        drop(file);

        self.dir
            .rename(&tmp_path, &self.dir, path)
            .map_err(|err| StorageError::io(path, err))?;
        self.sync_directory(parent.unwrap_or_else(|| Path::new(".")));
        debug!(path = %path.display(), bytes = bytes.len(), "record written");
        Ok(())
    }

    /// Opens (creating if needed) a lock file and returns it as a std file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the file cannot be opened.
    pub fn open_lock_file(&self, path: &Path) -> StorageResult<std::fs::File> {
        if let Some(parent) = non_empty_parent(path) {
            self.dir
                .create_dir_all(parent)
                .map_err(|err| StorageError::io(parent, err))?;
        }
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        let file = self
            .dir
            .open_with(path, &options)
            .map_err(|err| StorageError::io(path, err))?;
        Ok(file.into_std())
    }

    /// Lists identifiers of tasks that have a directory under the root.
    ///
    /// Entries that are not task identifiers are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the tasks directory cannot be read.
    pub fn task_ids(&self) -> StorageResult<Vec<TaskId>> {
        let tasks_dir = Path::new(TASKS_DIR);
        let entries = match self.dir.read_dir(tasks_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(tasks_dir, err)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io(tasks_dir, err))?;
            if let Some(id) = parse_task_id(&entry.file_name()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn sync_directory(&self, path: &Path) {
        // Directory fsync makes the rename durable; not every platform
        // allows opening a directory as a file.
        match self.dir.open(path) {
            Ok(handle) => {
                if let Err(err) = handle.sync_all() {
                    debug!(path = %path.display(), %err, "directory sync unsupported");
                }
            }
            Err(err) => warn!(path = %path.display(), %err, "could not open directory for sync"),
        }
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("record"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

fn parse_task_id(name: &std::ffi::OsStr) -> Option<TaskId> {
    name.to_str()
        .and_then(|value| Uuid::parse_str(value).ok())
        .map(TaskId::from_uuid)
}
