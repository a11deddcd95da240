use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {step} for checkpoint '{}': {source}", path.display())]
    Write {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint path '{}' has no parent directory", .0.display())]
    NoParent(PathBuf),

    #[error("checkpoint '{}' exists but holds no watermark", path.display())]
    Corrupt { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Durable record of the last fully processed log file.
///
/// The file holds a single line: the path of that log file. Saves go through
/// a sibling `.tmp` file that is fsynced and renamed into place, then the
/// directory is fsynced, so after a crash the checkpoint holds either the old
/// or the new value.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Load the watermark. `Ok(None)` when nothing was saved yet.
    ///
    /// `save` never leaves an empty file behind, so a checkpoint without a
    /// watermark is reported as [`CheckpointError::Corrupt`].
    pub fn load(&self) -> Result<Option<PathBuf>> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No checkpoint found");
                return Ok(None);
            }
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut end = contents.len();
        while end > 0 && matches!(contents[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        let watermark = &contents[..end];

        if watermark.iter().all(u8::is_ascii_whitespace) {
            return Err(CheckpointError::Corrupt {
                path: self.path.clone(),
            });
        }

        let watermark = bytes_to_path(watermark);
        tracing::debug!(watermark = %watermark.display(), "Loaded checkpoint");
        Ok(Some(watermark))
    }

    /// Durably replace the watermark with `watermark`.
    pub fn save(&self, watermark: &Path) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => return Err(CheckpointError::NoParent(self.path.clone())),
        };
        let write_err = |step: &'static str| {
            let path = self.path.clone();
            move |source| CheckpointError::Write { step, path, source }
        };

        fs::create_dir_all(dir).map_err(write_err("create directory"))?;

        let tmp = self.tmp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .map_err(write_err("create temp file"))?;
            file.write_all(&path_to_bytes(watermark))
                .map_err(write_err("write temp file"))?;
            file.sync_all().map_err(write_err("sync temp file"))?;
        }

        fs::rename(&tmp, &self.path).map_err(write_err("rename temp file"))?;
        sync_dir(dir).map_err(write_err("sync directory"))?;

        tracing::debug!(watermark = %watermark.display(), "Checkpoint saved");
        Ok(())
    }
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directory handles cannot be fsynced here; the rename is as durable as it gets.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
