use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Marks this process as the running instance until dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Default location: `<temp dir>/<program stem>.pid`.
    pub fn default_path() -> PathBuf {
        let stem = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

        std::env::temp_dir().join(format!("{}.pid", stem))
    }

    /// Writes our PID to `path`. Returns `Ok(None)` if another instance holds it.
    pub fn acquire(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to create pid file {}: {}",
                    path.display(),
                    e
                ));
            }
        };

        let guard = Self {
            path: path.to_path_buf(),
        };

        write!(file, "{}", std::process::id())
            .map_err(|e| anyhow::anyhow!("Failed to write pid file {}: {}", path.display(), e))?;

        Ok(Some(guard))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
