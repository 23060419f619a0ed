//! Local filesystem helpers: destination validation, idempotent album
//! folders, and the stat/checksum probes behind the dedup decision.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DestError {
    #[error("destination path must be absolute, got {}", .0.display())]
    NotAbsolute(PathBuf),
    #[error("destination path doesn't exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("destination path isn't a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("destination directory isn't writable: {}: {}", .0.display(), .1)]
    NotWritable(PathBuf, io::Error),
}

/// Create `path` and any missing parents. A pre-existing directory is fine; a
/// pre-existing non-directory is an error.
pub fn create_folder(path: &Path) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a directory", path.display()),
        )),
        Err(_) => {
            info!("Creating folder {}", path.display());
            fs::create_dir_all(path)
        }
    }
}

/// Validate the backup destination: absolute, existing, a directory, and
/// writable (probed with a throwaway file).
pub fn check_dest_folder(path: &Path) -> Result<(), DestError> {
    if !path.is_absolute() {
        return Err(DestError::NotAbsolute(path.to_path_buf()));
    }
    let meta = fs::metadata(path).map_err(|_| DestError::Missing(path.to_path_buf()))?;
    if !meta.is_dir() {
        return Err(DestError::NotADirectory(path.to_path_buf()));
    }

    let probe = path.join(".smgmg-write-probe");
    fs::write(&probe, b"")
        .map_err(|e| DestError::NotWritable(path.to_path_buf(), e))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Whether a file exists at `path` with exactly `size` bytes.
pub fn same_file_size(path: &Path, size: u64) -> io::Result<bool> {
    Ok(fs::metadata(path)?.len() == size)
}

/// Lowercase hex MD5 of a local file, for the strict dedup policy.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
