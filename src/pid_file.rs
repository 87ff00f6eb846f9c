use crate::command::command_os::pid_exists;
use std::fs::{DirBuilder, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const PID_FOLDER_PERMISSIONS: u32 = 0o755;
const PID_FILE_PERMISSIONS: u32 = 0o644;

#[derive(Error, Debug)]
pub enum PidFileError {
    #[error("invalid PID file path")]
    InvalidFilePath,

    #[error("directory error: `{0}`")]
    DirectoryError(io::Error),

    #[error("file error: `{0}`")]
    SaveError(io::Error),

    #[error("file error: `{0}`")]
    RemoveError(io::Error),

    #[error("pid-file names running process `{0}`. Can't guarantee that no other watchdog is running.")]
    RunningProcessAlreadyStored(u32),
}

/// Keeps the watchdog pid in a file, so external tooling can find it.
///
/// Storing fails while the file names another live process, so only one watchdog runs
/// against the same pid file.
#[derive(Debug, Clone)]
pub struct PidFileStore {
    file_path: PathBuf,
}

impl PidFileStore {
    pub fn new(file_path: &Path) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn store(&self, pid: u32) -> Result<(), PidFileError> {
        let pid_folder = self
            .file_path
            .parent()
            .ok_or(PidFileError::InvalidFilePath)?;

        if !pid_folder.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(PID_FOLDER_PERMISSIONS)
                .create(pid_folder)
                .map_err(PidFileError::DirectoryError)?;
            // The umask may have stripped bits from the requested mode.
            std::fs::set_permissions(pid_folder, Permissions::from_mode(PID_FOLDER_PERMISSIONS))
                .map_err(PidFileError::DirectoryError)?;
        }

        #[cfg(not(feature = "multiple-instances"))]
        if let Some(stored) = self.read() {
            if stored != pid && pid_exists(stored) {
                return Err(PidFileError::RunningProcessAlreadyStored(stored));
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(PID_FILE_PERMISSIONS)
            .open(&self.file_path)
            .map_err(PidFileError::SaveError)?;
        file.set_permissions(Permissions::from_mode(PID_FILE_PERMISSIONS))
            .map_err(PidFileError::SaveError)?;
        writeln!(file, "{pid}").map_err(PidFileError::SaveError)?;

        debug!(path = %self.file_path.display(), "Stored watchdog pid {pid}");
        Ok(())
    }

    /// Pid currently in the file, if there is a readable one.
    pub fn read(&self) -> Option<u32> {
        std::fs::read_to_string(&self.file_path)
            .ok()
            .and_then(|content| content.trim().parse().ok())
    }

    /// Removes the file. A file that is already gone is not an error.
    pub fn remove(&self) -> Result<(), PidFileError> {
        match std::fs::remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PidFileError::RemoveError(err)),
        }
    }
}
