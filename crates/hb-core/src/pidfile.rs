//! PID file for the single running orchestrator
//!
//! `harbor start` refuses to run when the PID file names a live process;
//! `harbor stop` uses it as a fallback when IPC is unreachable.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::config;

const PID_FILE_NAME: &str = "harbor.pid";

/// Get the default PID file path
pub fn default_pid_path() -> PathBuf {
    config::default_config_dir().join(PID_FILE_NAME)
}

/// Read the PID recorded in `path`.
///
/// `Ok(None)` when the file does not exist; malformed contents are an error.
pub fn read_pid_file(path: &Path) -> io::Result<Option<u32>> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    contents
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", pid)
}

/// Remove the PID file; a missing file is not an error.
pub fn remove_pid_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// PID of a live orchestrator recorded at `path`, clearing stale files.
pub fn live_pid(path: &Path) -> io::Result<Option<u32>> {
    match read_pid_file(path) {
        Ok(Some(pid)) if crate::process::is_process_alive(pid) => Ok(Some(pid)),
        Ok(Some(pid)) => {
            tracing::debug!(pid, "Removing stale PID file {:?}", path);
            remove_pid_file(path)?;
            Ok(None)
        }
        Ok(None) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            remove_pid_file(path)?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Removes the PID file when dropped, including on panic
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    pub fn new(path: PathBuf, pid: u32) -> io::Result<Self> {
        write_pid_file(&path, pid)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            tracing::warn!("Failed to remove PID file {:?}: {}", self.path, e);
        }
    }
}
