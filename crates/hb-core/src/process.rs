//! OS process utilities: liveness checks and signal-based termination.

use std::io;
use std::time::{Duration, Instant};

/// How often liveness is re-checked while waiting for a process to exit
const EXIT_POLL: Duration = Duration::from_millis(50);

/// How a termination request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Process was already gone
    NotRunning,
    /// Process exited within the grace period
    Graceful,
    /// Process had to be killed
    Forced,
}

/// Check if a process with the given PID is still alive.
///
/// On Linux a zombie counts as dead: it holds no sockets and only waits to
/// be reaped by its parent.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Some(target) = to_pid_t(pid) else {
        return false;
    };
    // kill(pid, 0): 0 or EPERM both mean the process exists
    let exists = unsafe {
        libc::kill(target, 0) == 0
            || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    };
    exists && !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // Format: "pid (comm) S ..."; comm may contain spaces and parens
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let after = stat.rfind(')')?;
            stat[after + 1..].split_whitespace().next().map(|s| s == "Z")
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        let mut code = 0u32;
        let ok = GetExitCodeProcess(handle, &mut code) != 0;
        CloseHandle(handle);
        ok && code == STILL_ACTIVE as u32
    }
}

/// Ask a process to exit (SIGTERM)
#[cfg(unix)]
pub fn request_exit(pid: u32) -> io::Result<()> {
    signal(pid, libc::SIGTERM)
}

/// Kill a process outright (SIGKILL)
#[cfg(unix)]
pub fn force_kill(pid: u32) -> io::Result<()> {
    signal(pid, libc::SIGKILL)
}

/// A single positive process id. Zero and negative values address
/// process groups in kill(2), so they are never produced.
#[cfg(unix)]
fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

#[cfg(unix)]
fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
    let target = to_pid_t(pid).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a valid process id", pid),
        )
    })?;
    let result = unsafe { libc::kill(target, sig) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone
        return Ok(());
    }
    Err(err)
}

#[cfg(windows)]
pub fn request_exit(pid: u32) -> io::Result<()> {
    // No SIGTERM on Windows; taskkill without /F posts WM_CLOSE
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|_| ())
}

#[cfg(windows)]
pub fn force_kill(pid: u32) -> io::Result<()> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle == 0 {
            return Ok(());
        }
        let ok = TerminateProcess(handle, 1) != 0;
        CloseHandle(handle);
        if ok {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Poll until `pid` is gone or `timeout` elapses. Returns whether it exited.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL).await;
    }
}

/// Request exit, wait up to `grace`, then kill.
///
/// Errors only when the process survives the forceful signal too.
pub async fn terminate_gracefully(pid: u32, grace: Duration) -> io::Result<Termination> {
    if !is_process_alive(pid) {
        return Ok(Termination::NotRunning);
    }

    if let Err(e) = request_exit(pid) {
        tracing::debug!(pid, "Graceful signal failed: {}", e);
    }
    if wait_for_exit(pid, grace).await {
        return Ok(Termination::Graceful);
    }

    tracing::debug!(pid, "Process ignored graceful signal, killing");
    force_kill(pid)?;
    if wait_for_exit(pid, Duration::from_secs(2)).await {
        Ok(Termination::Forced)
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("process {} survived a forceful kill", pid),
        ))
    }
}
