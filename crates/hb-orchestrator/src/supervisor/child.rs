//! Launching and terminating service processes

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use hb_core::config::ServiceSpec;
use hb_core::process as os;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// A launched service process, exclusively owned by its slot
pub struct ServiceProcess {
    child: Child,
    pid: u32,
}

impl ServiceProcess {
    /// Spawn the service with its merged environment.
    ///
    /// stdout and stderr are forwarded line by line into `tracing`.
    pub fn spawn(spec: &ServiceSpec, env: &BTreeMap<String, String>) -> std::io::Result<Self> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "process exited before reporting a pid")
        })?;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(spec.name.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(spec.name.clone(), "stderr", stderr);
        }

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit description if the process has already exited
    pub fn exited(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("wait failed: {}", e)),
        }
    }

    /// Graceful signal, wait up to `grace`, then kill. Always reaps.
    pub async fn terminate(mut self, grace: Duration) {
        if self.exited().is_some() {
            return;
        }
        if let Err(e) = os::request_exit(self.pid) {
            tracing::debug!(pid = self.pid, "Graceful signal failed: {}", e);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(pid = self.pid, "Process ignored graceful signal, killing");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(pid = self.pid, "Failed to kill process: {}", e);
                }
            }
        }
    }

    /// Kill without a grace period (failed launch attempts)
    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(pid = self.pid, "Kill after failed launch: {}", e);
        }
    }
}

fn forward_lines<R>(service: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(service = %service, stream, "{}", line);
        }
    });
}
