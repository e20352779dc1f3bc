//! Restart command implementation

use anyhow::{Context, Result};

use crate::ipc::HarborClient;
use crate::output::print_success;

pub async fn restart_command(client: &mut HarborClient, name: &str) -> Result<()> {
    client
        .restart(name)
        .await
        .with_context(|| format!("Failed to restart '{}'", name))?;
    print_success(&format!("Restarted '{}'", name));
    Ok(())
}
