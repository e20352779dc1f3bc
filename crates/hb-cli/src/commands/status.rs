//! Status command implementation

use anyhow::Result;
use serde_json::json;

use crate::ipc::HarborClient;
use crate::output::{format_status, print_info, print_warning};

/// Print the orchestrator's service snapshot.
///
/// An unreachable orchestrator is reported, not treated as an error.
pub async fn status_command(client: &mut HarborClient, as_json: bool) -> Result<()> {
    let status = match client.status().await {
        Ok(status) => status,
        Err(e) => {
            tracing::debug!("Status request failed: {:#}", e);
            if as_json {
                let report = json!({
                    "running": false,
                    "address": client.address(),
                    "services": {},
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_warning(&format!(
                    "Orchestrator is not running (nothing listening on {})",
                    client.address()
                ));
                print_info("Start it with: harbor start");
            }
            return Ok(());
        }
    };

    if as_json {
        let mut services = serde_json::Map::new();
        for snapshot in &status.services {
            services.insert(snapshot.name.clone(), serde_json::to_value(snapshot)?);
        }
        let report = json!({
            "running": true,
            "pid": status.pid,
            "version": status.version,
            "uptimeSecs": status.uptime_secs,
            "configPath": status.config_path,
            "services": services,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_status(&status));
    }

    Ok(())
}
