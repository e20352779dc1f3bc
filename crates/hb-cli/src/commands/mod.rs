//! CLI command implementations

mod classify;
mod config;
mod restart;
mod start;
mod status;
mod stop;
mod stub;
mod test;

pub use classify::classify_command;
pub use config::{config_check, config_init, config_path, config_show, resolve_config_path};
pub use restart::restart_command;
pub use start::start_command;
pub use status::status_command;
pub use stop::stop_command;
pub use stub::stub_service_command;
pub use test::test_command;

use std::path::Path;

use hb_core::config::{load_config, DEFAULT_IPC_PORT};

/// IPC address of the orchestrator configured at `path`.
///
/// An unreadable config falls back to the default port so `status` and
/// `stop` still work against a daemon started with defaults.
pub fn ipc_address(path: &Path) -> String {
    match load_config(path) {
        Ok(config) => config.ipc_address(),
        Err(e) => {
            tracing::debug!("Using default IPC port ({})", e);
            format!("127.0.0.1:{}", DEFAULT_IPC_PORT)
        }
    }
}
