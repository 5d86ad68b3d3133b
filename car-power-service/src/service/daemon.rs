//! Connection to the power policy daemon
use log::{error, info, warn};

use super::Service;
use crate::task_queue::{Task, TaskKind};

impl Service<'_> {
    /// Start connecting to the daemon unless it is connected or a connection attempt is running
    pub(super) fn connect_to_daemon(&self) {
        let start = self.with_inner(|inner| {
            if inner.daemon.is_some() || inner.connection_in_progress {
                return false;
            }
            inner.connection_in_progress = true;
            true
        });
        if !start {
            info!("Power policy daemon is already connected or connecting");
            return;
        }

        self.tasks.remove(TaskKind::ConnectToDaemon);
        self.tasks.post(Task::ConnectToDaemon {
            retries_left: self.config.daemon_bind_max_retry,
        });
    }

    pub(super) fn handle_connect_to_daemon(&self, retries_left: u8) {
        if retries_left == 0 {
            self.with_inner(|inner| inner.connection_in_progress = false);
            error!("Cannot connect to the power policy daemon, giving up");
            return;
        }

        let Some(daemon) = self.connector.find_daemon() else {
            warn!("Power policy daemon is not found, {} retries left", retries_left - 1);
            self.tasks.post_delayed(
                self.config.daemon_bind_retry_interval(),
                Task::ConnectToDaemon {
                    retries_left: retries_left - 1,
                },
            );
            return;
        };

        self.with_inner(|inner| {
            inner.daemon = Some(daemon);
            inner.connection_in_progress = false;
        });
        info!("Connected to the power policy daemon");
        self.initialize_power_policy();
    }

    /// Apply the policy state the daemon holds
    fn initialize_power_policy(&self) {
        let Some(daemon) = self.with_inner(|inner| inner.daemon) else {
            return;
        };
        let state = match daemon.notify_car_service_ready() {
            Ok(state) => state,
            Err(_) => {
                error!("Failed to tell the power policy daemon that the car service is ready");
                return;
            }
        };
        info!(
            "Power policy daemon reports policy {} in group {}",
            state.policy_id, state.policy_group_id
        );

        if !state.policy_group_id.is_empty() && self.set_power_policy_group(&state.policy_group_id).is_err() {
            warn!("Cannot set policy group {} reported by the daemon", state.policy_group_id);
        }
        if let Err(e) = self.apply_policy(&state.policy_id, false) {
            warn!("Cannot apply power policy {} reported by the daemon: {e}", state.policy_id);
        }
    }

    /// The daemon connection went away, reconnect
    pub fn on_daemon_died(&self) {
        warn!("Power policy daemon died, reconnecting");
        self.with_inner(|inner| {
            inner.daemon = None;
            inner.connection_in_progress = true;
        });
        self.tasks.remove(TaskKind::ConnectToDaemon);
        self.tasks.post_delayed(
            self.config.daemon_bind_retry_interval(),
            Task::ConnectToDaemon {
                retries_left: self.config.daemon_bind_max_retry,
            },
        );
    }

    /// Returns true while the service holds a daemon connection
    pub fn is_daemon_connected(&self) -> bool {
        self.with_inner(|inner| inner.daemon.is_some())
    }
}
