//! Human readable dump of the service state
use core::fmt::{self, Write};

use embassy_time::Instant;

use super::Service;
use crate::policy::PolicyRegistry;
use crate::state::CpmsState;

/// Copy of the service state taken under the lock
struct Snapshot {
    current_state: Option<CpmsState>,
    processing_start: Option<Instant>,
    last_sleep_entry: Option<Instant>,
    next_wakeup_sec: u32,
    shutdown_on_next_suspend: bool,
    shutdown_on_finish: bool,
    in_simulated_deep_sleep: bool,
    reboot_after_garage_mode: bool,
    current_policy_id: Option<String>,
    current_policy_group: Option<String>,
    daemon_connected: bool,
    listeners: usize,
    completion_listeners: usize,
    waiting_for: usize,
    policy_listeners: usize,
    policies: PolicyRegistry,
}

fn write_instant(f: &mut impl Write, name: &str, instant: Option<Instant>) -> fmt::Result {
    match instant {
        Some(instant) => writeln!(f, "{name}: {} ms", instant.as_millis()),
        None => writeln!(f, "{name}: none"),
    }
}

impl Service<'_> {
    /// Write a human readable summary of the service state
    pub fn dump(&self, f: &mut impl Write) -> fmt::Result {
        let snapshot = self.with_inner(|inner| Snapshot {
            current_state: inner.current_state,
            processing_start: inner.processing_start,
            last_sleep_entry: inner.last_sleep_entry,
            next_wakeup_sec: inner.next_wakeup_sec,
            shutdown_on_next_suspend: inner.shutdown_on_next_suspend,
            shutdown_on_finish: inner.shutdown_on_finish,
            in_simulated_deep_sleep: inner.in_simulated_deep_sleep,
            reboot_after_garage_mode: inner.reboot_after_garage_mode,
            current_policy_id: inner.current_policy_id.clone(),
            current_policy_group: inner.current_policy_group.clone(),
            daemon_connected: inner.daemon.is_some(),
            listeners: inner.listeners.len(),
            completion_listeners: inner.completion_listeners.len(),
            waiting_for: inner.waiting_for.len(),
            policy_listeners: inner.policy_listeners.len(),
            policies: inner.policies.clone(),
        });

        writeln!(f, "Car power management service")?;
        match snapshot.current_state {
            Some(state) => writeln!(f, "Current state: {state}")?,
            None => writeln!(f, "Current state: none")?,
        }
        write_instant(f, "Processing started at", snapshot.processing_start)?;
        write_instant(f, "Last sleep entry at", snapshot.last_sleep_entry)?;
        writeln!(f, "Next wakeup: {} s", snapshot.next_wakeup_sec)?;
        writeln!(f, "Shutdown on next suspend: {}", snapshot.shutdown_on_next_suspend)?;
        writeln!(f, "Shutdown on finish: {}", snapshot.shutdown_on_finish)?;
        writeln!(f, "Shutdown polling interval: {} ms", self.config.shutdown_polling_interval_ms)?;
        writeln!(f, "Shutdown prepare time: {} ms", self.config.shutdown_prepare_time_ms())?;
        writeln!(f, "Max suspend wait: {} ms", self.config.max_suspend_wait_duration_ms())?;
        writeln!(f, "Simulated deep sleep: {}", snapshot.in_simulated_deep_sleep)?;
        writeln!(f, "Reboot after garage mode: {}", snapshot.reboot_after_garage_mode)?;
        writeln!(
            f,
            "Current power policy: {}",
            snapshot.current_policy_id.as_deref().unwrap_or("none")
        )?;
        writeln!(
            f,
            "Current power policy group: {}",
            snapshot.current_policy_group.as_deref().unwrap_or("none")
        )?;
        writeln!(f, "Power policy daemon connected: {}", snapshot.daemon_connected)?;
        writeln!(
            f,
            "Listeners: {}, with completion: {}, waiting for: {}, policy: {}",
            snapshot.listeners, snapshot.completion_listeners, snapshot.waiting_for, snapshot.policy_listeners
        )?;
        writeln!(f, "Enabled components: {}", self.enabled_components())?;
        snapshot.policies.dump(f)
    }
}
