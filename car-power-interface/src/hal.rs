//! Vehicle power controller bus

/// Connection to the vehicle power controller
///
/// Acknowledgements are fire-and-forget, delivery failures are handled by the implementation.
pub trait PowerHal: Sync {
    /// Waiting for the vehicle to request a power state
    fn send_wait_for_vhal(&self);
    /// A pending shutdown was cancelled
    fn send_shutdown_cancel(&self);
    /// The system resumed from deep sleep
    fn send_sleep_exit(&self);
    /// The system is fully on
    fn send_on(&self);
    /// Shutdown preparation started
    fn send_shutdown_prepare(&self);
    /// About to enter deep sleep, wake up after `wakeup_sec` seconds if non-zero
    fn send_sleep_entry(&self, wakeup_sec: u32);
    /// About to shut down, power back on after `wakeup_sec` seconds if non-zero
    fn send_shutdown_start(&self, wakeup_sec: u32);
    /// Ask the vehicle to wait at least `postpone_ms` before cutting power
    fn send_shutdown_postpone(&self, postpone_ms: u32);
    /// Report the display brightness to the vehicle
    fn send_display_brightness(&self, brightness: u8);

    /// The vehicle reports power states
    fn is_power_state_supported(&self) -> bool;
    /// The vehicle allows deep sleep
    fn is_deep_sleep_allowed(&self) -> bool;
    /// The vehicle can wake the system up at a scheduled time
    fn is_timed_wakeup_allowed(&self) -> bool;
}
