//! Operating system collaborators
use std::path::PathBuf;

use crate::component::PowerComponent;

/// Platform power primitives
pub trait SystemInterface: Sync {
    /// Suspend to RAM, returns false if the system failed to suspend
    ///
    /// Returns after the system has resumed.
    fn enter_deep_sleep(&self) -> bool;
    /// Power off the system
    fn shutdown(&self);
    /// Reboot the system, never expected to return
    fn reboot(&self);
    /// Hold only a CPU wake lock
    fn switch_to_partial_wake_lock(&self);
    /// Hold a full wake lock, keeping the display on
    fn switch_to_full_wake_lock(&self);
    fn release_all_wake_locks(&self);
    /// Reapply the display brightness after a resume
    fn refresh_display_brightness(&self);
    fn set_display_brightness(&self, brightness: u8);
    /// The kernel supports suspend to RAM
    fn is_system_supporting_deep_sleep(&self) -> bool;
    /// Directory persistent power management state is kept in
    fn system_car_dir(&self) -> PathBuf;
}

/// User management hooks
pub trait UserService: Sync {
    /// The system is preparing to suspend
    fn on_suspend(&self);
    /// The system has resumed
    fn on_resume(&self);
}

/// Wi-Fi control
pub trait WifiManager: Sync {
    fn is_wifi_enabled(&self) -> bool;
    fn set_wifi_enabled(&self, enabled: bool);
}

/// Effector for a single power component
pub trait ComponentMediator: Sync {
    /// Component this mediator controls
    fn component(&self) -> PowerComponent;
    /// The component can be controlled on this device
    fn is_supported(&self) -> bool {
        true
    }
    /// Turn the component on or off
    fn set_enabled(&self, enabled: bool);
}
