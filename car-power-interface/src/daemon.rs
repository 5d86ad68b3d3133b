//! Out-of-process power policy daemon
use crate::listener::RemoteError;
use crate::policy::{CarPowerPolicy, PolicyState};

/// Connection to the power policy daemon
pub trait PolicyDaemon: Sync {
    /// Tell the daemon the service is ready, returns the policy state the daemon wants applied
    fn notify_car_service_ready(&self) -> Result<PolicyState, RemoteError>;
    /// A policy was applied by the service
    fn notify_power_policy_change(&self, policy_id: &str) -> Result<(), RemoteError>;
    /// A policy was defined at runtime
    fn notify_power_policy_definition(&self, policy: &CarPowerPolicy) -> Result<(), RemoteError>;
}

/// Service lookup for the policy daemon
pub trait DaemonConnector: Sync {
    /// Returns the daemon if it is running
    ///
    /// The service calls `on_daemon_died` when the returned connection goes away.
    fn find_daemon(&self) -> Option<&dyn PolicyDaemon>;
}
