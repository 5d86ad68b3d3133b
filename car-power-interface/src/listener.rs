//! In-process listener callbacks
use crate::policy::CarPowerPolicy;
use crate::state::ListenerState;

/// Handle identifying a registered listener
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

/// The remote end of a listener is gone
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RemoteError;

/// Receives power state changes
pub trait PowerStateListener: Sync {
    /// Called for every state change
    ///
    /// Listeners registered with completion must call `finished` on the service once they are
    /// done with [`ListenerState::ShutdownPrepare`]. The callback may re-enter the service.
    fn on_state_changed(&self, state: ListenerState) -> Result<(), RemoteError>;
}

/// Receives power policy changes
pub trait PolicyChangeListener: Sync {
    /// `accumulated` is the component state after `applied` took effect
    fn on_policy_changed(&self, applied: &CarPowerPolicy, accumulated: &CarPowerPolicy) -> Result<(), RemoteError>;
}
