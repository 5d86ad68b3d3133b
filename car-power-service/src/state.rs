//! Internal power states and the transitions allowed between them
use car_power_interface::state::{ListenerState, PowerStateRequest, RequestedMode};

/// Internal power state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateKind {
    WaitForVhal,
    On,
    ShutdownPrepare,
    WaitForFinish,
    Suspend,
    /// Deep sleep triggered by a debug command
    SimulateSleep,
}

impl StateKind {
    pub const fn name(self) -> &'static str {
        match self {
            StateKind::WaitForVhal => "WAIT_FOR_VHAL",
            StateKind::On => "ON",
            StateKind::ShutdownPrepare => "SHUTDOWN_PREPARE",
            StateKind::WaitForFinish => "WAIT_FOR_FINISH",
            StateKind::Suspend => "SUSPEND",
            StateKind::SimulateSleep => "SIMULATE_SLEEP",
        }
    }
}

/// A state the service is asked to enter
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CpmsState {
    pub kind: StateKind,
    /// Garage mode may run before shutting down
    pub can_postpone: bool,
    /// Deep sleep is allowed at the end of shutdown preparation
    pub can_sleep: bool,
    /// State reported to listeners when this state is entered
    pub listener_state: ListenerState,
}

impl CpmsState {
    /// State requested by the service itself
    pub fn new(kind: StateKind, listener_state: ListenerState) -> Self {
        let simulated = kind == StateKind::SimulateSleep;
        Self {
            kind,
            can_postpone: simulated,
            can_sleep: simulated,
            listener_state,
        }
    }

    /// Whether moving from `current` into this state is allowed
    pub fn is_legal_from(&self, current: Option<&CpmsState>) -> bool {
        let Some(current) = current else {
            return true;
        };
        if current == self {
            return false;
        }

        match current.kind {
            StateKind::WaitForVhal => matches!(self.kind, StateKind::On | StateKind::ShutdownPrepare),
            StateKind::On => matches!(self.kind, StateKind::ShutdownPrepare | StateKind::SimulateSleep),
            // An immediate shutdown or sleep request overrides a running garage mode
            StateKind::ShutdownPrepare => match self.kind {
                StateKind::ShutdownPrepare => !self.can_postpone,
                StateKind::WaitForFinish | StateKind::WaitForVhal => true,
                _ => false,
            },
            StateKind::WaitForFinish => matches!(self.kind, StateKind::Suspend | StateKind::WaitForVhal),
            StateKind::Suspend => self.kind == StateKind::WaitForVhal,
            StateKind::SimulateSleep => true,
        }
    }
}

impl From<PowerStateRequest> for CpmsState {
    fn from(request: PowerStateRequest) -> Self {
        let (kind, can_postpone, can_sleep, listener_state) = match request.mode {
            RequestedMode::On => (StateKind::On, false, false, ListenerState::On),
            RequestedMode::ShutdownPrepare => (
                StateKind::ShutdownPrepare,
                request.can_postpone_shutdown(),
                request.can_enter_deep_sleep(),
                ListenerState::ShutdownPrepare,
            ),
            RequestedMode::CancelShutdown => (StateKind::WaitForVhal, false, false, ListenerState::ShutdownCancelled),
            RequestedMode::Finished => (StateKind::Suspend, false, false, ListenerState::SuspendEnter),
        };

        Self {
            kind,
            can_postpone,
            can_sleep,
            listener_state,
        }
    }
}

impl core::fmt::Display for CpmsState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}(can_sleep: {}, can_postpone: {}, listener_state: {:?})",
            self.kind.name(),
            self.can_sleep,
            self.can_postpone,
            self.listener_state
        )
    }
}
