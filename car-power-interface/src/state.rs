//! Power state requests from the vehicle and listener-visible states
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Mode requested by the vehicle power controller
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[num_enum(error_type(name = InvalidRequestedMode, constructor = InvalidRequestedMode))]
#[repr(u8)]
pub enum RequestedMode {
    On = 0,
    ShutdownPrepare = 1,
    CancelShutdown = 2,
    Finished = 3,
}

/// Conversion error for [`RequestedMode`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidRequestedMode(pub u8);

/// Parameter that accompanies a shutdown prepare request
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[num_enum(error_type(name = InvalidShutdownParam, constructor = InvalidShutdownParam))]
#[repr(u8)]
pub enum ShutdownParam {
    /// No parameter, shut down after garage mode
    #[default]
    Unspecified = 0,
    /// Shut down without running garage mode
    ShutdownImmediately = 1,
    /// Deep sleep is allowed after garage mode
    CanSleep = 2,
    /// Only shutdown is allowed, after garage mode
    ShutdownOnly = 3,
    /// Enter deep sleep without running garage mode
    SleepImmediately = 4,
}

/// Conversion error for [`ShutdownParam`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidShutdownParam(pub u8);

/// Power state request received from the vehicle power controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PowerStateRequest {
    /// Requested mode
    pub mode: RequestedMode,
    /// Mode specific parameter
    pub param: ShutdownParam,
}

impl PowerStateRequest {
    pub const fn new(mode: RequestedMode, param: ShutdownParam) -> Self {
        Self { mode, param }
    }

    /// Request without a parameter
    pub const fn mode(mode: RequestedMode) -> Self {
        Self::new(mode, ShutdownParam::Unspecified)
    }

    /// Garage mode may run before shutting down
    pub fn can_postpone_shutdown(&self) -> bool {
        !matches!(
            self.param,
            ShutdownParam::ShutdownImmediately | ShutdownParam::SleepImmediately
        )
    }

    /// The vehicle allows deep sleep instead of shutdown
    pub fn can_enter_deep_sleep(&self) -> bool {
        matches!(self.param, ShutdownParam::CanSleep | ShutdownParam::SleepImmediately)
    }
}

/// State reported to power state listeners
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[num_enum(error_type(name = InvalidListenerState, constructor = InvalidListenerState))]
#[repr(u8)]
pub enum ListenerState {
    /// No state has been entered yet
    #[default]
    Invalid = 0,
    WaitForVhal = 1,
    SuspendEnter = 2,
    SuspendExit = 3,
    ShutdownEnter = 5,
    On = 6,
    ShutdownPrepare = 7,
    ShutdownCancelled = 8,
}

/// Conversion error for [`ListenerState`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidListenerState(pub u8);

/// Power states a policy group can assign a default policy to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerStateReport {
    WaitForVhal,
    On,
    DeepSleepEntry,
    ShutdownStart,
}

impl PowerStateReport {
    pub const ALL: [PowerStateReport; 4] = [
        PowerStateReport::WaitForVhal,
        PowerStateReport::On,
        PowerStateReport::DeepSleepEntry,
        PowerStateReport::ShutdownStart,
    ];

    /// Name used by the vendor policy configuration
    pub const fn name(self) -> &'static str {
        match self {
            PowerStateReport::WaitForVhal => "WaitForVHAL",
            PowerStateReport::On => "On",
            PowerStateReport::DeepSleepEntry => "DeepSleepEntry",
            PowerStateReport::ShutdownStart => "ShutdownStart",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.name() == name)
    }
}

impl core::fmt::Display for PowerStateReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
