//! Car power management service
//!
//! Power state requests from the vehicle and from the service itself are queued and
//! dispatched one at a time by [`crate::task::task`]. Public entry points never mutate the
//! state machine directly, they push a request and post a [`Task`].
use core::cell::RefCell;

use car_power_interface::component::ComponentSet;
use car_power_interface::daemon::{DaemonConnector, PolicyDaemon};
use car_power_interface::hal::PowerHal;
use car_power_interface::listener::{ListenerId, PolicyChangeListener, PowerStateListener};
use car_power_interface::policy::{self, CarPowerPolicyFilter};
use car_power_interface::state::{ListenerState, PowerStateReport, PowerStateRequest};
use car_power_interface::system::{ComponentMediator, SystemInterface, UserService, WifiManager};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use log::{debug, error, info, trace, warn};

use crate::component;
use crate::config::Config;
use crate::policy::PolicyRegistry;
use crate::state::{CpmsState, StateKind};
use crate::task_queue::{Task, TaskKind, TaskQueue};
use crate::wifi::WifiState;
use crate::GlobalRawMutex;

mod daemon;
mod dump;
mod listener;
mod power_policy;
mod shutdown;

/// Maximum number of listeners of each kind
pub const MAX_LISTENERS: usize = 16;
/// Maximum number of state requests waiting for dispatch
const MAX_PENDING_STATES: usize = 8;

/// Error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No policy is registered with this ID
    UnknownPolicy(String),
    /// A policy with this ID is already registered
    PolicyAlreadyRegistered(String),
    /// The system policy cannot be redefined
    SystemPolicy,
    /// The policy is not valid
    InvalidPolicy(policy::Error),
    /// No policy group is registered with this ID
    UnknownPolicyGroup(String),
    /// A policy group with this ID is already registered
    PolicyGroupAlreadyRegistered(String),
    /// A power state name is not recognized
    InvalidPowerState(String),
    /// A power state is given more than once in a policy group
    DuplicatePowerState(PowerStateReport),
    /// No room for another listener
    ListenerLimit,
    /// The listener is already registered under this ID
    AlreadyRegistered(ListenerId),
    /// The power policy daemon could not be reached
    Remote,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::UnknownPolicy(id) => write!(f, "{id} is not registered"),
            Error::PolicyAlreadyRegistered(id) => write!(f, "{id} is already registered"),
            Error::SystemPolicy => f.write_str("system power policy cannot be redefined"),
            Error::InvalidPolicy(e) => write!(f, "{e}"),
            Error::UnknownPolicyGroup(id) => write!(f, "policy group {id} is not registered"),
            Error::PolicyGroupAlreadyRegistered(id) => write!(f, "policy group {id} is already registered"),
            Error::InvalidPowerState(state) => write!(f, "invalid power state({state})"),
            Error::DuplicatePowerState(state) => write!(f, "power state({state}) is given more than once"),
            Error::ListenerLimit => f.write_str("too many listeners"),
            Error::AlreadyRegistered(id) => write!(f, "listener is already registered as {}", id.0),
            Error::Remote => f.write_str("power policy daemon is not reachable"),
        }
    }
}

/// External collaborators of the service
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub hal: &'a dyn PowerHal,
    pub system: &'a dyn SystemInterface,
    pub user: &'a dyn UserService,
    pub wifi: &'a dyn WifiManager,
    pub daemon: &'a dyn DaemonConnector,
    /// One effector per controllable power component
    pub mediators: &'a [&'a dyn ComponentMediator],
}

/// Garage mode keep-alive timer
#[derive(Clone, Copy, Default)]
struct PollTimer {
    /// Incremented on every start and release, stale ticks carry an older value
    generation: u32,
    active: bool,
    /// Ticks seen since the timer started
    count: u32,
    /// Tick that forces completion
    expiration: u32,
}

struct Inner<'a> {
    current_state: Option<CpmsState>,
    /// Most recent request first
    pending: heapless::Deque<CpmsState, MAX_PENDING_STATES>,
    /// Cleared by the first ON
    is_booting: bool,
    shutdown_on_next_suspend: bool,
    shutdown_on_finish: bool,
    garage_mode_should_exit_immediately: bool,
    reboot_after_garage_mode: bool,
    in_simulated_deep_sleep: bool,
    /// Smallest requested wakeup delay, 0 if none
    next_wakeup_sec: u32,
    processing_start: Option<Instant>,
    last_sleep_entry: Option<Instant>,
    timer: PollTimer,

    next_listener_id: u32,
    listeners: heapless::Vec<(ListenerId, &'a dyn PowerStateListener), MAX_LISTENERS>,
    completion_listeners: heapless::Vec<(ListenerId, &'a dyn PowerStateListener), MAX_LISTENERS>,
    /// Completion listeners that have not finished the current shutdown prepare
    waiting_for: heapless::FnvIndexSet<ListenerId, MAX_LISTENERS>,
    policy_listeners: heapless::Vec<(ListenerId, &'a dyn PolicyChangeListener, CarPowerPolicyFilter), MAX_LISTENERS>,

    daemon: Option<&'a dyn PolicyDaemon>,
    connection_in_progress: bool,
    current_policy_id: Option<String>,
    current_policy_group: Option<String>,
    policies: PolicyRegistry,
}

impl Inner<'_> {
    fn new() -> Self {
        Self {
            current_state: None,
            pending: heapless::Deque::new(),
            is_booting: true,
            shutdown_on_next_suspend: false,
            shutdown_on_finish: false,
            garage_mode_should_exit_immediately: false,
            reboot_after_garage_mode: false,
            in_simulated_deep_sleep: false,
            next_wakeup_sec: 0,
            processing_start: None,
            last_sleep_entry: None,
            timer: PollTimer::default(),
            next_listener_id: 0,
            listeners: heapless::Vec::new(),
            completion_listeners: heapless::Vec::new(),
            waiting_for: heapless::FnvIndexSet::new(),
            policy_listeners: heapless::Vec::new(),
            daemon: None,
            connection_in_progress: false,
            current_policy_id: None,
            current_policy_group: None,
            policies: PolicyRegistry::new(),
        }
    }

    fn allocate_listener_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id = self.next_listener_id.wrapping_add(1);
        id
    }

    fn release_timer(&mut self) {
        self.timer.generation = self.timer.generation.wrapping_add(1);
        self.timer.active = false;
    }

    /// Returns true if deep sleep was entered after the current shutdown processing started
    fn slept_since_processing_start(&self) -> bool {
        match (self.last_sleep_entry, self.processing_start) {
            (Some(sleep), Some(start)) => sleep > start,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Car power management service
pub struct Service<'a> {
    hal: &'a dyn PowerHal,
    system: &'a dyn SystemInterface,
    user: &'a dyn UserService,
    connector: &'a dyn DaemonConnector,
    wifi: WifiState<'a>,
    config: Config,
    inner: Mutex<GlobalRawMutex, RefCell<Inner<'a>>>,
    components: Mutex<GlobalRawMutex, RefCell<component::Handler<'a>>>,
    tasks: TaskQueue,
    /// Raised whenever a state request is queued
    state_request: Signal<GlobalRawMutex, ()>,
    /// Raised to end a simulated deep sleep
    simulated_resume: Signal<GlobalRawMutex, ()>,
}

impl<'a> Service<'a> {
    pub fn new(collaborators: Collaborators<'a>, config: Config) -> Self {
        Self {
            hal: collaborators.hal,
            system: collaborators.system,
            user: collaborators.user,
            connector: collaborators.daemon,
            wifi: WifiState::new(collaborators.wifi, &collaborators.system.system_car_dir()),
            config,
            inner: Mutex::new(RefCell::new(Inner::new())),
            components: Mutex::new(RefCell::new(component::Handler::new(collaborators.mediators))),
            tasks: TaskQueue::new(),
            state_request: Signal::new(),
            simulated_resume: Signal::new(),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<'a>) -> R) -> R {
        self.inner.lock(|inner| f(&mut inner.borrow_mut()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the vendor policies, enter the initial state and connect to the policy daemon
    pub fn init(&self) {
        let policies = PolicyRegistry::load(&self.config.vendor_policy_path);
        self.with_inner(|inner| inner.policies = policies);

        if self.hal.is_power_state_supported() {
            self.request_state(CpmsState::new(StateKind::WaitForVhal, ListenerState::WaitForVhal));
        } else {
            warn!("Vehicle does not support power state reporting");
            self.request_state(CpmsState::new(StateKind::On, ListenerState::On));
        }

        let mediators = self.components.lock(|components| {
            let mut components = components.borrow_mut();
            components.reset();
            components.mediators()
        });
        mediators.report_support();
        self.connect_to_daemon();
    }

    /// Drop all state, listeners and pending work
    pub fn release(&self) {
        self.with_inner(|inner| {
            inner.release_timer();
            inner.current_state = None;
            inner.pending.clear();
            inner.daemon = None;
            inner.connection_in_progress = false;
            inner.waiting_for.clear();
            inner.listeners.clear();
            inner.completion_listeners.clear();
            inner.policy_listeners.clear();
        });
        self.tasks.clear();
        self.system.release_all_wake_locks();
    }

    /// Power state request from the vehicle
    pub fn on_power_state_request(&self, request: PowerStateRequest) {
        info!("Received power state request {request:?}");
        self.request_state(request.into());
    }

    /// Queue a state for dispatch
    ///
    /// WAIT_FOR_FINISH is dropped if a WAIT_FOR_VHAL request is already queued.
    fn request_state(&self, state: CpmsState) {
        let queued = self.with_inner(|inner| {
            if state.kind == StateKind::WaitForFinish
                && inner.pending.iter().any(|pending| pending.kind == StateKind::WaitForVhal)
            {
                info!("Ignoring {state}, shutdown was cancelled");
                return false;
            }
            if inner.pending.is_full()
                && let Some(dropped) = inner.pending.pop_back()
            {
                warn!("Too many pending power states, dropping {dropped}");
            }
            if inner.pending.push_front(state).is_err() {
                error!("Failed to queue {state}");
                return false;
            }
            true
        });

        if queued {
            self.state_request.signal(());
            self.tasks.post(Task::PowerStateChange);
        }
    }

    fn has_pending_state(&self) -> bool {
        self.with_inner(|inner| !inner.pending.is_empty())
    }

    /// Dispatch the most recent pending request
    async fn handle_power_state_change(&self) {
        let state = self.with_inner(|inner| {
            let state = inner.pending.pop_front();
            inner.pending.clear();
            let Some(state) = state else {
                error!("Null power state was requested");
                return None;
            };

            info!("Handling power state change to {state}");
            if inner.current_state.as_ref() == Some(&state) {
                debug!("Requested state is already in effect: {}", state.kind.name());
                return None;
            }
            if !state.is_legal_from(inner.current_state.as_ref()) {
                error!(
                    "Requested power transition is not allowed: {} --> {}",
                    inner.current_state.map_or("none", |current| current.kind.name()),
                    state.kind.name()
                );
                return None;
            }

            inner.release_timer();
            inner.current_state = Some(state);
            Some(state)
        });
        let Some(state) = state else {
            return;
        };

        self.tasks.remove(TaskKind::ShutdownPoll);
        self.tasks.remove(TaskKind::ProcessingComplete);
        info!("Current state is {state}");

        match state.kind {
            StateKind::WaitForVhal => self.handle_wait_for_vhal(&state),
            StateKind::On => self.handle_on(),
            StateKind::ShutdownPrepare => self.handle_shutdown_prepare(&state),
            StateKind::SimulateSleep => self.simulate_shutdown_prepare(),
            StateKind::WaitForFinish => self.handle_wait_for_finish(&state),
            StateKind::Suspend => self.handle_finish().await,
        }
    }

    fn handle_wait_for_vhal(&self, state: &CpmsState) {
        self.notify_listeners(state.listener_state);
        match state.listener_state {
            ListenerState::WaitForVhal => self.hal.send_wait_for_vhal(),
            ListenerState::ShutdownCancelled => {
                self.with_inner(|inner| inner.shutdown_on_next_suspend = false);
                self.hal.send_shutdown_cancel();
            }
            ListenerState::SuspendExit => self.hal.send_sleep_exit(),
            other => warn!("Unexpected listener state {other:?} for WAIT_FOR_VHAL"),
        }
        self.wifi.restore();
    }

    fn handle_on(&self) {
        self.notify_listeners(ListenerState::On);
        self.hal.send_on();

        let booting = self.with_inner(|inner| core::mem::replace(&mut inner.is_booting, false));
        if booting {
            debug!("First ON after boot");
            return;
        }
        self.user.on_resume();
    }

    /// Last committed state
    pub fn current_state(&self) -> Option<CpmsState> {
        self.with_inner(|inner| inner.current_state)
    }

    /// Listener code of the last committed state, [`ListenerState::Invalid`] before the first one
    pub fn get_power_state(&self) -> ListenerState {
        self.with_inner(|inner| {
            inner
                .current_state
                .map_or(ListenerState::Invalid, |state| state.listener_state)
        })
    }

    /// Shut down instead of entering deep sleep at the next suspend
    pub fn request_shutdown_on_next_suspend(&self) {
        self.with_inner(|inner| inner.shutdown_on_next_suspend = true);
    }

    /// Ask the vehicle to wake the system up `seconds` after the next suspend or shutdown
    ///
    /// The smallest value requested wins.
    pub fn schedule_next_wakeup_time(&self, seconds: i32) {
        let Ok(seconds) = u32::try_from(seconds) else {
            warn!("Next wake up time is negative, ignoring");
            return;
        };
        let timed_wakeup_allowed = self.hal.is_timed_wakeup_allowed();

        self.with_inner(|inner| {
            if !timed_wakeup_allowed {
                warn!("Timed wakeup is not allowed by the vehicle, skipping");
                inner.next_wakeup_sec = 0;
                return;
            }
            if inner.next_wakeup_sec == 0 || inner.next_wakeup_sec > seconds {
                inner.next_wakeup_sec = seconds;
            } else {
                debug!("A shorter wakeup time is already scheduled");
            }
        });
    }

    /// Currently scheduled wakeup delay in seconds, 0 if none
    pub fn next_wakeup_time(&self) -> u32 {
        self.with_inner(|inner| inner.next_wakeup_sec)
    }

    /// Garage mode should not run idle jobs
    pub fn garage_mode_should_exit_immediately(&self) -> bool {
        self.with_inner(|inner| inner.garage_mode_should_exit_immediately)
    }

    /// Display brightness changed on the system side, forwarded to the system interface
    pub fn on_display_brightness_change(&self, brightness: u8) {
        self.tasks.post(Task::DisplayBrightnessChange(brightness));
    }

    /// Report the display brightness to the vehicle
    pub fn send_display_brightness(&self, brightness: u8) {
        self.hal.send_display_brightness(brightness);
    }

    /// Main display turned on or off
    ///
    /// Handled after a delay, a newer change replaces one that is still pending.
    pub fn handle_main_display_changed(&self, on: bool) {
        self.tasks
            .post_delayed(self.config.main_display_event_delay(), Task::MainDisplayStateChange(on));
    }

    fn handle_main_display_state_change(&self, on: bool) {
        info!("Main display turned {}", if on { "on" } else { "off" });
        if on {
            self.system.switch_to_full_wake_lock();
        } else {
            self.system.switch_to_partial_wake_lock();
        }
    }

    /// Wait for the next task
    pub async fn wait_task(&self) -> Task {
        self.tasks.next().await
    }

    /// Process a single task
    pub async fn process_task(&self, task: Task) {
        trace!("Processing task {task:?}");
        match task {
            Task::PowerStateChange => self.handle_power_state_change().await,
            Task::DisplayBrightnessChange(brightness) => self.system.set_display_brightness(brightness),
            Task::MainDisplayStateChange(on) => self.handle_main_display_state_change(on),
            Task::ProcessingComplete => self.handle_processing_complete(),
            Task::ShutdownPoll { generation } => self.handle_shutdown_poll(generation),
            Task::ConnectToDaemon { retries_left } => self.handle_connect_to_daemon(retries_left),
        }
    }

    /// Components currently turned on
    pub fn enabled_components(&self) -> ComponentSet {
        self.components.lock(|components| {
            components
                .borrow()
                .accumulated_policy()
                .map_or(ComponentSet::empty(), |policy| policy.enabled_components())
        })
    }
}
