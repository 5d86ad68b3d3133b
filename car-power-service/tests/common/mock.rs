#![allow(clippy::unwrap_used, dead_code)]
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use car_power_interface::component::{ComponentSet, PowerComponent};
use car_power_interface::daemon::{DaemonConnector, PolicyDaemon};
use car_power_interface::hal::PowerHal;
use car_power_interface::listener::{ListenerId, PolicyChangeListener, PowerStateListener, RemoteError};
use car_power_interface::policy::{CarPowerPolicy, PolicyState};
use car_power_interface::state::ListenerState;
use car_power_interface::system::{ComponentMediator, SystemInterface, UserService, WifiManager};
use car_power_service::{GlobalRawMutex, Service};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FnCall {
    SendWaitForVhal,
    SendShutdownCancel,
    SendSleepExit,
    SendOn,
    SendShutdownPrepare,
    SendSleepEntry(u32),
    SendShutdownStart(u32),
    SendShutdownPostpone(u32),
    SendDisplayBrightness(u8),

    EnterDeepSleep,
    Shutdown,
    Reboot,
    PartialWakeLock,
    FullWakeLock,
    ReleaseWakeLocks,
    RefreshDisplayBrightness,
    SetDisplayBrightness(u8),

    OnSuspend,
    OnResume,

    SetWifiEnabled(bool),
    SetComponentEnabled(PowerComponent, bool),
    /// Components the service reported as enabled from inside a mediator
    ObservedEnabled(ComponentSet),

    StateChanged(&'static str, ListenerState),
    PolicyChanged(&'static str, String),

    FindDaemon,
    CarServiceReady,
    NotifyPolicyChange(String),
    NotifyPolicyDefinition(String),
}

/// Ordered log of every call made into the mocks
pub struct Recorder {
    calls: Mutex<GlobalRawMutex, RefCell<Vec<FnCall>>>,
    doorbell: Signal<GlobalRawMutex, ()>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(RefCell::new(Vec::new())),
            doorbell: Signal::new(),
        }
    }

    pub fn record(&self, fn_call: FnCall) {
        info!("Mock call {fn_call:?}");
        self.calls.lock(|calls| calls.borrow_mut().push(fn_call));
        self.doorbell.signal(());
    }

    pub fn calls(&self) -> Vec<FnCall> {
        self.calls.lock(|calls| calls.borrow().clone())
    }

    pub fn count(&self, fn_call: &FnCall) -> usize {
        self.calls
            .lock(|calls| calls.borrow().iter().filter(|call| *call == fn_call).count())
    }

    pub fn count_matching(&self, predicate: impl Fn(&FnCall) -> bool) -> usize {
        self.calls
            .lock(|calls| calls.borrow().iter().filter(|&call| predicate(call)).count())
    }

    pub fn contains(&self, fn_call: &FnCall) -> bool {
        self.count(fn_call) > 0
    }

    /// States delivered to the listener `name`, in order
    pub fn states_of(&self, name: &str) -> Vec<ListenerState> {
        self.calls.lock(|calls| {
            calls
                .borrow()
                .iter()
                .filter_map(|call| match call {
                    FnCall::StateChanged(listener, state) if *listener == name => Some(*state),
                    _ => None,
                })
                .collect()
        })
    }

    /// Wait until `fn_call` has been recorded at least `count` times
    pub async fn wait_for_count(&self, fn_call: FnCall, count: usize) {
        while self.count(&fn_call) < count {
            self.doorbell.wait().await;
        }
    }

    pub async fn wait_for(&self, fn_call: FnCall) {
        self.wait_for_count(fn_call, 1).await;
    }
}

pub struct MockHal {
    recorder: &'static Recorder,
    pub power_state_supported: AtomicBool,
    pub deep_sleep_allowed: AtomicBool,
    pub timed_wakeup_allowed: AtomicBool,
}

impl MockHal {
    pub fn new(recorder: &'static Recorder) -> Self {
        Self {
            recorder,
            power_state_supported: AtomicBool::new(true),
            deep_sleep_allowed: AtomicBool::new(true),
            timed_wakeup_allowed: AtomicBool::new(true),
        }
    }
}

impl PowerHal for MockHal {
    fn send_wait_for_vhal(&self) {
        self.recorder.record(FnCall::SendWaitForVhal);
    }

    fn send_shutdown_cancel(&self) {
        self.recorder.record(FnCall::SendShutdownCancel);
    }

    fn send_sleep_exit(&self) {
        self.recorder.record(FnCall::SendSleepExit);
    }

    fn send_on(&self) {
        self.recorder.record(FnCall::SendOn);
    }

    fn send_shutdown_prepare(&self) {
        self.recorder.record(FnCall::SendShutdownPrepare);
    }

    fn send_sleep_entry(&self, wakeup_sec: u32) {
        self.recorder.record(FnCall::SendSleepEntry(wakeup_sec));
    }

    fn send_shutdown_start(&self, wakeup_sec: u32) {
        self.recorder.record(FnCall::SendShutdownStart(wakeup_sec));
    }

    fn send_shutdown_postpone(&self, postpone_ms: u32) {
        self.recorder.record(FnCall::SendShutdownPostpone(postpone_ms));
    }

    fn send_display_brightness(&self, brightness: u8) {
        self.recorder.record(FnCall::SendDisplayBrightness(brightness));
    }

    fn is_power_state_supported(&self) -> bool {
        self.power_state_supported.load(Ordering::SeqCst)
    }

    fn is_deep_sleep_allowed(&self) -> bool {
        self.deep_sleep_allowed.load(Ordering::SeqCst)
    }

    fn is_timed_wakeup_allowed(&self) -> bool {
        self.timed_wakeup_allowed.load(Ordering::SeqCst)
    }
}

pub struct MockSystem {
    recorder: &'static Recorder,
    car_dir: PathBuf,
    /// Number of suspend attempts that fail before one succeeds
    pub suspend_failures: AtomicUsize,
    pub deep_sleep_supported: AtomicBool,
    /// Time of every suspend attempt
    pub suspend_attempts: std::sync::Mutex<Vec<Instant>>,
}

impl MockSystem {
    pub fn new(recorder: &'static Recorder, car_dir: PathBuf) -> Self {
        Self {
            recorder,
            car_dir,
            suspend_failures: AtomicUsize::new(0),
            deep_sleep_supported: AtomicBool::new(true),
            suspend_attempts: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl SystemInterface for MockSystem {
    fn enter_deep_sleep(&self) -> bool {
        self.recorder.record(FnCall::EnterDeepSleep);
        self.suspend_attempts.lock().unwrap().push(Instant::now());
        self.suspend_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |failures| failures.checked_sub(1))
            .is_err()
    }

    fn shutdown(&self) {
        self.recorder.record(FnCall::Shutdown);
    }

    fn reboot(&self) {
        self.recorder.record(FnCall::Reboot);
    }

    fn switch_to_partial_wake_lock(&self) {
        self.recorder.record(FnCall::PartialWakeLock);
    }

    fn switch_to_full_wake_lock(&self) {
        self.recorder.record(FnCall::FullWakeLock);
    }

    fn release_all_wake_locks(&self) {
        self.recorder.record(FnCall::ReleaseWakeLocks);
    }

    fn refresh_display_brightness(&self) {
        self.recorder.record(FnCall::RefreshDisplayBrightness);
    }

    fn set_display_brightness(&self, brightness: u8) {
        self.recorder.record(FnCall::SetDisplayBrightness(brightness));
    }

    fn is_system_supporting_deep_sleep(&self) -> bool {
        self.deep_sleep_supported.load(Ordering::SeqCst)
    }

    fn system_car_dir(&self) -> PathBuf {
        self.car_dir.clone()
    }
}

pub struct MockUser {
    recorder: &'static Recorder,
}

impl MockUser {
    pub fn new(recorder: &'static Recorder) -> Self {
        Self { recorder }
    }
}

impl UserService for MockUser {
    fn on_suspend(&self) {
        self.recorder.record(FnCall::OnSuspend);
    }

    fn on_resume(&self) {
        self.recorder.record(FnCall::OnResume);
    }
}

pub struct MockWifi {
    recorder: &'static Recorder,
    pub enabled: AtomicBool,
}

impl MockWifi {
    pub fn new(recorder: &'static Recorder) -> Self {
        Self {
            recorder,
            enabled: AtomicBool::new(true),
        }
    }
}

impl WifiManager for MockWifi {
    fn is_wifi_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_wifi_enabled(&self, enabled: bool) {
        self.recorder.record(FnCall::SetWifiEnabled(enabled));
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

pub struct MockMediator {
    recorder: &'static Recorder,
    component: PowerComponent,
    observe: OnceLock<&'static Service<'static>>,
}

impl MockMediator {
    pub fn new(recorder: &'static Recorder, component: PowerComponent) -> Self {
        Self {
            recorder,
            component,
            observe: OnceLock::new(),
        }
    }

    /// Query the service from inside `set_enabled`
    pub fn observe(&self, service: &'static Service<'static>) {
        assert!(self.observe.set(service).is_ok());
    }
}

impl ComponentMediator for MockMediator {
    fn component(&self) -> PowerComponent {
        self.component
    }

    fn set_enabled(&self, enabled: bool) {
        self.recorder
            .record(FnCall::SetComponentEnabled(self.component, enabled));
        if let Some(service) = self.observe.get() {
            self.recorder
                .record(FnCall::ObservedEnabled(service.enabled_components()));
        }
    }
}

pub struct MockDaemon {
    recorder: &'static Recorder,
    /// Policy state returned when the service reports it is ready
    pub policy_state: std::sync::Mutex<PolicyState>,
    pub fail_notifications: AtomicBool,
}

impl MockDaemon {
    pub fn new(recorder: &'static Recorder) -> Self {
        Self {
            recorder,
            policy_state: std::sync::Mutex::new(PolicyState {
                policy_id: String::new(),
                policy_group_id: String::new(),
            }),
            fail_notifications: AtomicBool::new(false),
        }
    }

    fn result(&self) -> Result<(), RemoteError> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            Err(RemoteError)
        } else {
            Ok(())
        }
    }
}

impl PolicyDaemon for MockDaemon {
    fn notify_car_service_ready(&self) -> Result<PolicyState, RemoteError> {
        self.recorder.record(FnCall::CarServiceReady);
        Ok(self.policy_state.lock().unwrap().clone())
    }

    fn notify_power_policy_change(&self, policy_id: &str) -> Result<(), RemoteError> {
        self.recorder.record(FnCall::NotifyPolicyChange(policy_id.to_string()));
        self.result()
    }

    fn notify_power_policy_definition(&self, policy: &CarPowerPolicy) -> Result<(), RemoteError> {
        self.recorder
            .record(FnCall::NotifyPolicyDefinition(policy.policy_id().to_string()));
        self.result()
    }
}

pub struct MockConnector {
    recorder: &'static Recorder,
    daemon: &'static MockDaemon,
    pub available: AtomicBool,
}

impl MockConnector {
    pub fn new(recorder: &'static Recorder, daemon: &'static MockDaemon) -> Self {
        Self {
            recorder,
            daemon,
            available: AtomicBool::new(true),
        }
    }
}

impl DaemonConnector for MockConnector {
    fn find_daemon(&self) -> Option<&dyn PolicyDaemon> {
        self.recorder.record(FnCall::FindDaemon);
        if self.available.load(Ordering::SeqCst) {
            Some(self.daemon as &dyn PolicyDaemon)
        } else {
            None
        }
    }
}

/// Power state listener that records every state it is given
pub struct MockListener {
    name: &'static str,
    recorder: &'static Recorder,
    /// Report the listener as dead
    pub fail: AtomicBool,
    /// Set to make the listener finish shutdown prepare from within the callback
    finish: OnceLock<(&'static Service<'static>, ListenerId)>,
}

impl MockListener {
    pub fn new(name: &'static str, recorder: &'static Recorder) -> Self {
        Self {
            name,
            recorder,
            fail: AtomicBool::new(false),
            finish: OnceLock::new(),
        }
    }

    pub fn finish_immediately(&self, service: &'static Service<'static>, id: ListenerId) {
        assert!(self.finish.set((service, id)).is_ok());
    }
}

impl PowerStateListener for MockListener {
    fn on_state_changed(&self, state: ListenerState) -> Result<(), RemoteError> {
        self.recorder.record(FnCall::StateChanged(self.name, state));
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError);
        }
        if state == ListenerState::ShutdownPrepare
            && let Some((service, id)) = self.finish.get()
        {
            service.finished(*id);
        }
        Ok(())
    }
}

pub struct MockPolicyListener {
    name: &'static str,
    recorder: &'static Recorder,
    /// Component state passed with the last change
    pub accumulated: std::sync::Mutex<Option<CarPowerPolicy>>,
}

impl MockPolicyListener {
    pub fn new(name: &'static str, recorder: &'static Recorder) -> Self {
        Self {
            name,
            recorder,
            accumulated: std::sync::Mutex::new(None),
        }
    }
}

impl PolicyChangeListener for MockPolicyListener {
    fn on_policy_changed(&self, applied: &CarPowerPolicy, accumulated: &CarPowerPolicy) -> Result<(), RemoteError> {
        self.recorder
            .record(FnCall::PolicyChanged(self.name, applied.policy_id().to_string()));
        *self.accumulated.lock().unwrap() = Some(accumulated.clone());
        Ok(())
    }
}
