#![allow(clippy::unwrap_used, dead_code)]
use std::path::PathBuf;

use car_power_interface::component::PowerComponent;
use car_power_interface::state::{PowerStateRequest, RequestedMode, ShutdownParam};
use car_power_interface::system::ComponentMediator;
use car_power_service::{Collaborators, Config, Service, task};
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, with_timeout};

pub mod mock;

use mock::{MockConnector, MockDaemon, MockHal, MockMediator, MockSystem, MockUser, MockWifi, Recorder};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ON: PowerStateRequest = PowerStateRequest::mode(RequestedMode::On);
pub const CANCEL_SHUTDOWN: PowerStateRequest = PowerStateRequest::mode(RequestedMode::CancelShutdown);
pub const FINISHED: PowerStateRequest = PowerStateRequest::mode(RequestedMode::Finished);
pub const SHUTDOWN_PREPARE_CAN_SLEEP: PowerStateRequest =
    PowerStateRequest::new(RequestedMode::ShutdownPrepare, ShutdownParam::CanSleep);
pub const SHUTDOWN_PREPARE_SHUTDOWN_ONLY: PowerStateRequest =
    PowerStateRequest::new(RequestedMode::ShutdownPrepare, ShutdownParam::ShutdownOnly);
pub const SHUTDOWN_PREPARE_IMMEDIATELY: PowerStateRequest =
    PowerStateRequest::new(RequestedMode::ShutdownPrepare, ShutdownParam::ShutdownImmediately);

/// Configuration with a garage mode short enough for tests
///
/// Garage mode lasts 200 ms with a keep-alive every 50 ms, so it expires on the sixth tick.
pub fn test_config() -> Config {
    Config {
        shutdown_prepare_time_ms: 200,
        shutdown_polling_interval_ms: 50,
        daemon_bind_retry_interval_ms: 20,
        main_display_event_delay_ms: 20,
        allow_short_garage_mode: true,
        ..Default::default()
    }
}

/// Everything a test interacts with
pub struct Fixture {
    pub recorder: &'static Recorder,
    pub hal: &'static MockHal,
    pub system: &'static MockSystem,
    pub wifi: &'static MockWifi,
    pub daemon: &'static MockDaemon,
    pub connector: &'static MockConnector,
    pub audio: &'static MockMediator,
    pub service: &'static Service<'static>,
    pub car_dir: PathBuf,
}

/// Leaked so the service and its collaborators can be shared with listeners
fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Build a fixture, `customize` runs on the mocks before the service is created
fn fixture(car_dir: PathBuf, config: Config, customize: impl FnOnce(&MockHal, &MockSystem, &MockConnector)) -> Fixture {
    let recorder = leak(Recorder::new());
    let hal = leak(MockHal::new(recorder));
    let system = leak(MockSystem::new(recorder, car_dir.clone()));
    let user = leak(MockUser::new(recorder));
    let wifi = leak(MockWifi::new(recorder));
    let daemon = leak(MockDaemon::new(recorder));
    let connector = leak(MockConnector::new(recorder, daemon));
    customize(hal, system, connector);

    let audio = leak(MockMediator::new(recorder, PowerComponent::Audio));
    let mediators: &'static [&'static dyn ComponentMediator] = Box::leak(Box::new([
        audio as &dyn ComponentMediator,
        leak(MockMediator::new(recorder, PowerComponent::Wifi)),
        leak(MockMediator::new(recorder, PowerComponent::Bluetooth)),
    ]));

    let service = leak(Service::new(
        Collaborators {
            hal,
            system,
            user,
            wifi,
            daemon: connector,
            mediators,
        },
        config,
    ));

    Fixture {
        recorder,
        hal,
        system,
        wifi,
        daemon,
        connector,
        audio,
        service,
        car_dir,
    }
}

/// Run `test` against the service task
///
/// The test body calls [`Service::init`] itself so listeners can be registered first.
pub async fn run_test_with<F: Future<Output = ()>>(
    timeout: Duration,
    config: Config,
    customize: impl FnOnce(&MockHal, &MockSystem, &MockConnector),
    test: impl FnOnce(&'static Fixture) -> F,
) {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .is_test(true)
        .try_init();

    let car_dir = tempfile::tempdir().unwrap();
    let mut config = config;
    if config.vendor_policy_path.is_relative() {
        config.vendor_policy_path = car_dir.path().join(&config.vendor_policy_path);
    }
    let fixture = leak(fixture(car_dir.path().to_path_buf(), config, customize));

    match with_timeout(timeout, select(task::task(fixture.service), test(fixture)))
        .await
        .unwrap()
    {
        Either::First(never) => match never {},
        Either::Second(()) => {}
    }
}

pub async fn run_test<F: Future<Output = ()>>(test: impl FnOnce(&'static Fixture) -> F) {
    run_test_with(DEFAULT_TIMEOUT, test_config(), |_, _, _| {}, test).await;
}

/// Configuration that reads the vendor policy document `file_name` from the car directory
pub fn vendor_policy_config(file_name: &str) -> Config {
    Config {
        vendor_policy_path: PathBuf::from(file_name),
        ..test_config()
    }
}
