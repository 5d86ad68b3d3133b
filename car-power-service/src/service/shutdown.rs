//! Shutdown preparation, garage mode and deep sleep
use car_power_interface::state::ListenerState;
use embassy_futures::select::select;
use embassy_time::{Duration, Instant, Timer};
use log::{error, info, trace, warn};

use super::Service;
use crate::state::{CpmsState, StateKind};
use crate::task_queue::{Task, TaskKind};

/// First wait after a failed suspend, doubled after every failure
const INITIAL_SUSPEND_RETRY_INTERVAL_MS: u64 = 10;
const MAX_SUSPEND_RETRY_INTERVAL_MS: u64 = 1000;

enum PollTick {
    Stale,
    Postpone,
    Expired,
}

impl Service<'_> {
    pub(super) fn handle_shutdown_prepare(&self, state: &CpmsState) {
        let deep_sleep_supported = self.hal.is_deep_sleep_allowed() && self.system.is_system_supporting_deep_sleep();
        self.with_inner(|inner| {
            inner.shutdown_on_finish = inner.shutdown_on_next_suspend || !deep_sleep_supported || !state.can_sleep;
            inner.garage_mode_should_exit_immediately = !state.can_postpone;
        });

        if state.can_postpone {
            info!("Starting shutdown prepare with garage mode");
        } else {
            info!("Starting shutdown prepare without garage mode");
        }
        self.handle_preprocessing();
    }

    pub(super) fn simulate_shutdown_prepare(&self) {
        info!("Starting simulated shutdown prepare");
        self.handle_preprocessing();
    }

    /// Start the garage mode timer and tell everyone shutdown preparation started
    fn handle_preprocessing(&self) {
        let expiration = self.config.polling_count();
        info!(
            "Processing before shutdown expected for {} ms, polling {expiration} times",
            self.config.shutdown_prepare_time_ms()
        );

        // Started before notifying so a synchronous completion sees this processing round
        let generation = self.with_inner(|inner| {
            inner.processing_start = Some(Instant::now());
            inner.release_timer();
            inner.timer.active = true;
            inner.timer.count = 0;
            inner.timer.expiration = expiration;
            inner.timer.generation
        });
        self.tasks.remove(TaskKind::ShutdownPoll);
        self.tasks.post(Task::ShutdownPoll { generation });

        self.notify_listeners(ListenerState::ShutdownPrepare);
        self.hal.send_shutdown_prepare();
        self.user.on_suspend();
    }

    /// Garage mode keep-alive
    pub(super) fn handle_shutdown_poll(&self, generation: u32) {
        let tick = self.with_inner(|inner| {
            if !inner.timer.active || inner.timer.generation != generation {
                return PollTick::Stale;
            }
            inner.timer.count += 1;
            if inner.timer.count > inner.timer.expiration {
                inner.release_timer();
                PollTick::Expired
            } else {
                PollTick::Postpone
            }
        });

        match tick {
            PollTick::Stale => trace!("Ignoring stale shutdown poll {generation}"),
            PollTick::Postpone => {
                self.hal.send_shutdown_postpone(self.config.shutdown_extend_max_ms);
                self.tasks
                    .post_delayed(self.config.shutdown_polling_interval(), Task::ShutdownPoll { generation });
            }
            PollTick::Expired => {
                warn!("Shutdown processing timed out");
                self.tasks.post(Task::ProcessingComplete);
            }
        }
    }

    /// Every completion listener is done
    pub(super) fn signal_complete(&self) {
        let complete = self.with_inner(|inner| {
            let Some(state) = inner.current_state else {
                return false;
            };
            if !matches!(state.kind, StateKind::ShutdownPrepare | StateKind::SimulateSleep) {
                return false;
            }
            if !inner.shutdown_on_finish
                && inner.slept_since_processing_start()
                && inner.last_sleep_entry.is_some_and(|sleep| sleep < Instant::now())
            {
                info!("Already slept, ignoring completion");
                return false;
            }
            true
        });

        if complete {
            info!("Listeners are finished, completing shutdown processing");
            self.tasks.post(Task::ProcessingComplete);
        }
    }

    pub(super) fn handle_processing_complete(&self) {
        let listener_state = self.with_inner(|inner| {
            inner.release_timer();
            if !inner.shutdown_on_finish && inner.slept_since_processing_start() {
                warn!("Duplicate sleep entry request, ignoring");
                return None;
            }
            Some(if inner.shutdown_on_finish {
                ListenerState::ShutdownEnter
            } else {
                ListenerState::SuspendEnter
            })
        });
        self.tasks.remove(TaskKind::ShutdownPoll);

        if let Some(listener_state) = listener_state {
            self.request_state(CpmsState::new(StateKind::WaitForFinish, listener_state));
        }
    }

    pub(super) fn handle_wait_for_finish(&self, state: &CpmsState) {
        self.notify_listeners(state.listener_state);
        let wakeup_sec = self.with_inner(|inner| {
            if inner.garage_mode_should_exit_immediately {
                0
            } else {
                inner.next_wakeup_sec
            }
        });

        match state.listener_state {
            ListenerState::SuspendEnter => self.hal.send_sleep_entry(wakeup_sec),
            ListenerState::ShutdownEnter => self.hal.send_shutdown_start(wakeup_sec),
            other => warn!("Unexpected listener state {other:?} for WAIT_FOR_FINISH"),
        }
    }

    /// The vehicle is ready for the system to go down
    pub(super) async fn handle_finish(&self) {
        let (simulated, must_shutdown, reboot) = self.with_inner(|inner| {
            let simulated = inner.in_simulated_deep_sleep;
            (
                simulated,
                inner.shutdown_on_finish && !simulated,
                core::mem::take(&mut inner.reboot_after_garage_mode),
            )
        });

        if reboot {
            self.reboot();
        }

        self.wifi.disable();
        if must_shutdown {
            info!("Shutting down");
            self.system.shutdown();
        } else {
            self.handle_deep_sleep(simulated).await;
        }
        self.with_inner(|inner| inner.shutdown_on_next_suspend = false);
    }

    #[allow(clippy::panic)]
    fn reboot(&self) -> ! {
        info!("Garage mode has completed, forcing reboot");
        self.system.reboot();
        panic!("Reboot returned");
    }

    async fn handle_deep_sleep(&self, simulated: bool) {
        // Deep sleep is entered even with the partial wake lock held
        self.system.switch_to_partial_wake_lock();
        self.tasks.remove(TaskKind::ProcessingComplete);
        self.with_inner(|inner| inner.last_sleep_entry = Some(Instant::now()));

        let next_listener_state = if simulated {
            info!("Starting to simulate deep sleep by waiting");
            self.simulated_resume.wait().await;
            self.with_inner(|inner| inner.in_simulated_deep_sleep = false);
            info!("Exit deep sleep simulation");
            ListenerState::ShutdownCancelled
        } else {
            if !self.suspend_with_retries().await {
                return;
            }
            ListenerState::SuspendExit
        };

        self.with_inner(|inner| inner.next_wakeup_sec = 0);
        info!("Resuming after suspending");
        self.system.refresh_display_brightness();
        self.request_state(CpmsState::new(StateKind::WaitForVhal, next_listener_state));
    }

    /// Enter deep sleep, retrying with an exponential back-off
    ///
    /// Gives up as soon as another state is requested. If the system still fails to suspend
    /// after the maximum wait, it is shut down instead. Returns true if the system suspended
    /// and resumed.
    async fn suspend_with_retries(&self) -> bool {
        let max_wait_ms = u64::from(self.config.max_suspend_wait_duration_ms());
        let mut retry_interval_ms = INITIAL_SUSPEND_RETRY_INTERVAL_MS;
        let mut total_wait_ms = 0;

        loop {
            info!("Entering deep sleep");
            if self.system.enter_deep_sleep() {
                return true;
            }
            if total_wait_ms >= max_wait_ms {
                break;
            }

            // Reset first, a request arriving after the check still ends the wait
            self.state_request.reset();
            if !self.has_pending_state() {
                warn!("Failed to suspend, retrying after {retry_interval_ms} ms");
                select(
                    Timer::after(Duration::from_millis(retry_interval_ms)),
                    self.state_request.wait(),
                )
                .await;
                total_wait_ms += retry_interval_ms;
                retry_interval_ms = (retry_interval_ms * 2).min(MAX_SUSPEND_RETRY_INTERVAL_MS);
            }
            if self.has_pending_state() {
                info!("Terminating the attempt to suspend");
                return false;
            }
        }

        error!("Could not suspend after trying for {total_wait_ms} ms, shutting down");
        self.system.shutdown();
        false
    }

    /// End a simulated deep sleep, also cancels a running garage mode
    pub fn force_simulated_resume(&self) {
        info!("Forcing simulated resume");
        self.request_state(CpmsState::new(StateKind::WaitForVhal, ListenerState::ShutdownCancelled));
        self.simulated_resume.signal(());
    }

    /// Run garage mode and enter a simulated deep sleep, reboot instead if `reboot` is set
    pub fn force_suspend_and_maybe_reboot(&self, reboot: bool) {
        info!("Forcing simulated suspend, reboot: {reboot}");
        self.simulated_resume.reset();
        self.with_inner(|inner| {
            inner.in_simulated_deep_sleep = true;
            inner.garage_mode_should_exit_immediately = false;
            inner.reboot_after_garage_mode = reboot;
        });
        self.request_state(CpmsState::new(StateKind::SimulateSleep, ListenerState::ShutdownPrepare));
    }

    /// Returns true while a simulated deep sleep is requested or in progress
    pub fn is_in_simulated_deep_sleep(&self) -> bool {
        self.with_inner(|inner| inner.in_simulated_deep_sleep)
    }
}
