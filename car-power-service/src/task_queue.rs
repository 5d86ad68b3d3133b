//! Serialized work queue for the service task
use core::cell::RefCell;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use log::error;

use crate::GlobalRawMutex;

/// One slot per [`TaskKind`]
const MAX_TASKS: usize = 6;

/// Work item processed by the service task
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Task {
    /// Dispatch the pending power state requests
    PowerStateChange,
    DisplayBrightnessChange(u8),
    MainDisplayStateChange(bool),
    /// Shutdown preparation is done
    ProcessingComplete,
    /// Garage mode keep-alive tick
    ShutdownPoll { generation: u32 },
    ConnectToDaemon { retries_left: u8 },
}

/// Task discriminant used to cancel pending tasks
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskKind {
    PowerStateChange,
    DisplayBrightnessChange,
    MainDisplayStateChange,
    ProcessingComplete,
    ShutdownPoll,
    ConnectToDaemon,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::PowerStateChange => TaskKind::PowerStateChange,
            Task::DisplayBrightnessChange(_) => TaskKind::DisplayBrightnessChange,
            Task::MainDisplayStateChange(_) => TaskKind::MainDisplayStateChange,
            Task::ProcessingComplete => TaskKind::ProcessingComplete,
            Task::ShutdownPoll { .. } => TaskKind::ShutdownPoll,
            Task::ConnectToDaemon { .. } => TaskKind::ConnectToDaemon,
        }
    }
}

/// Tasks ordered by the time they become due
pub struct TaskQueue {
    tasks: Mutex<GlobalRawMutex, RefCell<heapless::Vec<(Instant, Task), MAX_TASKS>>>,
    doorbell: Signal<GlobalRawMutex, ()>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub const fn new() -> Self {
        Self {
            tasks: Mutex::new(RefCell::new(heapless::Vec::new())),
            doorbell: Signal::new(),
        }
    }

    /// Queue a task to run as soon as possible
    pub fn post(&self, task: Task) {
        self.post_at(Instant::now(), task);
    }

    /// Queue a task to run after `delay`
    pub fn post_delayed(&self, delay: Duration, task: Task) {
        self.post_at(Instant::now() + delay, task);
    }

    /// At most one task of each kind is pending, a new one replaces the old one
    fn post_at(&self, deadline: Instant, task: Task) {
        self.tasks.lock(|tasks| {
            let mut tasks = tasks.borrow_mut();
            tasks.retain(|(_, pending)| pending.kind() != task.kind());
            if tasks.push((deadline, task)).is_err() {
                error!("Task queue full, dropping {task:?}");
            }
        });
        self.doorbell.signal(());
    }

    /// Cancel all pending tasks of the given kind
    pub fn remove(&self, kind: TaskKind) {
        self.tasks
            .lock(|tasks| tasks.borrow_mut().retain(|(_, pending)| pending.kind() != kind));
    }

    /// Cancel every pending task
    pub fn clear(&self) {
        self.tasks.lock(|tasks| tasks.borrow_mut().clear());
    }

    /// Returns true if a task of the given kind is pending
    pub fn contains(&self, kind: TaskKind) -> bool {
        self.tasks
            .lock(|tasks| tasks.borrow().iter().any(|(_, pending)| pending.kind() == kind))
    }

    pub fn len(&self) -> usize {
        self.tasks.lock(|tasks| tasks.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the earliest due task, or return the next deadline
    fn pop_due(&self, now: Instant) -> Result<Task, Option<Instant>> {
        self.tasks.lock(|tasks| {
            let mut tasks = tasks.borrow_mut();
            let (index, deadline) = tasks
                .iter()
                .enumerate()
                .min_by_key(|(_, (deadline, _))| *deadline)
                .map(|(index, (deadline, _))| (index, *deadline))
                .ok_or(None)?;

            if deadline > now {
                return Err(Some(deadline));
            }
            Ok(tasks.remove(index).1)
        })
    }

    /// Wait for the next due task
    pub async fn next(&self) -> Task {
        loop {
            self.doorbell.reset();
            match self.pop_due(Instant::now()) {
                Ok(task) => return task,
                Err(Some(deadline)) => {
                    select(Timer::at(deadline), self.doorbell.wait()).await;
                }
                Err(None) => self.doorbell.wait().await,
            }
        }
    }
}
