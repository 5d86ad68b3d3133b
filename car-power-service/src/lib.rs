//! Vehicle power state orchestration and power policy service
pub mod command;
pub mod component;
pub mod config;
pub mod policy;
pub mod service;
pub mod state;
pub mod task;
pub mod task_queue;
pub mod wifi;

pub use config::Config;
pub use service::{Collaborators, Error, Service};

/// Mutex type shared by all service state
pub type GlobalRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
