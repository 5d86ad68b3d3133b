//! Types and collaborator traits for the vehicle power management service
pub mod component;
pub mod daemon;
pub mod hal;
pub mod listener;
pub mod policy;
pub mod state;
pub mod system;

pub use component::{ComponentSet, PowerComponent};
pub use listener::ListenerId;
pub use policy::{CarPowerPolicy, CarPowerPolicyFilter, PolicyState};
pub use state::{ListenerState, PowerStateRequest};
