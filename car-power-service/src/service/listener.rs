//! Power state listener registries and the completion protocol
use car_power_interface::listener::{ListenerId, PowerStateListener};
use car_power_interface::state::ListenerState;
use log::{error, info, warn};

use super::{Error, MAX_LISTENERS, Service};

type Listeners<'a> = heapless::Vec<(ListenerId, &'a dyn PowerStateListener), MAX_LISTENERS>;

fn find<'a>(listeners: &Listeners<'a>, listener: &'a dyn PowerStateListener) -> Option<ListenerId> {
    listeners
        .iter()
        .find(|(_, registered)| core::ptr::addr_eq(*registered, listener))
        .map(|(id, _)| *id)
}

fn remove(listeners: &mut Listeners<'_>, id: ListenerId) -> bool {
    let before = listeners.len();
    listeners.retain(|(registered, _)| *registered != id);
    listeners.len() != before
}

fn notify(listeners: &Listeners<'_>, state: ListenerState) {
    for (id, listener) in listeners {
        if listener.on_state_changed(state).is_err() {
            // Cleanup happens when the transport reports the listener died
            error!("Listener {}: on_state_changed({state:?}) failed", id.0);
        }
    }
}

impl<'a> Service<'a> {
    /// Register a listener that is notified of every state change
    pub fn register_listener(&self, listener: &'a dyn PowerStateListener) -> Result<ListenerId, Error> {
        self.with_inner(|inner| {
            if let Some(id) = find(&inner.listeners, listener) {
                return Err(Error::AlreadyRegistered(id));
            }
            if inner.listeners.is_full() {
                return Err(Error::ListenerLimit);
            }
            let id = inner.allocate_listener_id();
            inner.listeners.push((id, listener)).map_err(|_| Error::ListenerLimit)?;
            Ok(id)
        })
    }

    /// Register a listener that must call [`Service::finished`] once it is done with shutdown prepare
    pub fn register_listener_with_completion(&self, listener: &'a dyn PowerStateListener) -> Result<ListenerId, Error> {
        self.with_inner(|inner| {
            if let Some(id) = find(&inner.completion_listeners, listener) {
                return Err(Error::AlreadyRegistered(id));
            }
            if inner.completion_listeners.is_full() {
                return Err(Error::ListenerLimit);
            }
            let id = inner.allocate_listener_id();
            inner
                .completion_listeners
                .push((id, listener))
                .map_err(|_| Error::ListenerLimit)?;
            Ok(id)
        })
    }

    /// Remove a listener, a completion listener that has not finished yet is treated as finished
    pub fn unregister_listener(&self, id: ListenerId) {
        let was_completer = self.with_inner(|inner| {
            remove(&mut inner.listeners, id);
            remove(&mut inner.completion_listeners, id)
        });
        if was_completer {
            self.finished(id);
        }
    }

    /// The transport lost the connection to a listener
    pub fn on_listener_died(&self, id: ListenerId) {
        info!("Listener {} died", id.0);
        self.unregister_listener(id);
        self.unregister_power_policy_change_listener(id);
    }

    /// A completion listener is done with shutdown prepare
    pub fn finished(&self, id: ListenerId) {
        let all_complete = self.with_inner(|inner| {
            inner.waiting_for.remove(&id);
            inner.waiting_for.is_empty()
        });
        if all_complete {
            self.signal_complete();
        }
    }

    /// Completion listeners that have not finished the current shutdown prepare
    pub fn waiting_for_count(&self) -> usize {
        self.with_inner(|inner| inner.waiting_for.len())
    }

    /// Notify both listener kinds, starting the completion protocol for shutdown prepare
    pub(super) fn notify_listeners(&self, state: ListenerState) {
        let listeners = self.with_inner(|inner| inner.listeners.clone());
        notify(&listeners, state);

        let allow_completion = state == ListenerState::ShutdownPrepare;
        // Every completer is waited for before any of them is notified, one finishing
        // synchronously must not empty the set early
        let completers = self.with_inner(|inner| {
            inner.waiting_for.clear();
            let completers = inner.completion_listeners.clone();
            if allow_completion {
                for (id, _) in &completers {
                    if inner.waiting_for.insert(*id).is_err() {
                        warn!("Listener {}: cannot wait for completion", id.0);
                    }
                }
            }
            completers
        });
        notify(&completers, state);

        if allow_completion && completers.is_empty() {
            self.signal_complete();
        }
    }
}
