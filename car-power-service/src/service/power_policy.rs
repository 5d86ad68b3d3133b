//! Power policy application and change notification
use car_power_interface::listener::{ListenerId, PolicyChangeListener};
use car_power_interface::policy::{CarPowerPolicy, CarPowerPolicyFilter, SYSTEM_POWER_POLICY_NO_USER_INTERACTION};
use log::{error, info, warn};

use super::{Error, Service};

impl<'a> Service<'a> {
    /// Current power policy, `None` until a policy has been applied
    pub fn current_power_policy(&self) -> Option<CarPowerPolicy> {
        self.with_inner(|inner| {
            let policy_id = inner.current_policy_id.as_deref()?;
            if policy_id == SYSTEM_POWER_POLICY_NO_USER_INTERACTION {
                Some(inner.policies.system_power_policy().clone())
            } else {
                inner.policies.power_policy(policy_id).cloned()
            }
        })
    }

    /// Apply a registered policy and tell the daemon about it
    pub fn apply_power_policy(&self, policy_id: &str) -> Result<(), Error> {
        self.apply_policy(policy_id, true)
    }

    /// Apply the built-in system policy
    pub fn apply_system_power_policy(&self) -> Result<(), Error> {
        let policy = self.with_inner(|inner| inner.policies.system_power_policy().clone());
        self.apply_resolved_policy(&policy, true)
    }

    pub(super) fn apply_policy(&self, policy_id: &str, up_to_daemon: bool) -> Result<(), Error> {
        let policy = self
            .with_inner(|inner| inner.policies.power_policy(policy_id).cloned())
            .ok_or_else(|| Error::UnknownPolicy(policy_id.to_string()))?;
        self.apply_resolved_policy(&policy, up_to_daemon)
    }

    fn apply_resolved_policy(&self, policy: &CarPowerPolicy, up_to_daemon: bool) -> Result<(), Error> {
        let (accumulated, changes) = self
            .components
            .lock(|components| components.borrow_mut().update(policy))
            .map_err(Error::InvalidPolicy)?;
        changes.apply();

        let (daemon, listeners) = self.with_inner(|inner| {
            inner.current_policy_id = Some(policy.policy_id().to_string());
            (inner.daemon, inner.policy_listeners.clone())
        });
        info!("The current power policy is {}", policy.policy_id());

        if up_to_daemon
            && let Some(daemon) = daemon
            && daemon.notify_power_policy_change(policy.policy_id()).is_err()
        {
            error!(
                "Failed to notify the power policy daemon of a new power policy({})",
                policy.policy_id()
            );
            return Ok(());
        }

        for (id, listener, filter) in &listeners {
            if !filter.matches(policy) {
                continue;
            }
            if listener.on_policy_changed(policy, &accumulated).is_err() {
                error!("Listener {}: on_policy_changed({}) failed", id.0, policy.policy_id());
            }
        }
        Ok(())
    }

    /// Register a listener notified of policies that touch any component in `filter`
    pub fn register_power_policy_change_listener(
        &self,
        listener: &'a dyn PolicyChangeListener,
        filter: CarPowerPolicyFilter,
    ) -> Result<ListenerId, Error> {
        self.with_inner(|inner| {
            if let Some((id, _, _)) = inner
                .policy_listeners
                .iter()
                .find(|(_, registered, _)| core::ptr::addr_eq(*registered, listener))
            {
                return Err(Error::AlreadyRegistered(*id));
            }
            if inner.policy_listeners.is_full() {
                return Err(Error::ListenerLimit);
            }
            let id = inner.allocate_listener_id();
            inner
                .policy_listeners
                .push((id, listener, filter))
                .map_err(|_| Error::ListenerLimit)?;
            Ok(id)
        })
    }

    pub fn unregister_power_policy_change_listener(&self, id: ListenerId) {
        self.with_inner(|inner| inner.policy_listeners.retain(|(registered, _, _)| *registered != id));
    }

    /// Define a policy from unprefixed component names and tell the daemon about it
    pub fn define_power_policy<E: AsRef<str>, D: AsRef<str>>(
        &self,
        policy_id: &str,
        enabled: &[E],
        disabled: &[D],
    ) -> Result<CarPowerPolicy, Error> {
        let (policy, daemon) = self.with_inner(|inner| {
            let policy = inner.policies.define_power_policy(policy_id, enabled, disabled)?.clone();
            Ok::<_, Error>((policy, inner.daemon))
        })?;
        info!("Defined power policy {policy}");

        if let Some(daemon) = daemon
            && daemon.notify_power_policy_definition(&policy).is_err()
        {
            error!("Failed to notify the power policy daemon of power policy({policy_id})");
            return Err(Error::Remote);
        }
        Ok(policy)
    }

    /// Define a policy group from `(state name, policy ID)` pairs
    pub fn define_power_policy_group<S: AsRef<str>, P: AsRef<str>>(
        &self,
        group_id: &str,
        entries: &[(S, P)],
    ) -> Result<(), Error> {
        self.with_inner(|inner| inner.policies.define_power_policy_group(group_id, entries))?;
        info!("Defined power policy group {group_id}");
        Ok(())
    }

    /// Select a registered policy group
    pub fn set_power_policy_group(&self, group_id: &str) -> Result<(), Error> {
        self.with_inner(|inner| {
            if !inner.policies.is_power_policy_group_available(group_id) {
                warn!("Cannot set policy group: {group_id} is not registered");
                return Err(Error::UnknownPolicyGroup(group_id.to_string()));
            }
            inner.current_policy_group = Some(group_id.to_string());
            Ok(())
        })
    }

    pub fn current_power_policy_group(&self) -> Option<String> {
        self.with_inner(|inner| inner.current_policy_group.clone())
    }
}
