//! Registry of power policies and policy groups
use std::collections::BTreeMap;
use std::path::Path;

use car_power_interface::policy::{CarPowerPolicy, SYSTEM_POWER_POLICY_NO_USER_INTERACTION};
use car_power_interface::state::PowerStateReport;
use log::{info, warn};

use crate::service::Error;

pub mod reader;

/// Default policy for each power state, states without a default are absent
pub type PolicyGroup = BTreeMap<PowerStateReport, String>;

/// Known policies and groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, CarPowerPolicy>,
    groups: BTreeMap<String, PolicyGroup>,
    system_policy: CarPowerPolicy,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyRegistry {
    /// Empty registry holding only the built-in system policy
    pub fn new() -> Self {
        Self {
            policies: BTreeMap::new(),
            groups: BTreeMap::new(),
            system_policy: reader::system_power_policy(None),
        }
    }

    pub fn from_config(config: reader::VendorConfig) -> Self {
        Self {
            system_policy: reader::system_power_policy(config.system_policy_override.as_ref()),
            policies: config.policies,
            groups: config.groups,
        }
    }

    /// Load the vendor document at `path`
    ///
    /// Any error discards the whole document.
    pub fn load(path: &Path) -> Self {
        match reader::read_vendor_config(path) {
            Ok(config) => {
                info!(
                    "Loaded {} power policies and {} policy groups from {}",
                    config.policies.len(),
                    config.groups.len(),
                    path.display()
                );
                Self::from_config(config)
            }
            Err(e) => {
                warn!("Ignoring vendor power policy {}: {e}", path.display());
                Self::new()
            }
        }
    }

    /// Registered policy, the system policy is not included
    pub fn power_policy(&self, policy_id: &str) -> Option<&CarPowerPolicy> {
        self.policies.get(policy_id)
    }

    pub fn system_power_policy(&self) -> &CarPowerPolicy {
        &self.system_policy
    }

    pub fn policy_group(&self, group_id: &str) -> Option<&PolicyGroup> {
        self.groups.get(group_id)
    }

    pub fn is_power_policy_group_available(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Default policy of `group_id` for `state`
    pub fn default_power_policy_for_state(&self, group_id: &str, state: PowerStateReport) -> Option<&CarPowerPolicy> {
        let policy_id = self.groups.get(group_id)?.get(&state)?;
        self.policies.get(policy_id)
    }

    pub fn policies(&self) -> impl Iterator<Item = &CarPowerPolicy> {
        self.policies.values()
    }

    /// Define a policy from unprefixed component names
    pub fn define_power_policy<E: AsRef<str>, D: AsRef<str>>(
        &mut self,
        policy_id: &str,
        enabled: &[E],
        disabled: &[D],
    ) -> Result<&CarPowerPolicy, Error> {
        if policy_id == SYSTEM_POWER_POLICY_NO_USER_INTERACTION {
            return Err(Error::SystemPolicy);
        }
        if self.policies.contains_key(policy_id) {
            return Err(Error::PolicyAlreadyRegistered(policy_id.to_string()));
        }

        let policy = CarPowerPolicy::from_names(policy_id, enabled, disabled).map_err(Error::InvalidPolicy)?;
        Ok(self.policies.entry(policy_id.to_string()).or_insert(policy))
    }

    /// Define a policy group from `(state name, policy ID)` pairs
    pub fn define_power_policy_group<S: AsRef<str>, P: AsRef<str>>(
        &mut self,
        group_id: &str,
        entries: &[(S, P)],
    ) -> Result<(), Error> {
        if self.groups.contains_key(group_id) {
            return Err(Error::PolicyGroupAlreadyRegistered(group_id.to_string()));
        }

        let mut group = PolicyGroup::new();
        for (state, policy_id) in entries {
            let state = PowerStateReport::from_name(state.as_ref())
                .ok_or_else(|| Error::InvalidPowerState(state.as_ref().to_string()))?;
            let policy_id = policy_id.as_ref();
            if !self.policies.contains_key(policy_id) {
                return Err(Error::UnknownPolicy(policy_id.to_string()));
            }
            if group.insert(state, policy_id.to_string()).is_some() {
                return Err(Error::DuplicatePowerState(state));
            }
        }

        self.groups.insert(group_id.to_string(), group);
        Ok(())
    }

    pub fn dump(&self, f: &mut impl core::fmt::Write) -> core::fmt::Result {
        f.write_str("Registered power policies:")?;
        if self.policies.is_empty() {
            writeln!(f, " none")?;
        } else {
            writeln!(f)?;
            for policy in self.policies.values() {
                writeln!(f, "  {policy}")?;
            }
        }

        f.write_str("Power policy groups:")?;
        if self.groups.is_empty() {
            writeln!(f, " none")?;
        } else {
            writeln!(f)?;
            for (group_id, group) in &self.groups {
                writeln!(f, "  {group_id}")?;
                for (state, policy_id) in group {
                    writeln!(f, "    - {state} --> {policy_id}")?;
                }
            }
        }

        writeln!(f, "System power policy: {}", self.system_policy)
    }
}
