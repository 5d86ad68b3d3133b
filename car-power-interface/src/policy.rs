//! Power policy data model
use crate::component::{ComponentSet, PowerComponent};

/// ID of the built-in system power policy
pub const SYSTEM_POWER_POLICY_NO_USER_INTERACTION: &str = "system_power_policy_no_user_interaction";

/// Error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A component appears in both the enabled and the disabled set
    OverlappingComponents(PowerComponent),
    /// A component name could not be resolved
    InvalidComponent(String),
    /// The policy ID is empty
    EmptyPolicyId,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::OverlappingComponents(component) => {
                write!(f, "{component} is specified in both enabled and disabled components")
            }
            Error::InvalidComponent(name) => write!(f, "invalid power component({name})"),
            Error::EmptyPolicyId => f.write_str("policy ID is empty"),
        }
    }
}

/// A named set of enabled and disabled components
///
/// Components in neither set are left untouched when the policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarPowerPolicy {
    policy_id: String,
    enabled: ComponentSet,
    disabled: ComponentSet,
}

impl CarPowerPolicy {
    /// Create a new policy, the enabled and disabled sets must be disjoint
    pub fn new(policy_id: impl Into<String>, enabled: ComponentSet, disabled: ComponentSet) -> Result<Self, Error> {
        let policy_id = policy_id.into();
        if policy_id.is_empty() {
            return Err(Error::EmptyPolicyId);
        }
        if let Some(component) = (enabled & disabled).components().next() {
            return Err(Error::OverlappingComponents(component));
        }
        Ok(Self {
            policy_id,
            enabled,
            disabled,
        })
    }

    /// Create a policy from unprefixed component names
    pub fn from_names<E: AsRef<str>, D: AsRef<str>>(
        policy_id: impl Into<String>,
        enabled: &[E],
        disabled: &[D],
    ) -> Result<Self, Error> {
        Self::new(policy_id, parse_component_names(enabled)?, parse_component_names(disabled)?)
    }

    /// The built-in system policy, `enabled` wins where the sets overlap
    pub fn system(enabled: ComponentSet, disabled: ComponentSet) -> Self {
        Self {
            policy_id: SYSTEM_POWER_POLICY_NO_USER_INTERACTION.to_string(),
            enabled,
            disabled: disabled.difference(enabled),
        }
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    pub fn enabled_components(&self) -> ComponentSet {
        self.enabled
    }

    pub fn disabled_components(&self) -> ComponentSet {
        self.disabled
    }

    /// Components this policy turns on or off
    pub fn touched_components(&self) -> ComponentSet {
        self.enabled | self.disabled
    }
}

impl core::fmt::Display for CarPowerPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: enabled [{}], disabled [{}]",
            self.policy_id, self.enabled, self.disabled
        )
    }
}

fn parse_component_names<S: AsRef<str>>(names: &[S]) -> Result<ComponentSet, Error> {
    names.iter().try_fold(ComponentSet::empty(), |set, name| {
        let name = name.as_ref().trim();
        PowerComponent::from_name(name, false)
            .map(|component| set | component.into())
            .ok_or_else(|| Error::InvalidComponent(name.to_string()))
    })
}

/// Filter a policy change listener registers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarPowerPolicyFilter {
    components: ComponentSet,
}

impl CarPowerPolicyFilter {
    pub fn new(components: ComponentSet) -> Self {
        Self { components }
    }

    pub fn components(&self) -> ComponentSet {
        self.components
    }

    /// A policy matches if it turns any filtered component on or off
    pub fn matches(&self, policy: &CarPowerPolicy) -> bool {
        self.components.intersects(policy.touched_components())
    }
}

/// Policy state reported by the power policy daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyState {
    /// Policy the daemon wants applied
    pub policy_id: String,
    /// Policy group currently selected by the daemon
    pub policy_group_id: String,
}
