//! Applies power policies to device components
use car_power_interface::component::{ComponentSet, PowerComponent};
use car_power_interface::policy::{self, CarPowerPolicy};
use car_power_interface::system::ComponentMediator;
use log::{debug, info, warn};

/// Per-component effectors
#[derive(Copy, Clone)]
pub struct Mediators<'a>(&'a [&'a dyn ComponentMediator]);

impl<'a> Mediators<'a> {
    fn get(&self, component: PowerComponent) -> Option<&'a dyn ComponentMediator> {
        self.0.iter().copied().find(|mediator| mediator.component() == component)
    }

    /// Log which components can be driven
    pub fn report_support(&self) {
        for mediator in self.0 {
            if mediator.is_supported() {
                debug!("Power component {} has a mediator", mediator.component());
            } else {
                info!("Power component {} is not supported", mediator.component());
            }
        }
    }

    fn set_enabled(&self, component: PowerComponent, enabled: bool) {
        match self.get(component) {
            Some(mediator) if mediator.is_supported() => mediator.set_enabled(enabled),
            Some(_) => debug!("Skipping unsupported power component {component}"),
            None => warn!("No mediator for power component {component}"),
        }
    }
}

/// Components to switch, computed by [`Handler::update`]
///
/// Applied with [`Changes::apply`] once the handler is no longer borrowed, mediators may
/// call back into the service.
#[must_use]
pub struct Changes<'a> {
    mediators: Mediators<'a>,
    turn_on: ComponentSet,
    turn_off: ComponentSet,
}

impl Changes<'_> {
    pub fn apply(&self) {
        for component in self.turn_on.components() {
            self.mediators.set_enabled(component, true);
        }
        for component in self.turn_off.components() {
            self.mediators.set_enabled(component, false);
        }
    }
}

/// Tracks the accumulated component state
pub struct Handler<'a> {
    mediators: Mediators<'a>,
    /// Component state after every policy applied so far
    accumulated: Option<CarPowerPolicy>,
}

impl<'a> Handler<'a> {
    pub fn new(mediators: &'a [&'a dyn ComponentMediator]) -> Self {
        Self {
            mediators: Mediators(mediators),
            accumulated: None,
        }
    }

    /// Forget the accumulated state
    pub fn reset(&mut self) {
        self.accumulated = None;
    }

    pub fn mediators(&self) -> Mediators<'a> {
        self.mediators
    }

    /// Record `policy` as applied, returns the accumulated component state and the
    /// components whose state changes
    pub fn update(&mut self, policy: &CarPowerPolicy) -> Result<(CarPowerPolicy, Changes<'a>), policy::Error> {
        let (on, off) = self
            .accumulated
            .as_ref()
            .map(|accumulated| (accumulated.enabled_components(), accumulated.disabled_components()))
            .unwrap_or((ComponentSet::empty(), ComponentSet::empty()));

        let changes = Changes {
            mediators: self.mediators,
            turn_on: policy.enabled_components().difference(on),
            turn_off: policy.disabled_components().difference(off),
        };
        let accumulated = CarPowerPolicy::new(
            policy.policy_id(),
            on.difference(policy.disabled_components()) | policy.enabled_components(),
            off.difference(policy.enabled_components()) | policy.disabled_components(),
        )?;
        self.accumulated = Some(accumulated.clone());
        Ok((accumulated, changes))
    }

    /// Component state after every policy applied so far, `None` before the first policy
    pub fn accumulated_policy(&self) -> Option<&CarPowerPolicy> {
        self.accumulated.as_ref()
    }
}
