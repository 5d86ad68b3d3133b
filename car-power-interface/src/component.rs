//! Power components and component sets
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Prefix used by the vendor policy configuration for component identifiers
pub const POWER_COMPONENT_PREFIX: &str = "POWER_COMPONENT_";

/// Device component whose power can be controlled by a power policy
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[num_enum(error_type(name = InvalidPowerComponent, constructor = InvalidPowerComponent))]
#[repr(u8)]
pub enum PowerComponent {
    Audio = 1,
    Media = 2,
    DisplayMain = 3,
    DisplayCluster = 4,
    DisplayFrontPassenger = 5,
    DisplayRearPassenger = 6,
    Bluetooth = 7,
    Wifi = 8,
    Cellular = 9,
    Ethernet = 10,
    Projection = 11,
    Nfc = 12,
    Input = 13,
    VoiceInteraction = 14,
    VisualInteraction = 15,
    TrustedDeviceDetection = 16,
    Location = 17,
    Microphone = 18,
}

/// Conversion error for [`PowerComponent`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidPowerComponent(pub u8);

impl PowerComponent {
    /// Every component, in identifier order
    pub const ALL: [PowerComponent; 18] = [
        PowerComponent::Audio,
        PowerComponent::Media,
        PowerComponent::DisplayMain,
        PowerComponent::DisplayCluster,
        PowerComponent::DisplayFrontPassenger,
        PowerComponent::DisplayRearPassenger,
        PowerComponent::Bluetooth,
        PowerComponent::Wifi,
        PowerComponent::Cellular,
        PowerComponent::Ethernet,
        PowerComponent::Projection,
        PowerComponent::Nfc,
        PowerComponent::Input,
        PowerComponent::VoiceInteraction,
        PowerComponent::VisualInteraction,
        PowerComponent::TrustedDeviceDetection,
        PowerComponent::Location,
        PowerComponent::Microphone,
    ];

    /// Unprefixed component name as used by commands and dumps
    pub const fn name(self) -> &'static str {
        match self {
            PowerComponent::Audio => "AUDIO",
            PowerComponent::Media => "MEDIA",
            PowerComponent::DisplayMain => "DISPLAY_MAIN",
            PowerComponent::DisplayCluster => "DISPLAY_CLUSTER",
            PowerComponent::DisplayFrontPassenger => "DISPLAY_FRONT_PASSENGER",
            PowerComponent::DisplayRearPassenger => "DISPLAY_REAR_PASSENGER",
            PowerComponent::Bluetooth => "BLUETOOTH",
            PowerComponent::Wifi => "WIFI",
            PowerComponent::Cellular => "CELLULAR",
            PowerComponent::Ethernet => "ETHERNET",
            PowerComponent::Projection => "PROJECTION",
            PowerComponent::Nfc => "NFC",
            PowerComponent::Input => "INPUT",
            PowerComponent::VoiceInteraction => "VOICE_INTERACTION",
            PowerComponent::VisualInteraction => "VISUAL_INTERACTION",
            PowerComponent::TrustedDeviceDetection => "TRUSTED_DEVICE_DETECTION",
            PowerComponent::Location => "LOCATION",
            PowerComponent::Microphone => "MICROPHONE",
        }
    }

    /// Look up a component by name
    ///
    /// When `prefixed` is set the name must carry [`POWER_COMPONENT_PREFIX`].
    pub fn from_name(name: &str, prefixed: bool) -> Option<Self> {
        let name = if prefixed {
            name.strip_prefix(POWER_COMPONENT_PREFIX)?
        } else {
            name
        };
        Self::ALL.iter().copied().find(|component| component.name() == name)
    }
}

impl core::fmt::Display for PowerComponent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Set of power components, one bit per [`PowerComponent`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ComponentSet: u32 {
        const AUDIO = 1 << 0;
        const MEDIA = 1 << 1;
        const DISPLAY_MAIN = 1 << 2;
        const DISPLAY_CLUSTER = 1 << 3;
        const DISPLAY_FRONT_PASSENGER = 1 << 4;
        const DISPLAY_REAR_PASSENGER = 1 << 5;
        const BLUETOOTH = 1 << 6;
        const WIFI = 1 << 7;
        const CELLULAR = 1 << 8;
        const ETHERNET = 1 << 9;
        const PROJECTION = 1 << 10;
        const NFC = 1 << 11;
        const INPUT = 1 << 12;
        const VOICE_INTERACTION = 1 << 13;
        const VISUAL_INTERACTION = 1 << 14;
        const TRUSTED_DEVICE_DETECTION = 1 << 15;
        const LOCATION = 1 << 16;
        const MICROPHONE = 1 << 17;
    }
}

impl From<PowerComponent> for ComponentSet {
    fn from(component: PowerComponent) -> Self {
        ComponentSet::from_bits_retain(1 << (u8::from(component) - 1))
    }
}

impl FromIterator<PowerComponent> for ComponentSet {
    fn from_iter<T: IntoIterator<Item = PowerComponent>>(iter: T) -> Self {
        iter.into_iter()
            .fold(ComponentSet::empty(), |set, component| set | component.into())
    }
}

impl ComponentSet {
    /// Returns true if the given component is in this set
    pub fn has(&self, component: PowerComponent) -> bool {
        self.contains(component.into())
    }

    /// Iterate over the components in this set in identifier order
    pub fn components(&self) -> impl Iterator<Item = PowerComponent> + '_ {
        PowerComponent::ALL
            .iter()
            .copied()
            .filter(move |component| self.has(*component))
    }
}

impl core::fmt::Display for ComponentSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, component) in self.components().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(component.name())?;
        }
        Ok(())
    }
}
