//! Vendor power policy document reader
//!
//! The document has the following shape:
//!
//! ```xml
//! <powerPolicy version="1.0">
//!   <policyGroups>
//!     <policyGroup id="basic_policy_group">
//!       <defaultPolicy state="WaitForVHAL" id="policy_id_1"/>
//!       <noDefaultPolicy state="DeepSleepEntry"/>
//!     </policyGroup>
//!   </policyGroups>
//!   <policies>
//!     <policy id="policy_id_1">
//!       <otherComponents behavior="untouched"/>
//!       <component id="POWER_COMPONENT_AUDIO">on</component>
//!     </policy>
//!   </policies>
//!   <systemPolicyOverrides>
//!     <policy id="system_power_policy_no_user_interaction">
//!       <component id="POWER_COMPONENT_BLUETOOTH">on</component>
//!     </policy>
//!   </systemPolicyOverrides>
//! </powerPolicy>
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use car_power_interface::component::{ComponentSet, PowerComponent};
use car_power_interface::policy::{self, CarPowerPolicy, SYSTEM_POWER_POLICY_NO_USER_INTERACTION};
use car_power_interface::state::PowerStateReport;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::PolicyGroup;

const VALID_VERSIONS: [&str; 1] = ["1.0"];

const TAG_POWER_POLICY: &str = "powerPolicy";
const TAG_POLICY_GROUPS: &str = "policyGroups";
const TAG_POLICY_GROUP: &str = "policyGroup";
const TAG_DEFAULT_POLICY: &str = "defaultPolicy";
const TAG_NO_DEFAULT_POLICY: &str = "noDefaultPolicy";
const TAG_POLICIES: &str = "policies";
const TAG_POLICY: &str = "policy";
const TAG_OTHER_COMPONENTS: &str = "otherComponents";
const TAG_COMPONENT: &str = "component";
const TAG_SYSTEM_POLICY_OVERRIDES: &str = "systemPolicyOverrides";

const ATTR_VERSION: &str = "version";
const ATTR_ID: &str = "id";
const ATTR_STATE: &str = "state";
const ATTR_BEHAVIOR: &str = "behavior";

const POWER_ONOFF_ON: &str = "on";
const POWER_ONOFF_OFF: &str = "off";
const POWER_ONOFF_UNTOUCHED: &str = "untouched";

/// Components the built-in system policy turns on
pub const SYSTEM_POLICY_ENABLED_COMPONENTS: ComponentSet = ComponentSet::WIFI
    .union(ComponentSet::CELLULAR)
    .union(ComponentSet::ETHERNET)
    .union(ComponentSet::TRUSTED_DEVICE_DETECTION);

/// Components the built-in system policy turns off
pub const SYSTEM_POLICY_DISABLED_COMPONENTS: ComponentSet = ComponentSet::AUDIO
    .union(ComponentSet::MEDIA)
    .union(ComponentSet::DISPLAY_MAIN)
    .union(ComponentSet::DISPLAY_CLUSTER)
    .union(ComponentSet::DISPLAY_FRONT_PASSENGER)
    .union(ComponentSet::DISPLAY_REAR_PASSENGER)
    .union(ComponentSet::BLUETOOTH)
    .union(ComponentSet::PROJECTION)
    .union(ComponentSet::NFC)
    .union(ComponentSet::INPUT)
    .union(ComponentSet::VOICE_INTERACTION)
    .union(ComponentSet::VISUAL_INTERACTION);

/// Components a vendor may move between the enabled and disabled sets of the system policy
pub const SYSTEM_POLICY_CONFIGURABLE_COMPONENTS: ComponentSet = ComponentSet::BLUETOOTH
    .union(ComponentSet::NFC)
    .union(ComponentSet::TRUSTED_DEVICE_DETECTION);

/// Error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The document could not be read
    Io(String),
    /// The document is not well formed
    Xml(String),
    /// The root element is not `powerPolicy`
    UnexpectedRoot(String),
    /// The document version is missing or not supported
    InvalidVersion(String),
    /// An element is not allowed where it appears
    UnknownTag { tag: String, parent: &'static str },
    /// A required attribute is missing or empty
    MissingAttribute { attribute: &'static str, tag: &'static str },
    /// An element that needs a text value has none
    MissingText(&'static str),
    /// A component ID could not be resolved
    InvalidComponent(String),
    /// A component is listed more than once in a policy
    DuplicateComponent(PowerComponent),
    /// A component state is neither `on` nor `off`
    InvalidComponentState { component: PowerComponent, state: String },
    /// The other components behavior is not `on`, `off` or `untouched`
    InvalidBehavior(String),
    /// A policy has more than one other components element
    DuplicateOtherComponents,
    /// Other components are not allowed in system policy overrides
    UnexpectedOtherComponents,
    /// Two policies share an ID
    DuplicatePolicy(String),
    /// Two policy groups share an ID
    DuplicatePolicyGroup(String),
    /// A power state name is not recognized
    InvalidPowerState(String),
    /// A power state is specified more than once in a policy group
    DuplicatePowerState(PowerStateReport),
    /// A policy group refers to a policy that is not defined
    UndefinedPolicy { group: String, policy: String },
    /// More than one system policy override
    TooManySystemPolicies,
    /// A system policy override touches a component that is not configurable
    NonOverridableComponent(PowerComponent),
    /// A parsed policy is invalid
    Policy(policy::Error),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "cannot read document: {e}"),
            Error::Xml(e) => write!(f, "malformed document: {e}"),
            Error::UnexpectedRoot(tag) => write!(f, "root tag must be |{TAG_POWER_POLICY}|, found |{tag}|"),
            Error::InvalidVersion(version) => write!(f, "invalid XML version: {version}"),
            Error::UnknownTag { tag, parent } => write!(f, "unknown tag: {tag} under {parent}"),
            Error::MissingAttribute { attribute, tag } => write!(f, "no |{attribute}| attribute of |{tag}| tag"),
            Error::MissingText(tag) => write!(f, "value of |{tag}| tag is not found"),
            Error::InvalidComponent(id) => write!(f, "invalid value({id}) in |{ATTR_ID}| attribute of |{TAG_COMPONENT}| tag"),
            Error::DuplicateComponent(component) => {
                write!(f, "{component} is specified more than once in |{TAG_COMPONENT}| tag")
            }
            Error::InvalidComponentState { component, state } => {
                write!(f, "target state({state}) for {component} is not valid")
            }
            Error::InvalidBehavior(behavior) => write!(
                f,
                "invalid value({behavior}) in |{ATTR_BEHAVIOR}| attribute of |{TAG_OTHER_COMPONENTS}| tag"
            ),
            Error::DuplicateOtherComponents => write!(f, "more than one |{TAG_OTHER_COMPONENTS}| tag"),
            Error::UnexpectedOtherComponents => write!(f, "|{TAG_OTHER_COMPONENTS}| tag is not expected"),
            Error::DuplicatePolicy(id) => write!(f, "policy({id}) is defined more than once"),
            Error::DuplicatePolicyGroup(id) => write!(f, "policy group({id}) is defined more than once"),
            Error::InvalidPowerState(state) => write!(f, "invalid power state({state})"),
            Error::DuplicatePowerState(state) => write!(f, "power state({state}) is specified more than once"),
            Error::UndefinedPolicy { group, policy } => {
                write!(f, "group(id: {group}) contains invalid policy(id: {policy})")
            }
            Error::TooManySystemPolicies => f.write_str("only one system power policy is supported"),
            Error::NonOverridableComponent(component) => {
                write!(f, "power component({component}) cannot be overridden")
            }
            Error::Policy(e) => write!(f, "{e}"),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

impl From<policy::Error> for Error {
    fn from(e: policy::Error) -> Self {
        Error::Policy(e)
    }
}

/// Contents of a valid vendor document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorConfig {
    pub policies: BTreeMap<String, CarPowerPolicy>,
    pub groups: BTreeMap<String, PolicyGroup>,
    /// Override of the system policy, if the document has one
    pub system_policy_override: Option<CarPowerPolicy>,
}

/// Start tag with its attributes decoded
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    /// Self-closing, has no children and no end tag
    empty: bool,
}

impl Element {
    fn from_start(start: &BytesStart<'_>, empty: bool) -> Result<Self, Error> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .map(|attribute| {
                let attribute = attribute.map_err(|e| Error::Xml(e.to_string()))?;
                let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                let value = attribute.unescape_value()?.into_owned();
                Ok((key, value))
            })
            .collect::<Result<_, Error>>()?;

        Ok(Self { name, attributes, empty })
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute that must be present and non-empty
    fn required(&self, attribute: &'static str, tag: &'static str) -> Result<&str, Error> {
        self.attribute(attribute)
            .filter(|value| !value.is_empty())
            .ok_or(Error::MissingAttribute { attribute, tag })
    }
}

enum Node {
    Start(Element),
    Text(String),
    End,
    Eof,
}

struct Parser<'x> {
    reader: Reader<&'x [u8]>,
}

impl<'x> Parser<'x> {
    fn new(xml: &'x str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        Self { reader }
    }

    fn next(&mut self) -> Result<Node, Error> {
        loop {
            return Ok(match self.reader.read_event()? {
                Event::Start(start) => Node::Start(Element::from_start(&start, false)?),
                Event::Empty(start) => Node::Start(Element::from_start(&start, true)?),
                Event::End(_) => Node::End,
                Event::Text(text) => Node::Text(text.unescape()?.into_owned()),
                Event::CData(data) => Node::Text(String::from_utf8_lossy(&data).into_owned()),
                Event::Eof => Node::Eof,
                // Declarations, comments and processing instructions
                _ => continue,
            });
        }
    }

    /// Next child element of `parent`, or `None` once its end tag is reached
    fn next_child(&mut self, parent: &Element) -> Result<Option<Element>, Error> {
        if parent.empty {
            return Ok(None);
        }
        loop {
            match self.next()? {
                Node::Start(element) => return Ok(Some(element)),
                Node::Text(_) => continue,
                Node::End => return Ok(None),
                Node::Eof => return Err(Error::Xml(format!("unclosed tag |{}|", parent.name))),
            }
        }
    }

    /// Consume everything up to the end tag of `element`
    fn skip(&mut self, element: &Element) -> Result<(), Error> {
        if element.empty {
            return Ok(());
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Node::Start(child) if !child.empty => depth += 1,
                Node::End => depth -= 1,
                Node::Eof => return Err(Error::Xml(format!("unclosed tag |{}|", element.name))),
                _ => {}
            }
        }
        Ok(())
    }

    /// Text value of `element`, consumes the element
    fn text(&mut self, element: &Element, tag: &'static str) -> Result<String, Error> {
        if element.empty {
            return Err(Error::MissingText(tag));
        }
        match self.next()? {
            Node::Text(text) => {
                self.skip(element)?;
                Ok(text)
            }
            _ => Err(Error::MissingText(tag)),
        }
    }
}

/// Read and parse a vendor document from a file
pub fn read_vendor_config(path: &Path) -> Result<VendorConfig, Error> {
    let xml = std::fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;
    parse_vendor_config(&xml)
}

/// Parse a vendor document
///
/// Policy group references are checked once the whole document is read.
pub fn parse_vendor_config(xml: &str) -> Result<VendorConfig, Error> {
    let mut parser = Parser::new(xml);

    let root = loop {
        match parser.next()? {
            Node::Start(element) => break element,
            Node::Text(_) => continue,
            Node::End | Node::Eof => return Err(Error::UnexpectedRoot(String::new())),
        }
    };
    if root.name != TAG_POWER_POLICY {
        return Err(Error::UnexpectedRoot(root.name));
    }
    let version = root.attribute(ATTR_VERSION).unwrap_or_default();
    if !VALID_VERSIONS.contains(&version) {
        return Err(Error::InvalidVersion(version.to_string()));
    }

    let mut config = VendorConfig::default();
    while let Some(element) = parser.next_child(&root)? {
        match element.name.as_str() {
            TAG_POLICIES => config.policies = parse_policies(&mut parser, &element, true)?,
            TAG_POLICY_GROUPS => config.groups = parse_policy_groups(&mut parser, &element)?,
            TAG_SYSTEM_POLICY_OVERRIDES => {
                config.system_policy_override = parse_system_policy_overrides(&mut parser, &element)?
            }
            _ => {
                return Err(Error::UnknownTag {
                    tag: element.name,
                    parent: TAG_POWER_POLICY,
                });
            }
        }
    }

    validate_policy_groups(&config.groups, &config.policies)?;
    Ok(config)
}

fn parse_policies(
    parser: &mut Parser<'_>,
    parent: &Element,
    include_other_components: bool,
) -> Result<BTreeMap<String, CarPowerPolicy>, Error> {
    let mut policies = BTreeMap::new();
    while let Some(element) = parser.next_child(parent)? {
        if element.name != TAG_POLICY {
            return Err(Error::UnknownTag {
                tag: element.name,
                parent: TAG_POLICIES,
            });
        }
        let policy_id = element.required(ATTR_ID, TAG_POLICY)?.to_string();
        if policies.contains_key(&policy_id) {
            return Err(Error::DuplicatePolicy(policy_id));
        }
        let policy = parse_policy(parser, &element, &policy_id, include_other_components)?;
        policies.insert(policy_id, policy);
    }
    Ok(policies)
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum OtherComponents {
    On,
    Off,
    Untouched,
}

fn parse_policy(
    parser: &mut Parser<'_>,
    parent: &Element,
    policy_id: &str,
    include_other_components: bool,
) -> Result<CarPowerPolicy, Error> {
    let mut enabled = ComponentSet::empty();
    let mut disabled = ComponentSet::empty();
    let mut other_components = None;

    while let Some(element) = parser.next_child(parent)? {
        match element.name.as_str() {
            TAG_COMPONENT => {
                let id = element.attribute(ATTR_ID).unwrap_or_default();
                let component =
                    PowerComponent::from_name(id, true).ok_or_else(|| Error::InvalidComponent(id.to_string()))?;
                if (enabled | disabled).has(component) {
                    return Err(Error::DuplicateComponent(component));
                }
                match parser.text(&element, TAG_COMPONENT)?.as_str() {
                    POWER_ONOFF_ON => enabled |= component.into(),
                    POWER_ONOFF_OFF => disabled |= component.into(),
                    state => {
                        return Err(Error::InvalidComponentState {
                            component,
                            state: state.to_string(),
                        });
                    }
                }
            }
            TAG_OTHER_COMPONENTS => {
                if !include_other_components {
                    return Err(Error::UnexpectedOtherComponents);
                }
                if other_components.is_some() {
                    return Err(Error::DuplicateOtherComponents);
                }
                let behavior = element.attribute(ATTR_BEHAVIOR).ok_or(Error::MissingAttribute {
                    attribute: ATTR_BEHAVIOR,
                    tag: TAG_OTHER_COMPONENTS,
                })?;
                other_components = Some(match behavior {
                    POWER_ONOFF_ON => OtherComponents::On,
                    POWER_ONOFF_OFF => OtherComponents::Off,
                    POWER_ONOFF_UNTOUCHED => OtherComponents::Untouched,
                    _ => return Err(Error::InvalidBehavior(behavior.to_string())),
                });
                parser.skip(&element)?;
            }
            _ => {
                return Err(Error::UnknownTag {
                    tag: element.name,
                    parent: TAG_POLICY,
                });
            }
        }
    }

    let others = ComponentSet::all().difference(enabled | disabled);
    match other_components {
        Some(OtherComponents::On) => enabled |= others,
        Some(OtherComponents::Off) => disabled |= others,
        Some(OtherComponents::Untouched) | None => {}
    }

    Ok(CarPowerPolicy::new(policy_id, enabled, disabled)?)
}

fn parse_policy_groups(parser: &mut Parser<'_>, parent: &Element) -> Result<BTreeMap<String, PolicyGroup>, Error> {
    let mut groups = BTreeMap::new();
    while let Some(element) = parser.next_child(parent)? {
        if element.name != TAG_POLICY_GROUP {
            return Err(Error::UnknownTag {
                tag: element.name,
                parent: TAG_POLICY_GROUPS,
            });
        }
        let group_id = element.required(ATTR_ID, TAG_POLICY_GROUP)?.to_string();
        if groups.contains_key(&group_id) {
            return Err(Error::DuplicatePolicyGroup(group_id));
        }
        let group = parse_policy_group(parser, &element)?;
        groups.insert(group_id, group);
    }
    Ok(groups)
}

fn parse_power_state(element: &Element, tag: &'static str) -> Result<PowerStateReport, Error> {
    let state = element.attribute(ATTR_STATE).ok_or(Error::MissingAttribute {
        attribute: ATTR_STATE,
        tag,
    })?;
    PowerStateReport::from_name(state).ok_or_else(|| Error::InvalidPowerState(state.to_string()))
}

fn parse_policy_group(parser: &mut Parser<'_>, parent: &Element) -> Result<PolicyGroup, Error> {
    let mut group = PolicyGroup::new();
    let mut visited = BTreeSet::new();

    while let Some(element) = parser.next_child(parent)? {
        let state = match element.name.as_str() {
            TAG_DEFAULT_POLICY => {
                let policy_id = element.required(ATTR_ID, TAG_DEFAULT_POLICY)?.to_string();
                let state = parse_power_state(&element, TAG_DEFAULT_POLICY)?;
                group.insert(state, policy_id);
                state
            }
            TAG_NO_DEFAULT_POLICY => parse_power_state(&element, TAG_NO_DEFAULT_POLICY)?,
            _ => {
                return Err(Error::UnknownTag {
                    tag: element.name,
                    parent: TAG_POLICY_GROUP,
                });
            }
        };
        if !visited.insert(state) {
            return Err(Error::DuplicatePowerState(state));
        }
        parser.skip(&element)?;
    }
    Ok(group)
}

fn parse_system_policy_overrides(
    parser: &mut Parser<'_>,
    parent: &Element,
) -> Result<Option<CarPowerPolicy>, Error> {
    let mut overrides = parse_policies(parser, parent, false)?;
    if overrides.len() > 1 {
        return Err(Error::TooManySystemPolicies);
    }
    let Some(policy) = overrides.remove(SYSTEM_POWER_POLICY_NO_USER_INTERACTION) else {
        return Ok(None);
    };

    // Components are unique within a policy, so only configurability is left to check
    if let Some(component) = policy
        .touched_components()
        .difference(SYSTEM_POLICY_CONFIGURABLE_COMPONENTS)
        .components()
        .next()
    {
        return Err(Error::NonOverridableComponent(component));
    }
    Ok(Some(policy))
}

fn validate_policy_groups(
    groups: &BTreeMap<String, PolicyGroup>,
    policies: &BTreeMap<String, CarPowerPolicy>,
) -> Result<(), Error> {
    for (group_id, group) in groups {
        if let Some(policy_id) = group.values().find(|policy_id| !policies.contains_key(*policy_id)) {
            return Err(Error::UndefinedPolicy {
                group: group_id.clone(),
                policy: policy_id.clone(),
            });
        }
    }
    Ok(())
}

/// Built-in system policy, with a vendor override applied if there is one
pub fn system_power_policy(policy_override: Option<&CarPowerPolicy>) -> CarPowerPolicy {
    let mut enabled = SYSTEM_POLICY_ENABLED_COMPONENTS;
    let mut disabled = SYSTEM_POLICY_DISABLED_COMPONENTS;
    if let Some(policy_override) = policy_override {
        enabled = enabled.difference(policy_override.disabled_components()) | policy_override.enabled_components();
        disabled = disabled.difference(policy_override.enabled_components()) | policy_override.disabled_components();
    }
    CarPowerPolicy::system(enabled, disabled)
}
