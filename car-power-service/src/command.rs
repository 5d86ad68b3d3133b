//! Debug commands
//!
//! Commands take argv-style arguments, the first one being the command name:
//! ```text
//! define-power-policy <id> [--enable a,b] [--disable c,d]
//! apply-power-policy <id>
//! define-power-policy-group <id> [State:policy ...]
//! set-power-policy-group <id>
//! suspend [reboot]
//! resume
//! ```
use log::info;

use crate::service::{self, Service};

/// Debug command error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No command name was given
    MissingCommand,
    /// The command name is not recognized
    UnknownCommand(String),
    /// Missing policy ID for `define-power-policy`
    TooFewArguments,
    /// A component flag is the last argument
    MissingComponents(&'static str),
    UnrecognizedArgument(String),
    /// Wrong argument count for `apply-power-policy`
    MissingPolicyId,
    /// Wrong argument count for the policy group commands
    MissingPolicyGroupId,
    /// A policy group entry is not `State:policy`
    InvalidGroupEntry(String),
    DefinePolicy(service::Error),
    ApplyPolicy(service::Error),
    DefinePolicyGroup(service::Error),
    SetPolicyGroup(service::Error),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::MissingCommand => f.write_str("No command given"),
            Error::UnknownCommand(command) => write!(f, "Unknown command: {command}"),
            Error::TooFewArguments => f.write_str("Too few arguments"),
            Error::MissingComponents(flag) => write!(f, "No components for {flag}"),
            Error::UnrecognizedArgument(arg) => write!(f, "Unrecognized argument: {arg}"),
            Error::MissingPolicyId => f.write_str("Power policy ID should be given"),
            Error::MissingPolicyGroupId => f.write_str("Power policy group ID should be given"),
            Error::InvalidGroupEntry(entry) => write!(f, "Invalid power policy group entry: {entry}"),
            Error::DefinePolicy(e) => write!(f, "Failed to define power policy: {e}"),
            Error::ApplyPolicy(e) => write!(f, "Failed to apply power policy: {e}"),
            Error::DefinePolicyGroup(e) => write!(f, "Failed to define power policy group: {e}"),
            Error::SetPolicyGroup(e) => write!(f, "Failed to set power policy group: {e}"),
        }
    }
}

/// A parsed debug command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    DefinePowerPolicy {
        policy_id: &'a str,
        enabled: Vec<&'a str>,
        disabled: Vec<&'a str>,
    },
    ApplyPowerPolicy(&'a str),
    DefinePowerPolicyGroup {
        group_id: &'a str,
        /// `(state name, policy ID)` pairs
        entries: Vec<(&'a str, &'a str)>,
    },
    SetPowerPolicyGroup(&'a str),
    /// Simulated suspend, optionally followed by a reboot
    Suspend { reboot: bool },
    /// End a simulated suspend
    Resume,
}

fn split_components(list: &str) -> Vec<&str> {
    list.split(',').filter(|name| !name.is_empty()).collect()
}

impl<'a> Command<'a> {
    pub fn parse(args: &[&'a str]) -> Result<Self, Error> {
        let (&name, rest) = args.split_first().ok_or(Error::MissingCommand)?;
        match name {
            "define-power-policy" => Self::parse_define_power_policy(rest),
            "apply-power-policy" => match rest {
                &[policy_id] => Ok(Command::ApplyPowerPolicy(policy_id)),
                _ => Err(Error::MissingPolicyId),
            },
            "define-power-policy-group" => {
                let (&group_id, entries) = rest.split_first().ok_or(Error::MissingPolicyGroupId)?;
                let entries = entries
                    .iter()
                    .map(|&entry| entry.split_once(':').ok_or_else(|| Error::InvalidGroupEntry(entry.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Command::DefinePowerPolicyGroup { group_id, entries })
            }
            "set-power-policy-group" => match rest {
                &[group_id] => Ok(Command::SetPowerPolicyGroup(group_id)),
                _ => Err(Error::MissingPolicyGroupId),
            },
            "suspend" => match rest {
                [] => Ok(Command::Suspend { reboot: false }),
                ["reboot"] => Ok(Command::Suspend { reboot: true }),
                [arg, ..] => Err(Error::UnrecognizedArgument(arg.to_string())),
            },
            "resume" => match rest {
                [] => Ok(Command::Resume),
                [arg, ..] => Err(Error::UnrecognizedArgument(arg.to_string())),
            },
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    fn parse_define_power_policy(args: &[&'a str]) -> Result<Self, Error> {
        let (&policy_id, mut rest) = args.split_first().ok_or(Error::TooFewArguments)?;
        let mut enabled = Vec::new();
        let mut disabled = Vec::new();

        while let Some((&flag, after_flag)) = rest.split_first() {
            let (target, flag) = match flag {
                "--enable" => (&mut enabled, "--enable"),
                "--disable" => (&mut disabled, "--disable"),
                other => return Err(Error::UnrecognizedArgument(other.to_string())),
            };
            let (&list, after_list) = after_flag.split_first().ok_or(Error::MissingComponents(flag))?;
            *target = split_components(list);
            rest = after_list;
        }

        Ok(Command::DefinePowerPolicy {
            policy_id,
            enabled,
            disabled,
        })
    }

    /// Run the command, returns the line reported to the user
    pub fn execute(&self, service: &Service<'_>) -> Result<String, Error> {
        info!("Executing debug command {self:?}");
        match self {
            Command::DefinePowerPolicy {
                policy_id,
                enabled,
                disabled,
            } => {
                service
                    .define_power_policy(policy_id, enabled, disabled)
                    .map_err(Error::DefinePolicy)?;
                Ok(format!("Power policy({policy_id}) is successfully defined."))
            }
            Command::ApplyPowerPolicy(policy_id) => {
                service.apply_power_policy(policy_id).map_err(Error::ApplyPolicy)?;
                Ok(format!("Power policy({policy_id}) is successfully applied."))
            }
            Command::DefinePowerPolicyGroup { group_id, entries } => {
                service
                    .define_power_policy_group(group_id, entries)
                    .map_err(Error::DefinePolicyGroup)?;
                Ok(format!("Power policy group({group_id}) is successfully defined."))
            }
            Command::SetPowerPolicyGroup(group_id) => {
                service.set_power_policy_group(group_id).map_err(Error::SetPolicyGroup)?;
                Ok(format!("Setting power policy group({group_id}) is successful."))
            }
            Command::Suspend { reboot } => {
                service.force_suspend_and_maybe_reboot(*reboot);
                Ok(if *reboot {
                    "Suspend: simulating suspend, then rebooting".to_string()
                } else {
                    "Suspend: simulating suspend".to_string()
                })
            }
            Command::Resume => {
                service.force_simulated_resume();
                Ok("Resume: simulating resume".to_string())
            }
        }
    }
}

/// Parse and run a command
pub fn execute(service: &Service<'_>, args: &[&str]) -> Result<String, Error> {
    Command::parse(args)?.execute(service)
}
