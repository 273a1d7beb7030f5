use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(PersonId);
id_newtype!(NetId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a reported net. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetStatus {
    Reported,
    RecoveryPending,
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("net status cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: NetStatus,
    pub to: NetStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown net status '{0}'")]
pub struct UnknownStatus(pub String);

impl NetStatus {
    pub const OPEN: [NetStatus; 2] = [NetStatus::Reported, NetStatus::RecoveryPending];

    /// Value persisted in the `nets.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            NetStatus::Reported => "GEMELDET",
            NetStatus::RecoveryPending => "BERGUNG BEVORSTEHEND",
            NetStatus::Recovered => "GEBORGEN",
        }
    }

    pub fn next(self) -> Option<NetStatus> {
        match self {
            NetStatus::Reported => Some(NetStatus::RecoveryPending),
            NetStatus::RecoveryPending => Some(NetStatus::Recovered),
            NetStatus::Recovered => None,
        }
    }

    /// Only single forward steps are allowed.
    pub fn transition_to(self, to: NetStatus) -> Result<NetStatus, StatusTransitionError> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(StatusTransitionError { from: self, to })
        }
    }
}

impl fmt::Display for NetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "GEMELDET" => Ok(NetStatus::Reported),
            "BERGUNG BEVORSTEHEND" => Ok(NetStatus::RecoveryPending),
            "GEBORGEN" => Ok(NetStatus::Recovered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Next view requested from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Claim,
    Dashboard,
    Confirmation,
    Index,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Claim => "claim",
            Outcome::Dashboard => "dashboard",
            Outcome::Confirmation => "confirmation",
            Outcome::Index => "index",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Reporter,
    Salvager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
}
