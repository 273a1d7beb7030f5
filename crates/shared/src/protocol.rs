use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{NetId, NetStatus, Outcome, PersonId, SessionId, Severity, UserRole};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetForm {
    #[serde(default)]
    pub gps_coordinates: String,
    #[serde(default)]
    pub estimated_size: String,
}

fn default_anonymous() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportNetRequest {
    #[serde(flatten)]
    pub net: NetForm,
    #[serde(default = "default_anonymous")]
    pub anonymous: bool,
    #[serde(default)]
    pub reporter: PersonForm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareClaimRequest {
    pub net_id: NetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmClaimRequest {
    #[serde(default)]
    pub salvager: PersonForm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    pub issued_at: DateTime<Utc>,
}

/// Result of a controller operation as seen by the presentation layer.
/// `outcome == None` means stay on the current view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeResponse {
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub messages: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub new_net: NetForm,
    pub reporter: PersonForm,
    pub anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_to_claim: Option<NetId>,
    pub salvager: PersonForm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<UserRole>,
    pub pending_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetSummary {
    pub net_id: NetId,
    pub gps_coordinates: String,
    pub estimated_size: String,
    pub status: NetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_id: Option<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salvager_id: Option<PersonId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub info: String,
}
