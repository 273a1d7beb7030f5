use chrono::Utc;
use shared::{
    domain::{NetId, SessionId, Severity, UserRole},
    protocol::{NetForm, Notice, PersonForm, SessionSnapshot},
};

/// Per-session form state. Each controller operation receives it explicitly;
/// nothing here is shared between sessions.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub new_net: NetForm,
    pub reporter: PersonForm,
    pub anonymous: bool,
    pub net_to_claim: Option<NetId>,
    pub salvager: PersonForm,
    pub user_role: Option<UserRole>,
    messages: Vec<Notice>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            new_net: NetForm::default(),
            reporter: PersonForm::default(),
            anonymous: true,
            net_to_claim: None,
            salvager: PersonForm::default(),
            user_role: None,
            messages: Vec::new(),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset_report_form(&mut self) {
        self.new_net = NetForm::default();
        self.reporter = PersonForm::default();
        self.anonymous = true;
    }

    pub fn push_notice(
        &mut self,
        severity: Severity,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.messages.push(Notice {
            severity,
            summary: summary.into(),
            detail: detail.into(),
            issued_at: Utc::now(),
        });
    }

    pub fn messages(&self) -> &[Notice] {
        &self.messages
    }

    /// Hands queued notices to the presentation layer; each is shown once.
    pub fn drain_messages(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.messages)
    }

    pub fn snapshot(&self, session_id: SessionId) -> SessionSnapshot {
        SessionSnapshot {
            session_id,
            new_net: self.new_net.clone(),
            reporter: self.reporter.clone(),
            anonymous: self.anonymous,
            net_to_claim: self.net_to_claim,
            salvager: self.salvager.clone(),
            user_role: self.user_role,
            pending_messages: self.messages.len(),
        }
    }
}
