use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComplaintId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

macro_rules! display_inner {
    ($($name:ident),+) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_inner!(ComplaintId, UserId, TenantId, OrderId);

/// Who caused a change. `System` covers scheduled work with no human causer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    System,
    User(UserId),
}

impl Actor {
    pub fn causer_id(&self) -> Option<&UserId> {
        match self {
            Self::System => None,
            Self::User(id) => Some(id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User(_) => "user",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    InReview,
    Escalated,
    Resolved,
    Dismissed,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InReview => "in_review",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_review" => Some(Self::InReview),
            "escalated" => Some(Self::Escalated),
            "resolved" => Some(Self::Resolved),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscalationReason {
    #[serde(rename = "auto_24h")]
    Auto24h,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto24h => "auto_24h",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto_24h" => Some(Self::Auto24h),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: EscalationReason,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Dismiss,
    PartialRefund,
    FullRefund,
    Warning,
    Suspend,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dismiss => "dismiss",
            Self::PartialRefund => "partial_refund",
            Self::FullRefund => "full_refund",
            Self::Warning => "warning",
            Self::Suspend => "suspend",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dismiss" => Some(Self::Dismiss),
            "partial_refund" => Some(Self::PartialRefund),
            "full_refund" => Some(Self::FullRefund),
            "warning" => Some(Self::Warning),
            "suspend" => Some(Self::Suspend),
            _ => None,
        }
    }
}

/// Outcome of a non-dismissal resolution. Refund and suspension facts only
/// exist on the variants they belong to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    PartialRefund { amount: Decimal },
    FullRefund { amount: Decimal },
    Warning,
    Suspend { days: u32, ends_at: DateTime<Utc> },
}

impl ResolutionOutcome {
    pub fn resolution_type(&self) -> ResolutionType {
        match self {
            Self::PartialRefund { .. } => ResolutionType::PartialRefund,
            Self::FullRefund { .. } => ResolutionType::FullRefund,
            Self::Warning => ResolutionType::Warning,
            Self::Suspend { .. } => ResolutionType::Suspend,
        }
    }

    pub fn refund_amount(&self) -> Option<Decimal> {
        match self {
            Self::PartialRefund { amount } | Self::FullRefund { amount } => Some(*amount),
            Self::Warning | Self::Suspend { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    pub notes: String,
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComplaintState {
    Open,
    InReview,
    Escalated {
        escalation: Escalation,
    },
    Resolved {
        escalation: Option<Escalation>,
        resolution: Resolution,
    },
    Dismissed {
        escalation: Option<Escalation>,
        notes: String,
        by: UserId,
        at: DateTime<Utc>,
    },
}

/// What an admin decided, with every amount already settled. Suspension end
/// dates are derived when the verdict is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Dismiss,
    PartialRefund { amount: Decimal },
    FullRefund { amount: Decimal },
    Warning,
    Suspend { days: u32 },
}

impl Verdict {
    pub fn resolution_type(&self) -> ResolutionType {
        match self {
            Self::Dismiss => ResolutionType::Dismiss,
            Self::PartialRefund { .. } => ResolutionType::PartialRefund,
            Self::FullRefund { .. } => ResolutionType::FullRefund,
            Self::Warning => ResolutionType::Warning,
            Self::Suspend { .. } => ResolutionType::Suspend,
        }
    }

    fn target_status(&self) -> ComplaintStatus {
        match self {
            Self::Dismiss => ComplaintStatus::Dismissed,
            _ => ComplaintStatus::Resolved,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub client_id: UserId,
    pub cook_id: UserId,
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub order_number: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub state: ComplaintState,
}

impl Complaint {
    pub fn status(&self) -> ComplaintStatus {
        match &self.state {
            ComplaintState::Open => ComplaintStatus::Open,
            ComplaintState::InReview => ComplaintStatus::InReview,
            ComplaintState::Escalated { .. } => ComplaintStatus::Escalated,
            ComplaintState::Resolved { .. } => ComplaintStatus::Resolved,
            ComplaintState::Dismissed { .. } => ComplaintStatus::Dismissed,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn escalation(&self) -> Option<&Escalation> {
        match &self.state {
            ComplaintState::Escalated { escalation } => Some(escalation),
            ComplaintState::Resolved { escalation, .. }
            | ComplaintState::Dismissed { escalation, .. } => escalation.as_ref(),
            ComplaintState::Open | ComplaintState::InReview => None,
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.escalation().is_some()
    }

    pub fn escalated_at(&self) -> Option<DateTime<Utc>> {
        self.escalation().map(|escalation| escalation.at)
    }

    pub fn escalation_reason(&self) -> Option<EscalationReason> {
        self.escalation().map(|escalation| escalation.reason)
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match &self.state {
            ComplaintState::Resolved { resolution, .. } => Some(resolution),
            _ => None,
        }
    }

    pub fn resolution_type(&self) -> Option<ResolutionType> {
        match &self.state {
            ComplaintState::Resolved { resolution, .. } => {
                Some(resolution.outcome.resolution_type())
            }
            ComplaintState::Dismissed { .. } => Some(ResolutionType::Dismiss),
            _ => None,
        }
    }

    pub fn resolution_notes(&self) -> Option<&str> {
        match &self.state {
            ComplaintState::Resolved { resolution, .. } => Some(resolution.notes.as_str()),
            ComplaintState::Dismissed { notes, .. } => Some(notes.as_str()),
            _ => None,
        }
    }

    pub fn resolved_by(&self) -> Option<&UserId> {
        match &self.state {
            ComplaintState::Resolved { resolution, .. } => Some(&resolution.by),
            ComplaintState::Dismissed { by, .. } => Some(by),
            _ => None,
        }
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            ComplaintState::Resolved { resolution, .. } => Some(resolution.at),
            ComplaintState::Dismissed { at, .. } => Some(*at),
            _ => None,
        }
    }

    pub fn refund_amount(&self) -> Option<Decimal> {
        self.resolution().and_then(|resolution| resolution.outcome.refund_amount())
    }

    pub fn suspension_days(&self) -> Option<u32> {
        match self.resolution().map(|resolution| &resolution.outcome) {
            Some(ResolutionOutcome::Suspend { days, .. }) => Some(*days),
            _ => None,
        }
    }

    pub fn suspension_ends_at(&self) -> Option<DateTime<Utc>> {
        match self.resolution().map(|resolution| &resolution.outcome) {
            Some(ResolutionOutcome::Suspend { ends_at, .. }) => Some(*ends_at),
            _ => None,
        }
    }

    /// Inclusive: a complaint exactly `sla` old is overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>, sla: Duration) -> bool {
        self.status() == ComplaintStatus::Open
            && !self.is_escalated()
            && now.signed_duration_since(self.created_at) >= sla
    }

    pub fn can_transition_to(&self, next: ComplaintStatus) -> bool {
        matches!(
            (self.status(), next),
            (ComplaintStatus::Open, ComplaintStatus::InReview)
                | (ComplaintStatus::Open, ComplaintStatus::Escalated)
                | (
                    ComplaintStatus::Open | ComplaintStatus::InReview | ComplaintStatus::Escalated,
                    ComplaintStatus::Resolved | ComplaintStatus::Dismissed
                )
        )
    }

    pub fn start_review(&mut self) -> Result<(), DomainError> {
        self.guard_transition(ComplaintStatus::InReview)?;
        self.state = ComplaintState::InReview;
        Ok(())
    }

    pub fn escalate(
        &mut self,
        reason: EscalationReason,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.guard_transition(ComplaintStatus::Escalated)?;
        self.state = ComplaintState::Escalated { escalation: Escalation { reason, at } };
        Ok(())
    }

    /// Moves the complaint into its terminal state. Escalation facts are kept.
    pub fn close(
        &mut self,
        verdict: Verdict,
        notes: impl Into<String>,
        by: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.guard_transition(verdict.target_status())?;

        let notes = notes.into();
        let escalation = self.escalation().cloned();
        let outcome = match verdict {
            Verdict::Dismiss => {
                self.state = ComplaintState::Dismissed { escalation, notes, by, at };
                return Ok(());
            }
            Verdict::PartialRefund { amount } => {
                ensure_positive_amount(amount)?;
                ResolutionOutcome::PartialRefund { amount }
            }
            Verdict::FullRefund { amount } => {
                ensure_positive_amount(amount)?;
                ResolutionOutcome::FullRefund { amount }
            }
            Verdict::Warning => ResolutionOutcome::Warning,
            Verdict::Suspend { days } => {
                if days == 0 {
                    return Err(DomainError::InvariantViolation(
                        "suspension must last at least one day".to_string(),
                    ));
                }
                ResolutionOutcome::Suspend { days, ends_at: at + Duration::days(i64::from(days)) }
            }
        };

        self.state = ComplaintState::Resolved {
            escalation,
            resolution: Resolution { outcome, notes, by, at },
        };
        Ok(())
    }

    fn guard_transition(&self, next: ComplaintStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(DomainError::InvalidComplaintTransition { from: self.status(), to: next })
    }
}

fn ensure_positive_amount(amount: Decimal) -> Result<(), DomainError> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::InvariantViolation(format!(
            "refund amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
