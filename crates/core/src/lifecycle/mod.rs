//! Complaint lifecycle services: the overdue-complaint escalation batch and
//! the admin resolution engine.

pub mod escalation;
pub mod resolution;

pub use escalation::{BatchItemError, BatchReport, EscalationPolicy, EscalationScheduler};
pub use resolution::{
    DecisionAction, DecisionInput, DecisionValidationError, RefundGuard, ResolutionDecision,
    ResolutionEngine, ResolutionError, ResolutionPolicy,
};
