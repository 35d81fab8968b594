pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notifications;
pub mod ports;

pub use audit::{AuditEvent, AuditLog, AuditQuery, AuditSink, AuditSubject, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::complaint::{
    Actor, Complaint, ComplaintId, ComplaintState, ComplaintStatus, EscalationReason, OrderId,
    ResolutionType, TenantId, UserId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    BatchReport, DecisionInput, EscalationPolicy, EscalationScheduler, ResolutionEngine,
    ResolutionError, ResolutionPolicy,
};
pub use notifications::{Notification, NotificationGateway, RecipientRole};
