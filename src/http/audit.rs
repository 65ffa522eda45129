//! Security audit logging for HTTP events.
//!
//! Provides structured audit logging for abuse-related events like
//! throttled clients and oversized uploads.

use tracing::{info, warn};

/// Security audit events that should be logged for monitoring and alerting.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// Client exceeded its request budget
    RateLimited { client: String, path: String },
    /// Upload body exceeded the size cap
    OversizedUpload { client: String, limit: u64 },
    /// Upload reused a seed code that is already taken
    DuplicateSeed { client: String },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::RateLimited { client, path } => {
            warn!(
                target: "audit",
                event_type = "rate_limited",
                %client,
                %path,
                "Request rejected by rate limiter"
            );
        },
        AuditEvent::OversizedUpload { client, limit } => {
            warn!(
                target: "audit",
                event_type = "oversized_upload",
                %client,
                limit,
                "Upload rejected for exceeding size cap"
            );
        },
        AuditEvent::DuplicateSeed { client } => {
            info!(
                target: "audit",
                event_type = "duplicate_seed",
                %client,
                "Upload rejected for duplicate seed code"
            );
        },
    }
}
