//! audit.rs - Audit events emitted by the sanitizer.
//!
//! The core never persists anything itself. It hands [`AuditEvent`]s to an
//! [`AuditSink`] and carries on regardless of what the sink does with them:
//! one event per top-level sanitization call, plus one per non-quiet
//! structurally invalid value found while validating.
//!
//! License: MIT OR APACHE 2.0

use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Mutex;

/// A single, auditable accept/reject record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub accepted: bool,
    /// What produced the decision: `html` for a whole call, or a validator trace line.
    pub rule: String,
    pub input: String,
    pub output: String,
    pub input_hash: String,
}

impl AuditEvent {
    pub fn new(accepted: bool, rule: impl Into<String>, input: &str, output: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            accepted,
            rule: rule.into(),
            input: input.to_string(),
            output: output.to_string(),
            input_hash: input_hash(input),
        }
    }
}

/// Hex-encoded SHA-256 of the raw input, so sinks can correlate events without storing markup twice.
pub fn input_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Receives audit events. Implementations must not panic; failures are theirs to swallow.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Keeps events in memory, mostly useful for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Writes one JSON object per line to any writer (a file, stderr, a socket).
pub struct JsonLinesAuditSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesAuditSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer: Mutex::new(writer) }
    }
}

impl std::fmt::Debug for JsonLinesAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesAuditSink").finish_non_exhaustive()
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            warn!("Audit writer lock poisoned; dropping event.");
            return;
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to write audit event: {}", e);
        }
    }
}
