//! Diagnostics sink contract.
//!
//! Components hand failures worth an operator's attention to a
//! [`DiagnosticsSink`]. Reporting is fire-and-forget: `report` returns
//! immediately, never fails, and never blocks on I/O.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Severity attached to a diagnostic report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected, user-driven outcome worth counting (e.g. a closed dialog).
    Info,
    Warning,
    Error,
}

/// A single reported failure with free-form context.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// Component-level category, e.g. `primary_auth` or `license_identify`.
    pub kind: String,
    /// Display form of the error.
    pub error: String,
    /// Display forms of the error's `source()` chain, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    /// Machine-readable code, if the failure carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// RFC 3339 timestamp of when the report was built.
    pub timestamp: String,
}

impl DiagnosticReport {
    /// Build an error-severity report from a message.
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            error: error.into(),
            causes: Vec::new(),
            code: None,
            severity: Severity::Error,
            context: Map::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build a report from an error, capturing its source chain.
    pub fn from_error(kind: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut report = Self::new(kind, error.to_string());
        let mut source = error.source();
        while let Some(cause) = source {
            report.causes.push(cause.to_string());
            source = cause.source();
        }
        report
    }

    pub fn with_code(mut self, code: impl ToString) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Destination for diagnostic reports.
pub trait DiagnosticsSink: Send + Sync {
    /// Hand a report to the sink. Must not block the caller.
    fn report(&self, report: DiagnosticReport);
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn report(&self, _report: DiagnosticReport) {}
}

/// Sink that keeps reports in memory so callers can assert on them.
#[derive(Debug, Default, Clone)]
pub struct RecordingDiagnostics {
    reports: Arc<Mutex<Vec<DiagnosticReport>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every report received so far.
    pub fn reports(&self) -> Vec<DiagnosticReport> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds of every report received so far, in order.
    pub fn kinds(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.kind.clone()).collect()
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn report(&self, report: DiagnosticReport) {
        tracing::debug!(kind = %report.kind, code = ?report.code, "diagnostic recorded");
        self.reports.lock().push(report);
    }
}
