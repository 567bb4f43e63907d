//! Run outcome reporting: counts plus accumulated non-fatal diagnostics.

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A shipment could not be placed into any existing merged row for its
    /// order key; the run continues and the row stays unenriched.
    UnmatchedExistingRowPatch,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::UnmatchedExistingRowPatch => "unmatched-existing-row-patch",
        }
    }
}

/// One recoverable problem observed during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

/// Summary of one driver run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    /// Orders newly merged (appended) this run.
    pub orders_merged: usize,
    /// Data rows appended this run (headers + items + unmatched rows).
    pub rows_appended: usize,
    /// Blank cells filled on pre-existing rows this run.
    pub cells_patched: usize,
    /// Shipment rows emitted with the could-not-match marker.
    pub unmatched_shipments: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn push_diagnostic(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(kind, message));
    }
}
