//! Developer-facing diagnostics.
//!
//! Every recoverable condition in the runtime is reported here and through
//! `tracing`. `warn_once` deduplicates by `(kind, key)` so a broken binding
//! rendered a thousand times warns once.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    Parse,
    MissingIdentifier,
    Evaluation,
    DuplicateKey,
    VirtualizationConfig,
    Measurement,
    Callback,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::MissingIdentifier => "missing-identifier",
            DiagnosticKind::Evaluation => "evaluation",
            DiagnosticKind::DuplicateKey => "duplicate-key",
            DiagnosticKind::VirtualizationConfig => "virtualization-config",
            DiagnosticKind::Measurement => "measurement",
            DiagnosticKind::Callback => "callback",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub key: String,
    pub message: String,
}

#[derive(Default)]
struct DiagnosticSink {
    seen: HashSet<(DiagnosticKind, String)>,
    records: Vec<Diagnostic>,
}

thread_local! {
    static DIAGNOSTICS: RefCell<DiagnosticSink> = RefCell::new(DiagnosticSink::default());
}

/// Report a diagnostic unless the same `(kind, key)` was already reported.
/// Returns whether it was emitted.
pub fn warn_once(kind: DiagnosticKind, key: impl Into<String>, message: impl Into<String>) -> bool {
    let key = key.into();
    let fresh = DIAGNOSTICS.with(|sink| sink.borrow_mut().seen.insert((kind, key.clone())));
    if fresh {
        report(kind, key, message.into());
    }
    fresh
}

/// Report a diagnostic unconditionally
pub fn warn_always(kind: DiagnosticKind, key: impl Into<String>, message: impl Into<String>) {
    report(kind, key.into(), message.into());
}

fn report(kind: DiagnosticKind, key: String, message: String) {
    warn!(kind = %kind, key = %key, "{}", message);
    DIAGNOSTICS.with(|sink| {
        sink.borrow_mut().records.push(Diagnostic { kind, key, message })
    });
}

/// Drain recorded diagnostics (dedup state is kept)
pub fn take_diagnostics() -> Vec<Diagnostic> {
    DIAGNOSTICS.with(|sink| std::mem::take(&mut sink.borrow_mut().records))
}

/// Recorded diagnostics of one kind, without draining
pub fn diagnostics_of(kind: DiagnosticKind) -> Vec<Diagnostic> {
    DIAGNOSTICS.with(|sink| {
        sink.borrow()
            .records
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    })
}

/// Forget recorded diagnostics and dedup state
pub fn reset_diagnostics() {
    DIAGNOSTICS.with(|sink| *sink.borrow_mut() = DiagnosticSink::default());
}
