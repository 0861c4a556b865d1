//! Diagnostics for `jscomp-genlower`.
//!
//! Mirrors the shape used throughout the host compiler's other passes:
//! `diagnostics().diagnostic(Severity::Error).with_message(..).with_primary_label(span, ..)
//! .into_report()`. The one deliberate deviation from the teacher is that this crate depends on
//! upstream `miette` rather than the teacher's private republished fork (`miden-miette`) — this
//! pass is not Miden-specific, so there is no reason to pull in a Miden-branded dependency; see
//! `DESIGN.md`.
//!
//! Two channels, kept structurally distinct per the error taxonomy (§7 of the spec this repo
//! implements): [`Diagnostic`]/[`DiagnosticsHandler`] for user-visible diagnostics that abort only
//! the lowering of one function, and [`InternalError`] for precondition/invariant violations that
//! indicate a bug in the pass itself and are never routed through the user channel.

use std::cell::RefCell;

pub use miette::Report;
use thiserror::Error;

/// A byte-offset span into the original source, propagated by the (out of scope) AST
/// construction/source-position layer. Kept minimal here since this repository only needs it to
/// label diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    fn to_source_span(self) -> miette::SourceSpan {
        (self.start as usize, (self.end - self.start) as usize).into()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// The renderable diagnostic produced by [`DiagnosticBuilder::into_report`].
///
/// Implements `miette::Diagnostic` by hand rather than via `#[derive(Diagnostic)]` because
/// severity varies per instance (warning vs. error), which the derive macro does not support.
#[derive(Debug, Error)]
#[error("{message}")]
struct RenderedDiagnostic {
    message: String,
    severity: Severity,
    primary: Option<miette::SourceSpan>,
    label: String,
    help: Option<String>,
}

impl miette::Diagnostic for RenderedDiagnostic {
    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Warning => miette::Severity::Warning,
            Severity::Error => miette::Severity::Error,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help.as_ref().map(|h| Box::new(h.as_str()) as Box<dyn std::fmt::Display + 'a>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let primary = self.primary?;
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(self.label.clone()),
            primary,
        ))))
    }
}

/// Builder for a single user-visible diagnostic, started by
/// [`DiagnosticsHandler::diagnostic`].
pub struct DiagnosticBuilder {
    severity: Severity,
    message: Option<String>,
    primary_label: Option<(Span, String)>,
    help: Option<String>,
}

impl DiagnosticBuilder {
    fn new(severity: Severity) -> Self {
        Self {
            severity,
            message: None,
            primary_label: None,
            help: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_primary_label(mut self, span: Span, label: impl Into<String>) -> Self {
        self.primary_label = Some((span, label.into()));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Finalizes the diagnostic into a [`Report`] ready to hand back up the call stack (e.g. as
    /// `Err(builder.into_report())`).
    pub fn into_report(self) -> Report {
        let (primary, label) = match self.primary_label {
            Some((span, label)) => (Some(span.to_source_span()), label),
            None => (None, String::new()),
        };
        Report::new(RenderedDiagnostic {
            message: self.message.unwrap_or_default(),
            severity: self.severity,
            primary,
            label,
            help: self.help,
        })
    }
}

/// Owns the diagnostics produced while lowering one program. The real host compiler would emit
/// these to its own reporter as they arrive; this repository collects them so tests can assert on
/// exactly what would have been reported.
#[derive(Default)]
pub struct DiagnosticsHandler {
    collected: RefCell<Vec<Report>>,
}

impl DiagnosticsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostic(&self, severity: Severity) -> DiagnosticBuilder {
        DiagnosticBuilder::new(severity)
    }

    /// Records a finished diagnostic (typically the result of `.into_report()` on a builder
    /// obtained from `self.diagnostic(..)`) without unwinding. Used when the pass wants to report
    /// an error for one function but keep lowering the rest of the program (§7 propagation
    /// policy: "compilation continues").
    pub fn emit(&self, report: Report) {
        self.collected.borrow_mut().push(report);
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.collected.into_inner()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.collected.borrow().len()
    }
}

/// Internal invariant violations: programmer errors in the pass itself, never user-visible (§7).
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("stack imbalance at end of function lowering: {which} was not empty")]
    StackImbalance { which: &'static str },

    #[error("expected exactly one yield in exposed subtree, found {count}")]
    YieldCountMismatch { count: usize },

    #[error("expected a block in this position")]
    ExpectedBlock,

    #[error("`super` is not supported inside a generator function")]
    UnsupportedSuper,

    #[error("reference to case id {id} that does not exist after collapse")]
    DanglingCaseReference { id: u32 },

    #[error("nested finally block count underflowed")]
    NestedFinallyUnderflow,

    #[error("labeled break/continue references label {name:?}, which was never registered")]
    UnresolvedLabel { name: String },
}

impl InternalError {
    pub fn into_report(self) -> Report {
        Report::from(self)
    }
}
