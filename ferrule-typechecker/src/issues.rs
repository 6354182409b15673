//! Structured diagnostics
//!
//! The engine never renders prose. An [`Issue`] carries a kind (which determines the message
//! key), a severity, the positions involved and named parameters; a message-template provider
//! outside this crate turns that into text.

use crate::ast::Position;
use crate::error::to_source_span;
use indexmap::{IndexMap, IndexSet};
use miette::{Diagnostic, LabeledSpan, SourceSpan};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Notice,
    Warning,
    Error,
    FatalError,
}

impl From<Severity> for miette::Severity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Notice => miette::Severity::Advice,
            Severity::Warning => miette::Severity::Warning,
            Severity::Error | Severity::FatalError => miette::Severity::Error,
        }
    }
}

/// Pass in which an issue is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueCategory {
    Definition,
    Reference,
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    AlreadyDefined,
    AliasForwardReference,
    ForwardReference,
    VariablePartiallyInitialised,
    VariableNotInitialised,
    NotDefined,
    UnknownType,
    AliasTargetNotDefined,
    WrongFunctionCall,
    WrongOperatorUsage,
    UnresolvableRecursion,
    IterationCapReached,
}

impl IssueKind {
    pub fn message_key(self) -> &'static str {
        match self {
            Self::AlreadyDefined => "alreadyDefined",
            Self::AliasForwardReference => "aliasForwardReference",
            Self::ForwardReference => "forwardReference",
            Self::VariablePartiallyInitialised => "variablePartiallyInitialised",
            Self::VariableNotInitialised => "variableNotInitialised",
            Self::NotDefined => "notDefined",
            Self::UnknownType => "unknownType",
            Self::AliasTargetNotDefined => "aliasTargetNotDefined",
            Self::WrongFunctionCall => "wrongFunctionCall",
            Self::WrongOperatorUsage => "wrongOperatorUsage",
            Self::UnresolvableRecursion => "unresolvableRecursion",
            Self::IterationCapReached => "iterationCapReached",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            Self::VariablePartiallyInitialised | Self::IterationCapReached => Severity::Warning,
            Self::NotDefined | Self::UnknownType | Self::AliasTargetNotDefined => {
                Severity::FatalError
            }
            _ => Severity::Error,
        }
    }

    pub fn category(self) -> IssueCategory {
        match self {
            Self::AlreadyDefined
            | Self::AliasForwardReference
            | Self::ForwardReference
            | Self::VariablePartiallyInitialised
            | Self::VariableNotInitialised => IssueCategory::Definition,
            Self::NotDefined | Self::UnknownType | Self::AliasTargetNotDefined => {
                IssueCategory::Reference
            }
            Self::WrongFunctionCall
            | Self::WrongOperatorUsage
            | Self::UnresolvableRecursion
            | Self::IterationCapReached => IssueCategory::Inference,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub position: Position,
    /// Secondary location, e.g. the earlier declaration of a redefined name
    pub related_position: Option<Position>,
    /// Named values for the message template, in insertion order
    pub parameters: IndexMap<&'static str, String>,
    span: Option<SourceSpan>,
}

impl Issue {
    pub fn new(kind: IssueKind, position: Position) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            position,
            related_position: None,
            parameters: IndexMap::new(),
            span: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_related(mut self, position: Position) -> Self {
        self.related_position = Some(position);
        self
    }

    pub fn with_parameter(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.parameters.insert(name, value.into());
        self
    }

    pub fn message_key(&self) -> &'static str {
        self.kind.message_key()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Attach a label span computed against the original source text
    pub fn locate(mut self, source: &str, len: usize) -> Self {
        self.span = to_source_span(source, self.position, len);
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_key())?;
        if !self.parameters.is_empty() {
            let parameters = self
                .parameters
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({parameters})")?;
        }
        write!(f, " at {}", self.position)
    }
}

impl std::error::Error for Issue {}

impl Diagnostic for Issue {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("ferrule::{}", self.message_key())))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(self.severity.into())
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.message_key().to_string()),
            span,
        ))))
    }
}

/// Sink receiving every issue as it is reported
pub trait IssueReporter: Send + Sync {
    fn report(&self, issue: &Issue);
}

/// Accumulates issues of one compilation run
#[derive(Default)]
pub struct IssueCollector {
    issues: Vec<Issue>,
    found: IndexSet<Severity>,
    reporters: Vec<Box<dyn IssueReporter>>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn IssueReporter>) {
        self.reporters.push(reporter);
    }

    pub fn report(&mut self, issue: Issue) {
        tracing::trace!(issue = %issue, severity = ?issue.severity, "issue reported");
        for reporter in &self.reporters {
            reporter.report(&issue);
        }
        self.found.insert(issue.severity);
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn has_found(&self, severity: Severity) -> bool {
        self.found.contains(&severity)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Forget all issues of the current run; reporters stay attached
    pub fn reset(&mut self) {
        self.issues.clear();
        self.found.clear();
    }
}

impl fmt::Debug for IssueCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueCollector")
            .field("issues", &self.issues)
            .field("found", &self.found)
            .field("reporters", &self.reporters.len())
            .finish()
    }
}
