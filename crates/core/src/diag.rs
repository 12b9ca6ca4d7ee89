//! Diagnostics reporter.
//!
//! The reporter is the single sink for semantic errors and warnings. The
//! expression builder posts a diagnostic and hands back a broken node;
//! callers keep going to surface more errors but never emit code once
//! `was_error` is set. The code generator only ever posts
//! [`ErrorCode::NodeUnexpected`] — user-level errors were all caught
//! earlier.

use crate::location::Location;

/// Semantic error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UndeclaredIdentifier,
    TypeMismatch,
    SubscriptNotArray,
    SubscriptNotInteger,
    CallNotFunction,
    WrongArgumentCount,
    NotLvalue,
    InvalidMember,
    TernaryIncompatible,
    InitializerSizeMismatch,
    EmptyInitializer,
    InvalidInitializer,
    /// Internal: the code generator met a node shape it cannot lower.
    /// The emitted artifact is invalid from this point on.
    NodeUnexpected,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorCode::UndeclaredIdentifier => "use of undeclared identifier",
            ErrorCode::TypeMismatch => "invalid operand types for operation",
            ErrorCode::SubscriptNotArray => "subscripted value is not an array",
            ErrorCode::SubscriptNotInteger => "array subscript is not an integer",
            ErrorCode::CallNotFunction => "called object is not a function",
            ErrorCode::WrongArgumentCount => "wrong number of arguments in call",
            ErrorCode::NotLvalue => "expression is not assignable",
            ErrorCode::InvalidMember => "no such member in structure",
            ErrorCode::TernaryIncompatible => "incompatible operand types in conditional",
            ErrorCode::InitializerSizeMismatch => "initializer size does not match",
            ErrorCode::EmptyInitializer => "empty initializer list",
            ErrorCode::InvalidInitializer => "invalid initializer",
            ErrorCode::NodeUnexpected => "internal: unexpected node",
        };
        f.write_str(text)
    }
}

/// Warning codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    /// `==`/`!=` on floating operands.
    FloatEqualityComparison,
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            WarningCode::FloatEqualityComparison => {
                "comparing floating-point values for exact equality"
            }
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One posted diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub location: Location,
    pub message: String,
}

/// Collects diagnostics for the whole translation unit.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl Reporter {
    pub fn new() -> Self {
        Reporter::default()
    }

    pub fn error(&mut self, code: ErrorCode, location: Location, detail: &str) {
        let message = if detail.is_empty() {
            code.to_string()
        } else {
            format!("{}: {}", code, detail)
        };
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: format!("{:?}", code),
            location,
            message,
        });
        self.error_count += 1;
    }

    pub fn warning(&mut self, code: WarningCode, location: Location) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            code: format!("{:?}", code),
            location,
            message: code.to_string(),
        });
    }

    pub fn was_error(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sets_flag() {
        let mut reporter = Reporter::new();
        assert!(!reporter.was_error());
        reporter.error(ErrorCode::TypeMismatch, Location::new(3, 8), "");
        assert!(reporter.was_error());
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn test_warning_does_not_set_flag() {
        let mut reporter = Reporter::new();
        reporter.warning(WarningCode::FloatEqualityComparison, Location::default());
        assert!(!reporter.was_error());
        assert_eq!(reporter.diagnostics().len(), 1);
    }

    #[test]
    fn test_detail_appended() {
        let mut reporter = Reporter::new();
        reporter.error(ErrorCode::UndeclaredIdentifier, Location::new(0, 3), "foo");
        assert!(reporter.diagnostics()[0].message.contains("foo"));
    }
}
