//! Code generation error types.

/// Error type for code generation operations.
///
/// Allows proper propagation with `?` for both logical errors (register
/// exhaustion, malformed trees) and formatting errors while writing
/// assembly text.
#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation.
    Logic(String),
    /// A formatting error when writing assembly text.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "assembly emission error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

/// Top-level compilation failure.
#[derive(Debug)]
pub enum CompileError {
    /// Semantic errors were posted to the reporter; no artifact.
    Semantic { errors: usize },
    /// Emission itself failed.
    CodeGen(CodeGenError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Semantic { errors } => {
                write!(f, "compilation stopped after {} error(s)", errors)
            }
            CompileError::CodeGen(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CodeGenError> for CompileError {
    fn from(e: CodeGenError) -> Self {
        CompileError::CodeGen(e)
    }
}
