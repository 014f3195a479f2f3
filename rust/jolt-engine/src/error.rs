use jolt_core::{BuildError, InvokeError, LoadError};
use thiserror::Error;

/// Everything that can go wrong while evaluating one fragment.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// Logged when a statement matches no known shape; evaluation continues
    /// through the throwaway fallback unit.
    #[error("unrecognized fragment shape: {0}")]
    ClassificationAmbiguity(String),
    #[error("Variable {0} not declared.")]
    UndeclaredVariable(String),
    #[error("build failed: {0}")]
    BuildFailure(#[from] BuildError),
    #[error("load failed: {0}")]
    LoadFailure(#[from] LoadError),
    #[error("no callable member '{name}' accepts ({shapes})")]
    MemberNotFound { name: String, shapes: String },
    #[error("{exception}: {message}")]
    InvocationFailure { exception: String, message: String },
    #[error("expected a {expected}, got: {fragment}")]
    FragmentShape {
        expected: &'static str,
        fragment: String,
    },
    #[error("incompatible types: {found} cannot be converted to {expected}")]
    TypeMismatch { expected: String, found: String },
    #[error("cannot find symbol '{0}'")]
    Unresolved(String),
}

impl EvalError {
    pub(crate) fn shape(expected: &'static str, fragment: &str) -> Self {
        EvalError::FragmentShape {
            expected,
            fragment: fragment.to_string(),
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        EvalError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<InvokeError> for EvalError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::MemberNotFound {
                class,
                member,
                shapes,
            } => EvalError::MemberNotFound {
                name: format!("{}.{}", class, member),
                shapes,
            },
            InvokeError::Unresolved { name } => EvalError::Unresolved(name),
            InvokeError::Exception { exception, message } => {
                EvalError::InvocationFailure { exception, message }
            }
            InvokeError::TypeMismatch { expected, found } => {
                EvalError::TypeMismatch { expected, found }
            }
        }
    }
}
