//! The build-and-load boundary.
//!
//! The engine synthesizes complete compilation units as text and hands them
//! to a [`BuildService`]. The service compiles them, loads them, and returns
//! [`ClassHandle`]s the engine uses to invoke members and move values in and
//! out of static fields. The engine never sees how a backend executes code:
//! an embedded interpreter, a subprocess compiler, or a JIT all fit behind
//! these two traits.

use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name used for constructors in member listings.
pub const CONSTRUCTOR: &str = "<init>";

/// One externally callable member of a loaded class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSignature {
    pub name: String,
    pub params: Vec<String>,
    pub ret: String,
    pub is_static: bool,
}

impl MemberSignature {
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            write!(f, "static ")?;
        }
        if self.is_constructor() {
            write!(f, "{}({})", self.name, self.params.join(", "))
        } else {
            write!(f, "{} {}({})", self.ret, self.name, self.params.join(", "))
        }
    }
}

/// A member located by [`BuildService::resolve_callable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub class: String,
    pub member: MemberSignature,
}

// ── Errors ──────────────────────────────────────────────────────────

/// The compile step rejected a unit. Diagnostics are opaque to the engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("{unit}: {diagnostics}")]
    Rejected { unit: String, diagnostics: String },
    #[error("unit '{unit}' does not declare a class named '{unit}'")]
    MissingPrimaryClass { unit: String },
    #[error("could not stage unit '{unit}': {message}")]
    Staging { unit: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("unit '{0}' has not been compiled")]
    NotCompiled(String),
    #[error("static initialization of '{class}' failed: {message}")]
    Initializer { class: String, message: String },
    #[error("staging area error: {0}")]
    Staging(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvokeError {
    #[error("no member '{member}' in class '{class}' accepts ({shapes})")]
    MemberNotFound {
        class: String,
        member: String,
        shapes: String,
    },
    #[error("cannot find symbol '{name}'")]
    Unresolved { name: String },
    #[error("{exception}: {message}")]
    Exception { exception: String, message: String },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
}

impl InvokeError {
    pub fn exception(exception: impl Into<String>, message: impl Into<String>) -> Self {
        InvokeError::Exception {
            exception: exception.into(),
            message: message.into(),
        }
    }
}

// ── Capabilities ────────────────────────────────────────────────────

/// A loaded class.
///
/// Handles are cheap to clone. A handle names its class, so after the
/// owning unit is recompiled it reaches the newly loaded version.
pub trait ClassHandle: Clone {
    fn name(&self) -> &str;

    /// Every public member, constructors included, in declaration order.
    fn members(&self) -> Vec<MemberSignature>;

    /// Best member named `name` that accepts arguments of the given shapes.
    fn find_member(&self, name: &str, shapes: &[String]) -> Option<MemberSignature>;

    fn invoke(
        &self,
        member: &MemberSignature,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, InvokeError>;

    /// Instantiate through the best matching constructor.
    fn construct(&self, args: &[Value]) -> Result<Value, InvokeError>;

    fn get_static(&self, field: &str) -> Option<Value>;

    fn set_static(&self, field: &str, value: Value) -> Result<(), InvokeError>;
}

/// Compiles and loads named textual units.
pub trait BuildService {
    type Handle: ClassHandle;

    fn compile(&mut self, unit: &str, source: &str) -> Result<(), BuildError>;

    /// Load a compiled unit, running its static initializers, and return the
    /// class that gives the unit its name.
    fn load(&mut self, unit: &str) -> Result<Self::Handle, LoadError>;

    /// Handle to any loaded class by name.
    fn handle(&self, class: &str) -> Option<Self::Handle>;

    /// Search every loaded class for a callable member.
    fn resolve_callable(&self, name: &str, shapes: &[String]) -> Option<MemberRef>;

    /// Forget one unit and every class it declared.
    fn discard(&mut self, unit: &str);

    /// Forget everything and delete staged artifacts.
    fn discard_all(&mut self) -> Result<(), LoadError>;

    /// Display text for a value, honoring user `toString()` overrides.
    fn render(&self, value: &Value) -> String;
}
