//! Jolt Engine
//!
//! Incremental evaluation of source fragments. Each fragment is classified
//! by its leading tokens, folded into the session, and turned into whole
//! compilation units that a [`BuildService`](jolt_core::BuildService)
//! compiles and loads. Statements accumulate in an entry routine that is
//! rebuilt and replayed on every new statement; methods accumulate in a
//! holder unit; expressions run in throwaway units.

pub mod binding;
pub mod classify;
pub mod coerce;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod session;
pub mod splice;
pub mod synth;

pub use binding::Binding;
pub use classify::{classify, statement_shape, FragmentKind, StatementShape};
pub use engine::{DefinitionKind, Engine, Outcome, Report, ResetKind};
pub use error::EvalError;
pub use session::{CompiledUnit, ImportRecord, MethodDef, Routine, SessionState};

/// Fragment that clears the entry routine but keeps bindings.
pub const SOFT_RESET: &str = ":reset";
/// Fragment that clears the whole session and its staged artifacts.
pub const HARD_RESET: &str = ":reset-all";
