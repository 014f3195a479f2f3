//! Jolt Core
//!
//! Runtime values and the build-and-load service boundary shared by the
//! evaluation engine and its backends.

pub mod service;
pub mod values;

pub use service::{
    BuildError, BuildService, ClassHandle, InvokeError, LoadError, MemberRef, MemberSignature,
    CONSTRUCTOR,
};
pub use values::{ArrayData, CopyMemo, Instance, Value};
