//! Folding statements into the entry routine.
//!
//! The routine body is a statement log kept in [`SessionState`]; rebuilding
//! the entry unit is concatenation of imports, baseline fields and the log.
//! Each rebuild replays the whole body from fresh copies of the baseline, so
//! heap state ends up the same after every fold while statements with
//! visible side effects (printing) repeat.

use crate::binding::{detach_all, Binding};
use crate::error::EvalError;
use crate::session::{CompiledUnit, EntryRoutine, Routine, SessionState};
use crate::synth::{fields, prelude, ENTRY_ROUTINE, ENTRY_UNIT, HOLDER_UNIT};
use jolt_core::{BuildService, ClassHandle, CopyMemo};
use std::fmt::Write as _;
use tracing::{debug, info};

/// One change to the entry routine.
#[derive(Debug, Clone)]
pub enum RoutineEdit {
    /// Append a statement; `touches` names the binding it assigns, if any.
    Append {
        statement: String,
        touches: Option<String>,
    },
    /// Add (or retype) a binding whose value is already evaluated. A
    /// retyped binding starts a fresh routine, since earlier statements
    /// were written against the old type. `assign` is appended after the
    /// declaration so replay recomputes the value inside the routine.
    Declare {
        binding: Binding,
        fresh: bool,
        assign: Option<String>,
    },
}

impl RoutineEdit {
    fn touched(&self) -> Option<&str> {
        match self {
            RoutineEdit::Append { touches, .. } => touches.as_deref(),
            RoutineEdit::Declare { binding, .. } => Some(&binding.name),
        }
    }
}

/// Source text of the entry unit.
pub fn entry_unit(prelude: &str, routine: &EntryRoutine) -> String {
    let mut out = format!(
        "{}public class {} {{\n{}",
        prelude,
        ENTRY_UNIT,
        fields(routine.baseline.values())
    );
    let _ = writeln!(out, "    public static void {}() {{", ENTRY_ROUTINE);
    for statement in &routine.body {
        let _ = writeln!(out, "        {}", statement);
    }
    out.push_str("    }\n}\n");
    out
}

/// Apply `edit`, rebuild the entry unit, replay it, and read every binding
/// back. On failure the routine and the touched binding are restored.
pub fn splice<S: BuildService>(
    service: &mut S,
    session: &mut SessionState<S::Handle>,
    edit: RoutineEdit,
) -> Result<(), EvalError> {
    let saved_routine = session.routine().clone();
    let touched = edit
        .touched()
        .map(|name| (name.to_string(), session.binding(name).cloned()));

    match edit {
        RoutineEdit::Append { statement, .. } => session.push_statement(statement),
        RoutineEdit::Declare {
            binding,
            fresh,
            assign,
        } => {
            if fresh {
                session.soft_reset();
            }
            let copy = binding.detached(&mut CopyMemo::new());
            session.put_binding(binding);
            match session.routine_mut() {
                Some(routine) => {
                    routine.baseline.insert(copy.name.clone(), copy);
                }
                None => session.start_routine(),
            }
            if let Some(statement) = assign {
                session.push_statement(statement);
            }
        }
    }

    let result = run_routine(service, session);
    if result.is_err() {
        let was_empty = !saved_routine.is_running();
        session.set_routine(saved_routine);
        if let Some((name, previous)) = touched {
            match previous {
                Some(binding) => session.put_binding(binding),
                None => {
                    session.remove_binding(&name);
                }
            }
        }
        if was_empty {
            service.discard(ENTRY_UNIT);
            session.remove_unit(ENTRY_UNIT);
        }
    }
    result
}

/// Rebuild and replay the current routine. Does nothing when it is empty.
pub fn run_routine<S: BuildService>(
    service: &mut S,
    session: &mut SessionState<S::Handle>,
) -> Result<(), EvalError> {
    let Routine::Running(routine) = session.routine().clone() else {
        return Ok(());
    };
    let prelude = prelude(
        session.imports(),
        session.unit(HOLDER_UNIT).is_some(),
        ENTRY_UNIT,
    );
    let source = entry_unit(&prelude, &routine);
    debug!(
        unit = ENTRY_UNIT,
        statements = routine.body.len(),
        "rebuilding entry routine\n{}",
        source
    );

    service.compile(ENTRY_UNIT, &source)?;
    let handle = service.load(ENTRY_UNIT)?;
    seed(&handle, &detach_all(routine.baseline.values()))?;
    seed_holder(session)?;

    let main = handle
        .find_member(ENTRY_ROUTINE, &[])
        .ok_or_else(|| EvalError::MemberNotFound {
            name: format!("{}.{}", ENTRY_UNIT, ENTRY_ROUTINE),
            shapes: String::new(),
        })?;
    handle.invoke(&main, None, &[])?;

    for name in routine.baseline.keys() {
        if let Some(value) = handle.get_static(name) {
            session.set_value(name, value)?;
        }
    }
    let members = handle.members();
    session.register_unit(CompiledUnit {
        name: ENTRY_UNIT.to_string(),
        source,
        handle,
        members,
    });
    Ok(())
}

/// Copy binding values into the matching static fields of a loaded unit.
/// Fields declared from literals already hold the value; objects and
/// arrays only arrive this way.
pub fn seed<'a, H: ClassHandle>(
    handle: &H,
    bindings: impl IntoIterator<Item = &'a Binding>,
) -> Result<(), EvalError> {
    for binding in bindings {
        if handle.get_static(&binding.name).is_some() {
            handle.set_static(&binding.name, binding.value.clone())?;
        }
    }
    Ok(())
}

/// Refresh the method holder's copies of the bindings before user code
/// that may call session methods runs.
pub fn seed_holder<H: ClassHandle>(session: &SessionState<H>) -> Result<(), EvalError> {
    match session.unit(HOLDER_UNIT) {
        Some(holder) => seed(&holder.handle, session.bindings()),
        None => Ok(()),
    }
}

/// Drop the routine body but keep every binding's current value.
pub fn soft_reset<S: BuildService>(service: &mut S, session: &mut SessionState<S::Handle>) {
    session.soft_reset();
    session.remove_unit(ENTRY_UNIT);
    service.discard(ENTRY_UNIT);
    info!("entry routine cleared");
}
