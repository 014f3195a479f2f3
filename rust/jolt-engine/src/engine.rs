//! The single evaluation entry point.

use crate::binding::{field_type, initializer, Binding};
use crate::classify::{classify, statement_shape, FragmentKind, StatementShape};
use crate::coerce::coerce;
use crate::error::EvalError;
use crate::invoke::{self, CallSite};
use crate::session::{CompiledUnit, ImportRecord, MethodDef, SessionState};
use crate::splice::{self, RoutineEdit};
use crate::synth::{
    class_name, class_unit, holder_unit, make_static, method_signature, prelude, split_classes,
    DYNAMIC_UNIT, ENTRY_UNIT, EXPRESSION_UNIT, HOLDER_UNIT,
};
use crate::{HARD_RESET, SOFT_RESET};
use jolt_core::{BuildService, ClassHandle, LoadError, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, error, info, warn};

static LEADING_MODIFIERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:public|private|protected|static|final)\s+)+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Class,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

/// A failed fragment together with the session dump taken at the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub error: EvalError,
    pub state: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n--- session ---\n{}", self.error, self.state)
    }
}

/// What evaluating one fragment did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Blank input.
    Nothing,
    Value {
        value: Value,
        rendered: String,
    },
    Declared {
        name: String,
        value: Value,
        rendered: String,
    },
    Assigned {
        name: String,
        value: Value,
        rendered: String,
    },
    /// Ran for its side effects only.
    Executed,
    Defined {
        kind: DefinitionKind,
        names: Vec<String>,
    },
    Imported {
        symbol: String,
        local: bool,
    },
    Reset(ResetKind),
    Failed(Report),
}

enum Produced {
    Value(Value),
    Void,
}

/// An incremental evaluator over a build-and-load backend.
pub struct Engine<S: BuildService> {
    service: S,
    session: SessionState<S::Handle>,
}

impl<S: BuildService> Engine<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            session: SessionState::new(),
        }
    }

    pub fn session(&self) -> &SessionState<S::Handle> {
        &self.session
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Evaluate one brace-balanced fragment. Never fails: errors come back
    /// as [`Outcome::Failed`] and the session stays usable.
    pub fn evaluate(&mut self, fragment: &str) -> Outcome {
        match self.try_evaluate(fragment) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "fragment failed");
                Outcome::Failed(Report {
                    error: err,
                    state: self.session.render(),
                })
            }
        }
    }

    pub fn try_evaluate(&mut self, fragment: &str) -> Result<Outcome, EvalError> {
        let text = fragment.trim();
        if text.is_empty() {
            return Ok(Outcome::Nothing);
        }
        if text == SOFT_RESET {
            self.soft_reset();
            return Ok(Outcome::Reset(ResetKind::Soft));
        }
        if text == HARD_RESET {
            self.hard_reset()?;
            return Ok(Outcome::Reset(ResetKind::Hard));
        }

        let kind = classify(text);
        debug!(%kind, "classified fragment");
        match kind {
            FragmentKind::Import => self.import(text),
            FragmentKind::Class => self.define_classes(text),
            FragmentKind::Method => self.define_method(text),
            FragmentKind::StaticDeclaration => {
                let stripped = LEADING_MODIFIERS.replace(text, "");
                self.statement(&stripped)
            }
            FragmentKind::Expression => self.expression(text),
            FragmentKind::Statement => self.statement(text),
        }
    }

    /// Clear the entry routine; bindings keep their current values.
    pub fn soft_reset(&mut self) {
        splice::soft_reset(&mut self.service, &mut self.session);
    }

    /// Forget everything and delete staged artifacts.
    pub fn hard_reset(&mut self) -> Result<(), EvalError> {
        self.session.clear();
        self.service.discard_all()?;
        info!("session cleared");
        Ok(())
    }

    /// Release backend resources at the end of a session.
    pub fn shutdown(&mut self) -> Result<(), EvalError> {
        self.hard_reset()
    }

    // ── Fragment kinds ──────────────────────────────────────────────

    fn import(&mut self, text: &str) -> Result<Outcome, EvalError> {
        let record = ImportRecord::parse(text)?;
        if record.local {
            let source = self
                .session
                .unit(&record.symbol)
                .map(|u| u.source.clone())
                .ok_or_else(|| LoadError::NotCompiled(record.symbol.clone()))?;
            self.compile_unit(&record.symbol, source)?;
        }
        let outcome = Outcome::Imported {
            symbol: record.symbol.clone(),
            local: record.local,
        };
        if !self.session.add_import(record) {
            debug!("import already recorded");
        }
        Ok(outcome)
    }

    fn define_classes(&mut self, text: &str) -> Result<Outcome, EvalError> {
        let mut names = Vec::new();
        for chunk in split_classes(text) {
            let name = class_name(&chunk)?;
            if [ENTRY_UNIT, HOLDER_UNIT, EXPRESSION_UNIT, DYNAMIC_UNIT].contains(&name.as_str()) {
                return Err(EvalError::shape(
                    "class name not used by the session itself",
                    &name,
                ));
            }
            let prelude = prelude(
                self.session.imports(),
                self.session.unit(HOLDER_UNIT).is_some(),
                &name,
            );
            self.compile_unit(&name, class_unit(&prelude, &chunk))?;
            info!(class = %name, "class registered");
            names.push(name);
        }
        Ok(Outcome::Defined {
            kind: DefinitionKind::Class,
            names,
        })
    }

    fn define_method(&mut self, text: &str) -> Result<Outcome, EvalError> {
        let text = make_static(text);
        let (name, params) = method_signature(&text)?;
        let previous = self.session.methods().to_vec();
        self.session.upsert_method(MethodDef {
            name: name.clone(),
            params,
            text,
        });
        if let Err(err) = self.rebuild_holder() {
            self.session.set_methods(previous);
            if self.session.methods().is_empty() {
                self.service.discard(HOLDER_UNIT);
                self.session.remove_unit(HOLDER_UNIT);
            } else if let Err(restore) = self.rebuild_holder() {
                warn!(error = %restore, "could not restore the method holder");
            }
            return Err(err);
        }
        info!(method = %name, "method registered");
        Ok(Outcome::Defined {
            kind: DefinitionKind::Method,
            names: vec![name],
        })
    }

    fn expression(&mut self, text: &str) -> Result<Outcome, EvalError> {
        match self.produce(text)? {
            Produced::Value(value) => Ok(self.value_outcome(value)),
            Produced::Void => Ok(Outcome::Executed),
        }
    }

    fn statement(&mut self, text: &str) -> Result<Outcome, EvalError> {
        match statement_shape(text) {
            StatementShape::Control => {
                self.splice(RoutineEdit::Append {
                    statement: text.to_string(),
                    touches: None,
                })?;
                Ok(Outcome::Executed)
            }
            StatementShape::Declaration { ty, name, value } => self.declare(&ty, name, &value),
            StatementShape::Assignment { name } => {
                if self.session.binding(&name).is_none() {
                    return Err(EvalError::UndeclaredVariable(name));
                }
                self.splice(RoutineEdit::Append {
                    statement: text.to_string(),
                    touches: Some(name.clone()),
                })?;
                let value = self.current(&name);
                Ok(Outcome::Assigned {
                    rendered: self.service.render(&value),
                    name,
                    value,
                })
            }
            StatementShape::FieldWrite => {
                self.splice(RoutineEdit::Append {
                    statement: text.to_string(),
                    touches: None,
                })?;
                Ok(Outcome::Executed)
            }
            StatementShape::Unsupported { operator } => {
                debug!(%operator, "operator not folded");
                Err(EvalError::shape("supported assignment operator", text))
            }
            StatementShape::Call => self.call_statement(text),
            StatementShape::Expression => self.expression(text),
            StatementShape::Unrecognized => {
                warn!(
                    error = %EvalError::ClassificationAmbiguity(text.to_string()),
                    "running fragment as a one-off statement"
                );
                invoke::execute_statement(&mut self.service, &self.session, text)?;
                Ok(Outcome::Executed)
            }
        }
    }

    fn declare(&mut self, ty: &str, name: String, value_text: &str) -> Result<Outcome, EvalError> {
        let rhs = if value_text.starts_with('{') && ty.ends_with(']') {
            format!("new {}{}", ty, value_text)
        } else {
            value_text.to_string()
        };
        let value = match self.produce(&rhs)? {
            Produced::Value(v) => coerce(v, ty)?,
            Produced::Void => return Err(EvalError::mismatch(ty, "void")),
        };

        let edit = match self.session.binding(&name) {
            Some(existing) if existing.field_type() == field_type(ty, &value) => {
                // Re-declaration: keep the earlier statements' order and
                // assign after them.
                let literal = initializer(&value);
                let assigned = if literal == "null" && !value.is_null() {
                    rhs
                } else {
                    literal
                };
                RoutineEdit::Append {
                    statement: format!("{} = {};", name, assigned),
                    touches: Some(name.clone()),
                }
            }
            existing => {
                let fresh = existing.is_some();
                // Inside a running routine the baseline copy would lose any
                // aliasing with the routine's own arrays and objects.
                let running = self.session.routine().is_running();
                let assign = (!fresh && running && value.is_reference())
                    .then(|| format!("{} = {};", name, rhs));
                RoutineEdit::Declare {
                    binding: Binding::new(name.clone(), ty, value),
                    fresh,
                    assign,
                }
            }
        };
        self.splice(edit)?;

        let value = self.current(&name);
        Ok(Outcome::Declared {
            rendered: self.service.render(&value),
            name,
            value,
        })
    }

    fn call_statement(&mut self, text: &str) -> Result<Outcome, EvalError> {
        if let Some(site) = CallSite::parse(text) {
            if let Some(call) = invoke::dispatch(&self.service, &self.session, &site)? {
                return Ok(if call.returns_value() {
                    self.value_outcome(call.value)
                } else {
                    Outcome::Executed
                });
            }
        }
        debug!("no directly callable member, compiling the call");
        invoke::execute_statement(&mut self.service, &self.session, text)?;
        Ok(Outcome::Executed)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Evaluate a value-producing text: a construction, a dispatchable
    /// call, or any other expression.
    fn produce(&mut self, text: &str) -> Result<Produced, EvalError> {
        let text = text.trim().trim_end_matches(';').trim_end();
        if let Some(value) = invoke::construct(&self.service, &self.session, text)? {
            return Ok(Produced::Value(value));
        }
        if let Some(site) = CallSite::parse(text) {
            if let Some(call) = invoke::dispatch(&self.service, &self.session, &site)? {
                return Ok(if call.returns_value() {
                    Produced::Value(call.value)
                } else {
                    Produced::Void
                });
            }
        }
        invoke::evaluate_expression(&mut self.service, &self.session, text).map(Produced::Value)
    }

    fn splice(&mut self, edit: RoutineEdit) -> Result<(), EvalError> {
        splice::splice(&mut self.service, &mut self.session, edit)
    }

    fn rebuild_holder(&mut self) -> Result<(), EvalError> {
        let prelude = prelude(self.session.imports(), true, HOLDER_UNIT);
        let source = holder_unit(&prelude, self.session.bindings(), self.session.methods());
        self.compile_unit(HOLDER_UNIT, source)?;
        splice::seed_holder(&self.session)
    }

    /// Compile, load and register a unit under `name`.
    fn compile_unit(&mut self, name: &str, source: String) -> Result<(), EvalError> {
        debug!(unit = name, "compiling\n{}", source);
        self.service.compile(name, &source)?;
        let handle = self.service.load(name)?;
        let members = handle.members();
        self.session.register_unit(CompiledUnit {
            name: name.to_string(),
            source,
            handle,
            members,
        });
        Ok(())
    }

    fn current(&self, name: &str) -> Value {
        self.session
            .binding(name)
            .map(|b| b.value.clone())
            .unwrap_or(Value::Null)
    }

    fn value_outcome(&self, value: Value) -> Outcome {
        Outcome::Value {
            rendered: self.service.render(&value),
            value,
        }
    }
}
