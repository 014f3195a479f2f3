//! Session state: everything a REPL run has accumulated so far.

use crate::binding::{detach_all, Binding};
use crate::error::EvalError;
use jolt_core::{MemberSignature, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One `import` line the session has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// The import as entered, normalised to end with `;`.
    pub text: String,
    /// The imported path: `java.util.List`, `Methods.*`, `Point`.
    pub symbol: String,
    pub is_static: bool,
    /// Names a unit compiled in this session rather than a library.
    pub local: bool,
}

impl ImportRecord {
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        let trimmed = text.trim().trim_end_matches(';').trim();
        let rest = trimmed
            .strip_prefix("import")
            .filter(|r| r.starts_with(char::is_whitespace))
            .ok_or_else(|| EvalError::shape("import", text))?
            .trim();
        let (is_static, path) = match rest.strip_prefix("static") {
            Some(p) if p.starts_with(char::is_whitespace) => (true, p.trim()),
            _ => (false, rest),
        };
        if path.is_empty() {
            return Err(EvalError::shape("import", text));
        }
        let symbol: String = path.split_whitespace().collect();
        let prefix = if is_static { "import static" } else { "import" };
        Ok(Self {
            text: format!("{} {};", prefix, symbol),
            local: !is_static && !symbol.contains('.'),
            symbol,
            is_static,
        })
    }

    /// Library imports are replayed into every synthesized unit. Local
    /// imports are satisfied by the session's own units instead.
    pub fn is_external(&self) -> bool {
        !self.local
    }
}

/// A unit the build service has compiled and loaded for this session.
#[derive(Debug, Clone)]
pub struct CompiledUnit<H> {
    pub name: String,
    pub source: String,
    pub handle: H,
    pub members: Vec<MemberSignature>,
}

/// A method folded into the holder unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<String>,
    /// Declaration text, already made static.
    pub text: String,
}

/// Statements accumulated into the entry routine since it was started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryRoutine {
    /// Statement texts in the order they were entered.
    pub body: Vec<String>,
    /// Binding values as they were when the routine started (plus bindings
    /// declared since). The entry unit declares these before the body runs.
    /// Arrays and objects here are private copies, never the live values.
    pub baseline: BTreeMap<String, Binding>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Routine {
    #[default]
    Empty,
    Running(EntryRoutine),
}

impl Routine {
    pub fn is_running(&self) -> bool {
        matches!(self, Routine::Running(_))
    }

    pub fn body(&self) -> &[String] {
        match self {
            Routine::Empty => &[],
            Routine::Running(r) => &r.body,
        }
    }
}

/// The explicit, single-owner state of one REPL session.
#[derive(Debug)]
pub struct SessionState<H> {
    bindings: BTreeMap<String, Binding>,
    imports: Vec<ImportRecord>,
    units: BTreeMap<String, CompiledUnit<H>>,
    routine: Routine,
    methods: Vec<MethodDef>,
}

impl<H> Default for SessionState<H> {
    fn default() -> Self {
        Self {
            bindings: BTreeMap::new(),
            imports: Vec::new(),
            units: BTreeMap::new(),
            routine: Routine::Empty,
            methods: Vec::new(),
        }
    }
}

impl<H> SessionState<H> {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Bindings ──

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    /// Insert or replace; there is never more than one binding per name.
    pub fn put_binding(&mut self, binding: Binding) {
        self.bindings.insert(binding.name.clone(), binding);
    }

    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let binding = self
            .bindings
            .get_mut(name)
            .ok_or_else(|| EvalError::UndeclaredVariable(name.to_string()))?;
        binding.set_value(value);
        Ok(())
    }

    pub fn remove_binding(&mut self, name: &str) -> Option<Binding> {
        self.bindings.remove(name)
    }

    // ── Imports ──

    pub fn imports(&self) -> &[ImportRecord] {
        &self.imports
    }

    /// Returns false when the same import was already recorded.
    pub fn add_import(&mut self, record: ImportRecord) -> bool {
        if self.imports.iter().any(|r| r.text == record.text) {
            return false;
        }
        self.imports.push(record);
        true
    }

    // ── Units ──

    pub fn unit(&self, name: &str) -> Option<&CompiledUnit<H>> {
        self.units.get(name)
    }

    pub fn units(&self) -> impl Iterator<Item = &CompiledUnit<H>> {
        self.units.values()
    }

    /// Register a unit, replacing any earlier revision and its members.
    pub fn register_unit(&mut self, unit: CompiledUnit<H>) {
        self.units.insert(unit.name.clone(), unit);
    }

    pub fn remove_unit(&mut self, name: &str) -> Option<CompiledUnit<H>> {
        self.units.remove(name)
    }

    // ── Entry routine ──

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn set_routine(&mut self, routine: Routine) {
        self.routine = routine;
    }

    /// Move `Empty -> Running`, snapshotting deep copies of the current
    /// bindings as the routine's baseline. Does nothing when already running.
    pub fn start_routine(&mut self) {
        if let Routine::Empty = self.routine {
            let baseline = detach_all(self.bindings.values())
                .into_iter()
                .map(|b| (b.name.clone(), b))
                .collect();
            self.routine = Routine::Running(EntryRoutine {
                body: Vec::new(),
                baseline,
            });
        }
    }

    pub fn routine_mut(&mut self) -> Option<&mut EntryRoutine> {
        match &mut self.routine {
            Routine::Running(r) => Some(r),
            Routine::Empty => None,
        }
    }

    /// Append a statement to the routine body, starting the routine first.
    pub fn push_statement(&mut self, statement: impl Into<String>) {
        self.start_routine();
        if let Some(routine) = self.routine_mut() {
            routine.body.push(statement.into());
        }
    }

    // ── Methods ──

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub fn set_methods(&mut self, methods: Vec<MethodDef>) {
        self.methods = methods;
    }

    /// Add a method, replacing one with the same name and parameter types.
    pub fn upsert_method(&mut self, method: MethodDef) {
        match self
            .methods
            .iter()
            .position(|m| m.name == method.name && m.params == method.params)
        {
            Some(i) => self.methods[i] = method,
            None => self.methods.push(method),
        }
    }

    // ── Resets ──

    /// Forget the accumulated routine body; everything else stays.
    pub fn soft_reset(&mut self) {
        self.routine = Routine::Empty;
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
        self.imports.clear();
        self.units.clear();
        self.routine = Routine::Empty;
        self.methods.clear();
    }

    /// Human-readable dump used in failure reports and `:state`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "imports:");
        for import in &self.imports {
            let tag = if import.local { " (local)" } else { "" };
            let _ = writeln!(out, "  {}{}", import.text, tag);
        }
        let _ = writeln!(out, "bindings:");
        for binding in self.bindings.values() {
            let _ = writeln!(
                out,
                "  {} {} = {}",
                binding.field_type(),
                binding.name,
                binding.value
            );
        }
        let _ = writeln!(out, "units:");
        for unit in self.units.values() {
            let _ = writeln!(out, "  {}", unit.name);
            for member in &unit.members {
                let _ = writeln!(out, "    {}", member);
            }
        }
        match &self.routine {
            Routine::Empty => {
                let _ = writeln!(out, "routine: (empty)");
            }
            Routine::Running(r) => {
                let _ = writeln!(out, "routine:");
                for statement in &r.body {
                    let _ = writeln!(out, "  {}", statement);
                }
            }
        }
        let _ = writeln!(out, "methods:");
        for method in &self.methods {
            let _ = writeln!(out, "  {}({})", method.name, method.params.join(", "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type State = SessionState<()>;

    #[test]
    fn one_binding_per_name() {
        let mut state = State::new();
        state.put_binding(Binding::new("x", "int", Value::Int(5)));
        state.put_binding(Binding::new("x", "int", Value::Int(5)));
        assert_eq!(state.bindings().count(), 1);
        assert_eq!(state.binding("x").map(|b| b.value.clone()), Some(Value::Int(5)));
    }

    #[test]
    fn assigning_unknown_names_fails() {
        let mut state = State::new();
        assert_eq!(
            state.set_value("y", Value::Int(1)),
            Err(EvalError::UndeclaredVariable("y".into()))
        );
        assert_eq!(state.bindings().count(), 0);
    }

    #[test]
    fn imports_are_idempotent() {
        let mut state = State::new();
        let record = ImportRecord::parse("import java.util.List;").unwrap();
        assert!(state.add_import(record.clone()));
        assert!(!state.add_import(ImportRecord::parse("import  java.util.List ;").unwrap()));
        assert_eq!(state.imports().len(), 1);
        assert!(record.is_external());
    }

    #[test]
    fn import_parsing() {
        let local = ImportRecord::parse("import Point;").unwrap();
        assert!(local.local);
        assert_eq!(local.symbol, "Point");

        let stat = ImportRecord::parse("import static java.lang.Math.*;").unwrap();
        assert!(stat.is_static);
        assert_eq!(stat.text, "import static java.lang.Math.*;");

        assert!(ImportRecord::parse("import ;").is_err());
        assert!(ImportRecord::parse("imports x;").is_err());
    }

    #[test]
    fn routine_lifecycle() {
        let mut state = State::new();
        state.put_binding(Binding::new("a", "int", Value::Int(1)));
        state.push_statement("a = a + 1;");
        state.push_statement("a = a * 10;");
        assert_eq!(state.routine().body(), ["a = a + 1;", "a = a * 10;"]);

        state.soft_reset();
        assert!(!state.routine().is_running());
        assert!(state.binding("a").is_some());

        state.clear();
        assert!(state.binding("a").is_none());
    }

    #[test]
    fn baseline_does_not_share_arrays_with_bindings() {
        let mut state = State::new();
        let xs = Value::array("int", vec![Value::Int(1)]);
        state.put_binding(Binding::new("xs", "int[]", xs.clone()));
        state.put_binding(Binding::new("ys", "int[]", xs.clone()));
        state.start_routine();

        let Routine::Running(routine) = state.routine() else {
            panic!("routine should be running");
        };
        let (bx, by) = (&routine.baseline["xs"].value, &routine.baseline["ys"].value);
        assert_ne!(bx, &xs);
        assert_eq!(bx, by);
    }

    #[test]
    fn methods_replace_by_signature() {
        let mut state = State::new();
        let def = |params: &[&str], text: &str| MethodDef {
            name: "f".into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            text: text.into(),
        };
        state.upsert_method(def(&["int"], "static int f(int a) { return a; }"));
        state.upsert_method(def(&["double"], "static double f(double a) { return a; }"));
        state.upsert_method(def(&["int"], "static int f(int a) { return -a; }"));
        assert_eq!(state.methods().len(), 2);
        assert!(state.methods()[0].text.contains("-a"));
    }

    #[test]
    fn render_lists_every_category() {
        let mut state = State::new();
        state.put_binding(Binding::new("x", "var", Value::Int(6)));
        state.add_import(ImportRecord::parse("import java.util.List;").unwrap());
        state.push_statement("x = x + 1;");
        let dump = state.render();
        assert!(dump.contains("import java.util.List;"));
        assert!(dump.contains("int x = 6"));
        assert!(dump.contains("x = x + 1;"));
    }
}
