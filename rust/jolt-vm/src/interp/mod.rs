//! Tree-walking execution of loaded classes.
//!
//! The [`Runtime`] owns every loaded class, the static field storage for
//! each of them, and the output streams `System.out` and `System.err` write
//! to. Execution is fully synchronous; a method call runs to completion
//! before control returns to the caller.

mod builtins;
mod ops;

pub use builtins::is_builtin_class;

use crate::ast::*;
use jolt_core::values::{is_primitive, shape_assignable, ArrayRef, Instance, ObjectRef, Value};
use jolt_core::{InvokeError, MemberSignature, CONSTRUCTOR};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::rc::Rc;
use thiserror::Error;

/// Nested calls deeper than this raise `StackOverflowError`.
pub const MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("{exception}: {message}")]
    Exception { exception: String, message: String },
    #[error("cannot find symbol '{name}'")]
    Unresolved { name: String },
    #[error("no member '{member}' in '{class}' accepts ({shapes})")]
    NoSuchMember {
        class: String,
        member: String,
        shapes: String,
    },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
}

impl RuntimeError {
    pub fn exception(exception: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Exception {
            exception: exception.into(),
            message: message.into(),
        }
    }

    fn null_pointer(what: &str) -> Self {
        RuntimeError::exception(
            "java.lang.NullPointerException",
            format!("cannot {} because value is null", what),
        )
    }

    fn no_such_member(class: &str, member: &str, shapes: &[String]) -> Self {
        RuntimeError::NoSuchMember {
            class: class.to_string(),
            member: member.to_string(),
            shapes: shapes.join(", "),
        }
    }
}

impl From<RuntimeError> for InvokeError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Exception { exception, message } => {
                InvokeError::Exception { exception, message }
            }
            RuntimeError::Unresolved { name } => InvokeError::Unresolved { name },
            RuntimeError::NoSuchMember {
                class,
                member,
                shapes,
            } => InvokeError::MemberNotFound {
                class,
                member,
                shapes,
            },
            RuntimeError::TypeMismatch { expected, found } => {
                InvokeError::TypeMismatch { expected, found }
            }
        }
    }
}

// ── Loaded classes ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticImport {
    /// `import static C.*;`
    All(String),
    /// `import static C.member;`
    Member(String, String),
}

impl StaticImport {
    pub fn from_decl(decl: &ImportDecl) -> Option<Self> {
        if !decl.is_static {
            return None;
        }
        let mut segments = decl.path.rsplit('.');
        if decl.wildcard {
            segments.next().map(|c| StaticImport::All(c.to_string()))
        } else {
            let member = segments.next()?;
            let class = segments.next()?;
            Some(StaticImport::Member(class.to_string(), member.to_string()))
        }
    }
}

#[derive(Debug)]
pub struct ClassInfo {
    pub decl: ClassDecl,
    pub unit: String,
    pub static_imports: Vec<StaticImport>,
}

pub fn signature(method: &MethodDecl) -> MemberSignature {
    MemberSignature {
        name: method.name.clone(),
        params: method.params.iter().map(|p| p.ty.to_string()).collect(),
        ret: method.ret.to_string(),
        is_static: method.modifiers.is_static,
    }
}

fn constructor_signature(params: &[Param]) -> MemberSignature {
    MemberSignature {
        name: CONSTRUCTOR.to_string(),
        params: params.iter().map(|p| p.ty.to_string()).collect(),
        ret: "void".to_string(),
        is_static: false,
    }
}

// ── Frames ──────────────────────────────────────────────────────────

struct Local {
    ty: String,
    value: Value,
}

struct Frame {
    class: Rc<ClassInfo>,
    this: Option<ObjectRef>,
    scopes: Vec<HashMap<String, Local>>,
}

impl Frame {
    fn new(class: Rc<ClassInfo>, this: Option<ObjectRef>) -> Self {
        Self {
            class,
            this,
            scopes: vec![HashMap::new()],
        }
    }

    fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Local> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }

    fn declare(&mut self, name: &str, ty: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Local { ty, value });
        }
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Where a name resolves to.
enum Place {
    Local,
    Field(ObjectRef),
    Static(String),
    Library(String),
}

enum LValue {
    Local(String),
    Field(ObjectRef, String),
    Static(String, String),
    Element(ArrayRef, usize),
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => Value::Int(*n),
        Literal::Long(n) => Value::Long(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::Double(f) => Value::Double(*f),
        Literal::Char(c) => Value::Char(*c),
        Literal::Str(s) => Value::string(s),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn shapes_of(values: &[Value]) -> Vec<String> {
    values.iter().map(Value::shape).collect()
}

// ── Runtime ─────────────────────────────────────────────────────────

pub struct Runtime {
    classes: BTreeMap<String, Rc<ClassInfo>>,
    statics: HashMap<String, BTreeMap<String, Value>>,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    next_id: u64,
    depth: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }
}

impl Runtime {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            classes: BTreeMap::new(),
            statics: HashMap::new(),
            out,
            err,
            next_id: 0,
            depth: 0,
        }
    }

    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    pub fn set_error_output(&mut self, err: Box<dyn Write>) {
        self.err = err;
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &String> {
        self.classes.keys()
    }

    /// Register every class of a unit, replacing classes of the same names,
    /// and run their static initializers in declaration order.
    pub fn install(&mut self, unit: &str, cu: &CompilationUnit) -> Result<(), RuntimeError> {
        self.uninstall(unit);
        let imports: Vec<StaticImport> = cu
            .imports
            .iter()
            .filter_map(StaticImport::from_decl)
            .collect();
        for class in &cu.classes {
            self.statics.remove(&class.name);
            self.classes.insert(
                class.name.clone(),
                Rc::new(ClassInfo {
                    decl: class.clone(),
                    unit: unit.to_string(),
                    static_imports: imports.clone(),
                }),
            );
        }
        for class in &cu.classes {
            self.initialize_statics(&class.name)?;
        }
        self.flush();
        Ok(())
    }

    pub fn uninstall(&mut self, unit: &str) {
        let names: Vec<String> = self
            .classes
            .values()
            .filter(|c| c.unit == unit)
            .map(|c| c.decl.name.clone())
            .collect();
        for name in names {
            self.classes.remove(&name);
            self.statics.remove(&name);
        }
    }

    pub fn clear(&mut self) {
        self.classes.clear();
        self.statics.clear();
    }

    fn initialize_statics(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(info) = self.classes.get(name).cloned() else {
            return Ok(());
        };
        let defaults = info
            .decl
            .static_fields()
            .map(|f| (f.name.clone(), ops::default_value(&f.ty.to_string())))
            .collect();
        self.statics.insert(name.to_string(), defaults);

        let mut frame = Frame::new(info.clone(), None);
        for field in info.decl.static_fields() {
            if let Some(init) = &field.init {
                let value = self.eval(&mut frame, init)?;
                let value = self.coerce(&field.ty.to_string(), value)?;
                self.statics
                    .entry(name.to_string())
                    .or_default()
                    .insert(field.name.clone(), value);
            }
        }
        Ok(())
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
        let _ = self.err.flush();
    }

    // ── Hierarchy ──

    /// The class followed by its loaded ancestors.
    fn chain(&self, name: &str) -> Vec<Rc<ClassInfo>> {
        let mut out: Vec<Rc<ClassInfo>> = Vec::new();
        let mut next = self.classes.get(name).cloned();
        while let Some(info) = next {
            if out.iter().any(|c| c.decl.name == info.decl.name) {
                break;
            }
            next = info
                .decl
                .superclass
                .as_ref()
                .and_then(|s| self.classes.get(s).cloned());
            out.push(info);
        }
        out
    }

    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        sub == sup
            || sup == "Object"
            || self
                .chain(sub)
                .iter()
                .any(|c| c.decl.name == sup || c.decl.superclass.as_deref() == Some(sup))
    }

    pub fn assignable(&self, target: &str, shape: &str) -> bool {
        shape_assignable(target, shape) || self.is_subclass(shape, target)
    }

    fn applicable(&self, params: &[Param], shapes: &[String]) -> Option<usize> {
        if params.len() != shapes.len() {
            return None;
        }
        let mut exact = 0;
        for (param, shape) in params.iter().zip(shapes) {
            let ty = param.ty.to_string();
            if ty == *shape {
                exact += 1;
            } else if !self.assignable(&ty, shape) {
                return None;
            }
        }
        Some(exact)
    }

    fn find_method(
        &self,
        class: &str,
        name: &str,
        shapes: &[String],
        include_private: bool,
    ) -> Option<(Rc<ClassInfo>, usize)> {
        for info in self.chain(class) {
            let mut best: Option<(usize, usize)> = None;
            for (i, m) in info.decl.methods.iter().enumerate() {
                if m.name != name || m.body.is_none() {
                    continue;
                }
                if m.modifiers.is_private && !include_private {
                    continue;
                }
                if let Some(score) = self.applicable(&m.params, shapes) {
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((i, score));
                    }
                }
            }
            if let Some((i, _)) = best {
                return Some((info, i));
            }
        }
        None
    }

    fn find_exact(&self, class: &str, member: &MemberSignature) -> Option<(Rc<ClassInfo>, usize)> {
        self.chain(class).into_iter().find_map(|info| {
            info.decl
                .methods
                .iter()
                .position(|m| m.body.is_some() && signature(m) == *member)
                .map(|i| (info.clone(), i))
        })
    }

    fn find_constructor(&self, info: &ClassInfo, shapes: &[String]) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, c) in info.decl.constructors.iter().enumerate() {
            if let Some(score) = self.applicable(&c.params, shapes) {
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((i, score));
                }
            }
        }
        best.map(|(i, _)| i)
    }

    fn static_owner(&self, class: &str, field: &str) -> Option<Rc<ClassInfo>> {
        self.chain(class)
            .into_iter()
            .find(|c| c.decl.static_fields().any(|f| f.name == field))
    }

    fn field_type(&self, class: &str, field: &str) -> String {
        self.chain(class)
            .iter()
            .find_map(|c| {
                c.decl
                    .fields
                    .iter()
                    .find(|f| f.name == field)
                    .map(|f| f.ty.to_string())
            })
            .unwrap_or_else(|| "Object".to_string())
    }

    // ── Public surface used by class handles ──

    /// Declared, non-private members of one class.
    pub fn members(&self, class: &str) -> Vec<MemberSignature> {
        let Some(info) = self.classes.get(class) else {
            return Vec::new();
        };
        let mut out: Vec<MemberSignature> = info
            .decl
            .constructors
            .iter()
            .filter(|c| !c.modifiers.is_private)
            .map(|c| constructor_signature(&c.params))
            .collect();
        if info.decl.constructors.is_empty() && !info.decl.modifiers.is_abstract {
            out.push(constructor_signature(&[]));
        }
        out.extend(
            info.decl
                .methods
                .iter()
                .filter(|m| !m.modifiers.is_private)
                .map(signature),
        );
        out
    }

    pub fn select(&self, class: &str, name: &str, shapes: &[String]) -> Option<MemberSignature> {
        if name == CONSTRUCTOR {
            let info = self.classes.get(class)?;
            if info.decl.constructors.is_empty() {
                return shapes.is_empty().then(|| constructor_signature(&[]));
            }
            let idx = self.find_constructor(info, shapes)?;
            return Some(constructor_signature(&info.decl.constructors[idx].params));
        }
        self.find_method(class, name, shapes, false)
            .map(|(info, i)| signature(&info.decl.methods[i]))
    }

    pub fn invoke(
        &mut self,
        class: &str,
        member: &MemberSignature,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if member.is_constructor() {
            return self.construct(class, args);
        }
        let missing = || RuntimeError::no_such_member(class, &member.name, &member.params);
        let result = if member.is_static {
            let (owner, idx) = self.find_exact(class, member).ok_or_else(missing)?;
            self.call(owner, idx, None, args.to_vec())
        } else {
            let obj = match receiver {
                Some(Value::Object(o)) => o.clone(),
                Some(Value::Null) | None => {
                    return Err(RuntimeError::null_pointer(&format!("invoke {}()", member.name)))
                }
                Some(other) => {
                    return Err(RuntimeError::TypeMismatch {
                        expected: class.to_string(),
                        found: other.shape(),
                    })
                }
            };
            let runtime_class = obj.borrow().class_name.clone();
            let (owner, idx) = self
                .find_exact(&runtime_class, member)
                .or_else(|| self.find_exact(class, member))
                .ok_or_else(missing)?;
            self.call(owner, idx, Some(obj), args.to_vec())
        };
        self.flush();
        result
    }

    pub fn construct(&mut self, class: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let result = self.instantiate(class, args.to_vec());
        self.flush();
        result
    }

    pub fn get_static(&self, class: &str, field: &str) -> Option<Value> {
        let owner = self.static_owner(class, field)?;
        self.statics.get(&owner.decl.name)?.get(field).cloned()
    }

    pub fn set_static(
        &mut self,
        class: &str,
        field: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let owner = self
            .static_owner(class, field)
            .ok_or_else(|| RuntimeError::Unresolved {
                name: format!("{}.{}", class, field),
            })?;
        let ty = self.field_type(&owner.decl.name, field);
        let value = self.coerce(&ty, value)?;
        self.statics
            .entry(owner.decl.name.clone())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    /// Display text of a value, calling a user `toString()` when present.
    pub fn render(&mut self, value: &Value) -> Result<String, RuntimeError> {
        let Value::Object(obj) = value else {
            return Ok(value.to_string());
        };
        let class = obj.borrow().class_name.clone();
        if let Some((owner, idx)) = self.find_method(&class, "toString", &[], false) {
            let text = self.call(owner, idx, Some(obj.clone()), Vec::new())?;
            return Ok(text.to_string());
        }
        let message = obj.borrow().fields.get("message").cloned();
        match message {
            Some(Value::Str(msg)) if self.is_throwable_instance(&class) => {
                Ok(format!("{}: {}", class, msg))
            }
            _ => Ok(value.to_string()),
        }
    }

    fn is_throwable_instance(&self, class: &str) -> bool {
        builtins::is_throwable(class)
            || self
                .chain(class)
                .iter()
                .any(|c| c.decl.superclass.as_deref().is_some_and(builtins::is_throwable))
    }

    // ── Calls ──

    fn enter(&mut self) -> Result<(), RuntimeError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::exception(
                "java.lang.StackOverflowError",
                format!("call depth exceeded {}", MAX_CALL_DEPTH),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn call(
        &mut self,
        owner: Rc<ClassInfo>,
        idx: usize,
        this: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let method = &owner.decl.methods[idx];
        let Some(body) = &method.body else {
            return Err(RuntimeError::exception(
                "java.lang.AbstractMethodError",
                format!("{}.{}", owner.decl.name, method.name),
            ));
        };
        if method.params.len() != args.len() {
            return Err(RuntimeError::no_such_member(
                &owner.decl.name,
                &method.name,
                &shapes_of(&args),
            ));
        }
        let this = if method.modifiers.is_static { None } else { this };
        let mut frame = Frame::new(owner.clone(), this);
        for (param, arg) in method.params.iter().zip(args) {
            let ty = param.ty.to_string();
            let value = self.coerce(&ty, arg)?;
            frame.declare(&param.name, ty, value);
        }

        self.enter()?;
        let flow = self.exec_block(&mut frame, body);
        self.depth -= 1;

        match flow? {
            Flow::Return(v) if !method.ret.is_void() => self.coerce(&method.ret.to_string(), v),
            _ => Ok(Value::Null),
        }
    }

    fn eval_args(&mut self, frame: &mut Frame, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|a| self.eval(frame, a)).collect()
    }

    fn eval_call(
        &mut self,
        frame: &mut Frame,
        target: Option<&Expr>,
        name: &str,
        args: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let Some(target) = target else {
            let values = self.eval_args(frame, args)?;
            return self.call_unqualified(frame, name, values);
        };

        if let Expr::Field(base, stream) = target {
            if (stream == "out" || stream == "err")
                && self.class_ref(frame, base).as_deref() == Some("System")
            {
                let values = self.eval_args(frame, args)?;
                return self.print(stream == "err", name, &values);
            }
        }

        if let Some(class) = self.class_ref(frame, target) {
            let values = self.eval_args(frame, args)?;
            return self.call_static(&class, name, values);
        }

        let receiver = self.eval(frame, target)?;
        let values = self.eval_args(frame, args)?;
        self.call_on_value(&receiver, name, values)
    }

    fn call_unqualified(
        &mut self,
        frame: &Frame,
        name: &str,
        values: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let shapes = shapes_of(&values);
        let class = frame.class.clone();

        if let Some((owner, idx)) = self.find_method(&class.decl.name, name, &shapes, true) {
            if owner.decl.methods[idx].modifiers.is_static {
                return self.call(owner, idx, None, values);
            }
            let Some(this) = frame.this.clone() else {
                return Err(RuntimeError::exception(
                    "java.lang.IllegalStateException",
                    format!(
                        "non-static method {}() cannot be referenced from a static context",
                        name
                    ),
                ));
            };
            let runtime_class = this.borrow().class_name.clone();
            let (owner, idx) = self
                .find_method(&runtime_class, name, &shapes, true)
                .unwrap_or((owner, idx));
            return self.call(owner, idx, Some(this), values);
        }

        for import in &class.static_imports {
            let imported = match import {
                StaticImport::All(c) => c,
                StaticImport::Member(c, m) if m == name => c,
                StaticImport::Member(..) => continue,
            };
            if let Some((owner, idx)) = self.find_method(imported, name, &shapes, false) {
                if owner.decl.methods[idx].modifiers.is_static {
                    return self.call(owner, idx, None, values);
                }
            }
            if let Some(result) = builtins::call_static(imported, name, &values) {
                return result;
            }
        }

        Err(RuntimeError::Unresolved {
            name: format!("{}({})", name, shapes.join(", ")),
        })
    }

    fn call_static(
        &mut self,
        class: &str,
        name: &str,
        values: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let shapes = shapes_of(&values);
        if self.has_class(class) {
            return match self.find_method(class, name, &shapes, false) {
                Some((owner, idx)) if owner.decl.methods[idx].modifiers.is_static => {
                    self.call(owner, idx, None, values)
                }
                Some(_) => Err(RuntimeError::exception(
                    "java.lang.IllegalStateException",
                    format!("non-static method {}.{}() called statically", class, name),
                )),
                None => Err(RuntimeError::no_such_member(class, name, &shapes)),
            };
        }
        match (class, name, values.as_slice()) {
            ("String", "valueOf", [v])
            | ("Integer", "toString", [v])
            | ("Objects", "toString", [v]) => {
                return Ok(Value::string(self.render(v)?))
            }
            _ => {}
        }
        builtins::call_static(class, name, &values)
            .unwrap_or_else(|| Err(RuntimeError::no_such_member(class, name, &shapes)))
    }

    fn call_on_value(
        &mut self,
        receiver: &Value,
        name: &str,
        values: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let shapes = shapes_of(&values);
        match receiver {
            Value::Null => Err(RuntimeError::null_pointer(&format!("invoke \"{}()\"", name))),
            Value::Str(s) => builtins::string_method(s, name, &values)
                .unwrap_or_else(|| Err(RuntimeError::no_such_member("String", name, &shapes))),
            Value::Object(obj) => {
                let class = obj.borrow().class_name.clone();
                if let Some((owner, idx)) = self.find_method(&class, name, &shapes, true) {
                    return self.call(owner, idx, Some(obj.clone()), values);
                }
                self.object_method(receiver, obj, name, &values)
            }
            Value::Array(arr) if name == "clone" && values.is_empty() => {
                let arr = arr.borrow();
                Ok(Value::array(arr.elem_type.clone(), arr.items.clone()))
            }
            other => Err(RuntimeError::TypeMismatch {
                expected: "an object receiver".into(),
                found: other.shape(),
            }),
        }
    }

    /// Methods every object has without declaring them.
    fn object_method(
        &mut self,
        receiver: &Value,
        obj: &ObjectRef,
        name: &str,
        values: &[Value],
    ) -> Result<Value, RuntimeError> {
        match (name, values) {
            ("equals", [other]) => Ok(Value::Bool(receiver.same(other))),
            ("hashCode", []) => Ok(Value::Int(obj.borrow().id as i32)),
            ("toString", []) => Ok(Value::string(receiver.to_string())),
            ("getMessage", []) => Ok(obj
                .borrow()
                .fields
                .get("message")
                .cloned()
                .unwrap_or(Value::Null)),
            _ => {
                let class = obj.borrow().class_name.clone();
                Err(RuntimeError::no_such_member(&class, name, &shapes_of(values)))
            }
        }
    }

    fn print(&mut self, to_err: bool, name: &str, values: &[Value]) -> Result<Value, RuntimeError> {
        let text = match (name, values) {
            ("println", []) => "\n".to_string(),
            ("println", [v]) => format!("{}\n", self.render(v)?),
            ("print", [v]) => self.render(v)?,
            _ => {
                return Err(RuntimeError::no_such_member(
                    "PrintStream",
                    name,
                    &shapes_of(values),
                ))
            }
        };
        let stream = if to_err { &mut self.err } else { &mut self.out };
        stream
            .write_all(text.as_bytes())
            .map_err(|e| RuntimeError::exception("java.io.IOException", e.to_string()))?;
        Ok(Value::Null)
    }

    // ── Objects ──

    fn next_identity(&mut self) -> u64 {
        self.next_id += 1;
        // Spread identities so printed references look like hash codes.
        self.next_id.wrapping_mul(0x9E37_79B1) & 0x7fff_ffff
    }

    fn instantiate(&mut self, class: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if let Some(info) = self.classes.get(class).cloned() {
            if info.decl.modifiers.is_abstract {
                return Err(RuntimeError::exception(
                    "java.lang.InstantiationException",
                    format!("{} is abstract; cannot be instantiated", class),
                ));
            }
            let mut fields = BTreeMap::new();
            let chain = self.chain(class);
            for ancestor in chain.iter().rev() {
                if ancestor.decl.superclass.as_deref().is_some_and(builtins::is_throwable) {
                    fields.insert("message".to_string(), Value::Null);
                }
                for field in ancestor.decl.instance_fields() {
                    fields.insert(field.name.clone(), ops::default_value(&field.ty.to_string()));
                }
            }
            let id = self.next_identity();
            let obj = Rc::new(RefCell::new(Instance {
                class_name: class.to_string(),
                fields,
                id,
            }));
            self.run_constructor(info, &obj, args)?;
            return Ok(Value::Object(obj));
        }

        if class == "Object" || builtins::is_throwable(class) {
            let mut fields = BTreeMap::new();
            if class != "Object" {
                let message = match args.first() {
                    Some(v) if !v.is_null() => Value::string(self.render(v)?),
                    _ => Value::Null,
                };
                fields.insert("message".to_string(), message);
            }
            let id = self.next_identity();
            return Ok(Value::object(Instance {
                class_name: class.to_string(),
                fields,
                id,
            }));
        }
        if class == "String" {
            return match args.as_slice() {
                [] => Ok(Value::string("")),
                [v @ Value::Str(_)] => Ok(v.clone()),
                _ => Err(RuntimeError::no_such_member("String", CONSTRUCTOR, &shapes_of(&args))),
            };
        }
        Err(RuntimeError::Unresolved {
            name: class.to_string(),
        })
    }

    fn run_constructor(
        &mut self,
        info: Rc<ClassInfo>,
        obj: &ObjectRef,
        args: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        let shapes = shapes_of(&args);
        if info.decl.constructors.is_empty() {
            if !args.is_empty() {
                return Err(RuntimeError::no_such_member(&info.decl.name, CONSTRUCTOR, &shapes));
            }
            self.run_super(&info, obj, Vec::new())?;
            return self.init_instance_fields(&info, obj);
        }

        let idx = self
            .find_constructor(&info, &shapes)
            .ok_or_else(|| RuntimeError::no_such_member(&info.decl.name, CONSTRUCTOR, &shapes))?;
        let ctor = &info.decl.constructors[idx];
        let mut frame = Frame::new(info.clone(), Some(obj.clone()));
        for (param, arg) in ctor.params.iter().zip(args) {
            let ty = param.ty.to_string();
            let value = self.coerce(&ty, arg)?;
            frame.declare(&param.name, ty, value);
        }

        self.enter()?;
        let result = self.run_constructor_body(&info, obj, &mut frame, &ctor.body);
        self.depth -= 1;
        result
    }

    fn run_constructor_body(
        &mut self,
        info: &Rc<ClassInfo>,
        obj: &ObjectRef,
        frame: &mut Frame,
        body: &[Stmt],
    ) -> Result<(), RuntimeError> {
        let rest = match body.first() {
            Some(Stmt::ThisCall(args)) => {
                let values = self.eval_args(frame, args)?;
                self.run_constructor(info.clone(), obj, values)?;
                &body[1..]
            }
            Some(Stmt::SuperCall(args)) => {
                let values = self.eval_args(frame, args)?;
                self.run_super(info, obj, values)?;
                self.init_instance_fields(info, obj)?;
                &body[1..]
            }
            _ => {
                self.run_super(info, obj, Vec::new())?;
                self.init_instance_fields(info, obj)?;
                body
            }
        };
        for stmt in rest {
            if let Flow::Return(_) = self.exec(frame, stmt)? {
                break;
            }
        }
        Ok(())
    }

    fn run_super(
        &mut self,
        info: &ClassInfo,
        obj: &ObjectRef,
        args: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        match info.decl.superclass.as_deref() {
            Some(sup) if self.has_class(sup) => {
                let sup_info = self.classes.get(sup).cloned();
                match sup_info {
                    Some(sup_info) => self.run_constructor(sup_info, obj, args),
                    None => Ok(()),
                }
            }
            Some(sup) if builtins::is_throwable(sup) => {
                let message = match args.first() {
                    Some(v) if !v.is_null() => Value::string(self.render(v)?),
                    _ => Value::Null,
                };
                obj.borrow_mut().fields.insert("message".to_string(), message);
                Ok(())
            }
            _ if args.is_empty() => Ok(()),
            _ => Err(RuntimeError::no_such_member("Object", CONSTRUCTOR, &shapes_of(&args))),
        }
    }

    fn init_instance_fields(
        &mut self,
        info: &Rc<ClassInfo>,
        obj: &ObjectRef,
    ) -> Result<(), RuntimeError> {
        let mut frame = Frame::new(info.clone(), Some(obj.clone()));
        for field in info.decl.instance_fields() {
            if let Some(init) = &field.init {
                let value = self.eval(&mut frame, init)?;
                let value = self.coerce(&field.ty.to_string(), value)?;
                obj.borrow_mut().fields.insert(field.name.clone(), value);
            }
        }
        Ok(())
    }

    fn make_array(&self, elem: &str, sizes: &[usize], extra_dims: usize) -> Value {
        if sizes.is_empty() {
            return Value::Null;
        }
        let below = sizes.len() - 1 + extra_dims;
        let elem_type = format!("{}{}", elem, "[]".repeat(below));
        let items = (0..sizes[0])
            .map(|_| {
                if sizes.len() > 1 {
                    self.make_array(elem, &sizes[1..], extra_dims)
                } else if extra_dims > 0 {
                    Value::Null
                } else {
                    ops::default_value(elem)
                }
            })
            .collect();
        Value::array(elem_type, items)
    }

    // ── Conversions ──

    /// Assignment conversion to a declared type.
    fn coerce(&self, ty: &str, value: Value) -> Result<Value, RuntimeError> {
        if ty == "var" {
            return Ok(value);
        }
        if is_primitive(ty) {
            return ops::convert(ty, value);
        }
        if value.is_null() || self.assignable(ty, &value.shape()) {
            return Ok(value);
        }
        Err(RuntimeError::TypeMismatch {
            expected: ty.to_string(),
            found: value.shape(),
        })
    }

    fn cast(&self, ty: &TypeRef, value: Value) -> Result<Value, RuntimeError> {
        let name = ty.to_string();
        if is_primitive(&name) {
            return ops::convert(&name, value);
        }
        if value.is_null() || self.assignable(&name, &value.shape()) {
            return Ok(value);
        }
        Err(RuntimeError::exception(
            "java.lang.ClassCastException",
            format!("{} cannot be cast to {}", value.shape(), name),
        ))
    }

    fn throwable(&mut self, value: Value) -> RuntimeError {
        match &value {
            Value::Object(obj) => {
                let class = obj.borrow().class_name.clone();
                let message = obj.borrow().fields.get("message").cloned();
                let message = match message {
                    Some(Value::Null) | None => String::new(),
                    Some(v) => v.to_string(),
                };
                RuntimeError::Exception {
                    exception: class,
                    message,
                }
            }
            Value::Null => RuntimeError::null_pointer("throw"),
            other => RuntimeError::TypeMismatch {
                expected: "Throwable".into(),
                found: other.shape(),
            },
        }
    }

    // ── Names ──

    fn resolve_name(&self, frame: &Frame, name: &str) -> Option<Place> {
        if frame.lookup(name).is_some() {
            return Some(Place::Local);
        }
        if let Some(this) = &frame.this {
            if this.borrow().fields.contains_key(name) {
                return Some(Place::Field(this.clone()));
            }
        }
        if let Some(owner) = self.static_owner(&frame.class.decl.name, name) {
            return Some(Place::Static(owner.decl.name.clone()));
        }
        for import in &frame.class.static_imports {
            let class = match import {
                StaticImport::All(c) => c,
                StaticImport::Member(c, m) if m == name => c,
                StaticImport::Member(..) => continue,
            };
            if let Some(owner) = self.static_owner(class, name) {
                return Some(Place::Static(owner.decl.name.clone()));
            }
            if builtins::static_field(class, name).is_some() {
                return Some(Place::Library(class.clone()));
            }
        }
        None
    }

    /// `Name` used as a class qualifier, e.g. the `Math` in `Math.max`.
    fn class_ref(&self, frame: &Frame, expr: &Expr) -> Option<String> {
        let Expr::Name(name) = expr else {
            return None;
        };
        if self.resolve_name(frame, name).is_some() {
            return None;
        }
        (self.has_class(name) || builtins::is_builtin_class(name) || name == "Objects")
            .then(|| name.clone())
    }

    fn read_name(&self, frame: &Frame, name: &str) -> Result<Value, RuntimeError> {
        match self.resolve_name(frame, name) {
            Some(Place::Local) => Ok(frame
                .lookup(name)
                .map(|l| l.value.clone())
                .unwrap_or(Value::Null)),
            Some(Place::Field(obj)) => {
                Ok(obj.borrow().fields.get(name).cloned().unwrap_or(Value::Null))
            }
            Some(Place::Static(owner)) => Ok(self
                .statics
                .get(&owner)
                .and_then(|f| f.get(name))
                .cloned()
                .unwrap_or(Value::Null)),
            Some(Place::Library(class)) => builtins::static_field(&class, name).ok_or_else(|| {
                RuntimeError::Unresolved {
                    name: name.to_string(),
                }
            }),
            None => Err(RuntimeError::Unresolved {
                name: name.to_string(),
            }),
        }
    }

    fn read_field(
        &mut self,
        frame: &mut Frame,
        base: &Expr,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        if let Some(class) = self.class_ref(frame, base) {
            if let Some(owner) = self.static_owner(&class, name) {
                return Ok(self
                    .statics
                    .get(&owner.decl.name)
                    .and_then(|f| f.get(name))
                    .cloned()
                    .unwrap_or(Value::Null));
            }
            return builtins::static_field(&class, name).ok_or_else(|| RuntimeError::Unresolved {
                name: format!("{}.{}", class, name),
            });
        }
        match self.eval(frame, base)? {
            Value::Array(arr) if name == "length" => {
                Ok(Value::Int(arr.borrow().items.len() as i32))
            }
            Value::Object(obj) => {
                let value = obj.borrow().fields.get(name).cloned();
                match value {
                    Some(v) => Ok(v),
                    None => {
                        let class = obj.borrow().class_name.clone();
                        match self.static_owner(&class, name) {
                            Some(owner) => Ok(self
                                .statics
                                .get(&owner.decl.name)
                                .and_then(|f| f.get(name))
                                .cloned()
                                .unwrap_or(Value::Null)),
                            None => Err(RuntimeError::Unresolved {
                                name: format!("{}.{}", class, name),
                            }),
                        }
                    }
                }
            }
            Value::Null => Err(RuntimeError::null_pointer(&format!("read field \"{}\"", name))),
            other => Err(RuntimeError::Unresolved {
                name: format!("{}.{}", other.shape(), name),
            }),
        }
    }

    fn lvalue(&mut self, frame: &mut Frame, target: &Expr) -> Result<LValue, RuntimeError> {
        match target {
            Expr::Name(name) => match self.resolve_name(frame, name) {
                Some(Place::Local) => Ok(LValue::Local(name.clone())),
                Some(Place::Field(obj)) => Ok(LValue::Field(obj, name.clone())),
                Some(Place::Static(owner)) => Ok(LValue::Static(owner, name.clone())),
                Some(Place::Library(class)) => Err(RuntimeError::TypeMismatch {
                    expected: "an assignable variable".into(),
                    found: format!("final {}.{}", class, name),
                }),
                None => Err(RuntimeError::Unresolved { name: name.clone() }),
            },
            Expr::Field(base, name) => {
                if let Some(class) = self.class_ref(frame, base) {
                    return match self.static_owner(&class, name) {
                        Some(owner) => Ok(LValue::Static(owner.decl.name.clone(), name.clone())),
                        None => Err(RuntimeError::Unresolved {
                            name: format!("{}.{}", class, name),
                        }),
                    };
                }
                match self.eval(frame, base)? {
                    Value::Object(obj) => {
                        if obj.borrow().fields.contains_key(name) {
                            return Ok(LValue::Field(obj, name.clone()));
                        }
                        let class = obj.borrow().class_name.clone();
                        match self.static_owner(&class, name) {
                            Some(owner) => {
                                Ok(LValue::Static(owner.decl.name.clone(), name.clone()))
                            }
                            None => Err(RuntimeError::Unresolved {
                                name: format!("{}.{}", class, name),
                            }),
                        }
                    }
                    Value::Null => Err(RuntimeError::null_pointer(&format!(
                        "assign field \"{}\"",
                        name
                    ))),
                    other => Err(RuntimeError::TypeMismatch {
                        expected: "an object with assignable fields".into(),
                        found: other.shape(),
                    }),
                }
            }
            Expr::Index(base, index) => {
                let arr = match self.eval(frame, base)? {
                    Value::Array(arr) => arr,
                    Value::Null => return Err(RuntimeError::null_pointer("load from array")),
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "array".into(),
                            found: other.shape(),
                        })
                    }
                };
                let idx = self.eval(frame, index)?;
                let i = idx.as_i64().ok_or_else(|| RuntimeError::TypeMismatch {
                    expected: "int".into(),
                    found: idx.shape(),
                })?;
                let len = arr.borrow().items.len();
                if i < 0 || i as usize >= len {
                    return Err(RuntimeError::exception(
                        "java.lang.ArrayIndexOutOfBoundsException",
                        format!("Index {} out of bounds for length {}", i, len),
                    ));
                }
                Ok(LValue::Element(arr, i as usize))
            }
            _ => Err(RuntimeError::TypeMismatch {
                expected: "variable".into(),
                found: "value".into(),
            }),
        }
    }

    fn lvalue_type(&self, frame: &Frame, lv: &LValue) -> String {
        match lv {
            LValue::Local(name) => frame
                .lookup(name)
                .map(|l| l.ty.clone())
                .unwrap_or_else(|| "var".to_string()),
            LValue::Field(obj, name) => {
                let class = obj.borrow().class_name.clone();
                self.field_type(&class, name)
            }
            LValue::Static(class, name) => self.field_type(class, name),
            LValue::Element(arr, _) => arr.borrow().elem_type.clone(),
        }
    }

    fn load(&self, frame: &Frame, lv: &LValue) -> Value {
        match lv {
            LValue::Local(name) => frame
                .lookup(name)
                .map(|l| l.value.clone())
                .unwrap_or(Value::Null),
            LValue::Field(obj, name) => {
                obj.borrow().fields.get(name).cloned().unwrap_or(Value::Null)
            }
            LValue::Static(class, name) => self
                .statics
                .get(class)
                .and_then(|f| f.get(name))
                .cloned()
                .unwrap_or(Value::Null),
            LValue::Element(arr, i) => arr.borrow().items.get(*i).cloned().unwrap_or(Value::Null),
        }
    }

    /// Store through an lvalue. Compound updates narrow like a cast.
    fn store(
        &mut self,
        frame: &mut Frame,
        lv: &LValue,
        value: Value,
        compound: bool,
    ) -> Result<Value, RuntimeError> {
        let ty = self.lvalue_type(frame, lv);
        let value = if compound && is_primitive(&ty) {
            ops::convert(&ty, value)?
        } else {
            self.coerce(&ty, value)?
        };
        match lv {
            LValue::Local(name) => {
                if let Some(local) = frame.lookup_mut(name) {
                    local.value = value.clone();
                }
            }
            LValue::Field(obj, name) => {
                obj.borrow_mut().fields.insert(name.clone(), value.clone());
            }
            LValue::Static(class, name) => {
                self.statics
                    .entry(class.clone())
                    .or_default()
                    .insert(name.clone(), value.clone());
            }
            LValue::Element(arr, i) => {
                if let Some(slot) = arr.borrow_mut().items.get_mut(*i) {
                    *slot = value.clone();
                }
            }
        }
        Ok(value)
    }

    // ── Statements ──

    fn exec_block(&mut self, frame: &mut Frame, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        frame.scopes.push(HashMap::new());
        let mut flow = Ok(Flow::Normal);
        for stmt in stmts {
            flow = self.exec(frame, stmt);
            if !matches!(flow, Ok(Flow::Normal)) {
                break;
            }
        }
        frame.scopes.pop();
        flow
    }

    fn exec_scoped(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        frame.scopes.push(HashMap::new());
        let flow = self.exec(frame, stmt);
        frame.scopes.pop();
        flow
    }

    fn condition(&mut self, frame: &mut Frame, cond: &Expr) -> Result<bool, RuntimeError> {
        let value = self.eval(frame, cond)?;
        value.as_bool().ok_or_else(|| RuntimeError::TypeMismatch {
            expected: "boolean".into(),
            found: value.shape(),
        })
    }

    fn exec(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Local { ty, decls } => {
                let declared = ty.to_string();
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => {
                            let v = self.eval(frame, expr)?;
                            self.coerce(&declared, v)?
                        }
                        None => ops::default_value(&declared),
                    };
                    let local_ty = if declared == "var" {
                        value.shape()
                    } else {
                        declared.clone()
                    };
                    frame.declare(name, local_ty, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If(cond, then, otherwise) => {
                if self.condition(frame, cond)? {
                    self.exec_scoped(frame, then)
                } else if let Some(otherwise) = otherwise {
                    self.exec_scoped(frame, otherwise)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(cond, body) => {
                while self.condition(frame, cond)? {
                    match self.exec_scoped(frame, body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile(body, cond) => {
                loop {
                    match self.exec_scoped(frame, body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.condition(frame, cond)? {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                frame.scopes.push(HashMap::new());
                let flow = self.exec_for(frame, init, cond.as_ref(), update, body);
                frame.scopes.pop();
                flow
            }
            Stmt::ForEach {
                ty,
                name,
                iter,
                body,
            } => {
                let items = match self.eval(frame, iter)? {
                    Value::Array(arr) => arr.borrow().items.clone(),
                    Value::Null => return Err(RuntimeError::null_pointer("iterate")),
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "array".into(),
                            found: other.shape(),
                        })
                    }
                };
                let declared = ty.to_string();
                for item in items {
                    let value = self.coerce(&declared, item)?;
                    frame.scopes.push(HashMap::new());
                    let local_ty = if declared == "var" {
                        value.shape()
                    } else {
                        declared.clone()
                    };
                    frame.declare(name, local_ty, value);
                    let flow = self.exec(frame, body);
                    frame.scopes.pop();
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw(expr) => {
                let value = self.eval(frame, expr)?;
                Err(self.throwable(value))
            }
            Stmt::Block(stmts) => self.exec_block(frame, stmts),
            Stmt::SuperCall(_) | Stmt::ThisCall(_) => Err(RuntimeError::exception(
                "java.lang.IllegalStateException",
                "constructor call must be the first statement in a constructor",
            )),
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    fn exec_for(
        &mut self,
        frame: &mut Frame,
        init: &[Stmt],
        cond: Option<&Expr>,
        update: &[Expr],
        body: &Stmt,
    ) -> Result<Flow, RuntimeError> {
        for stmt in init {
            self.exec(frame, stmt)?;
        }
        loop {
            if let Some(cond) = cond {
                if !self.condition(frame, cond)? {
                    break;
                }
            }
            match self.exec_scoped(frame, body)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            for expr in update {
                self.eval(frame, expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    // ── Expressions ──

    fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
        match op {
            BinOp::Add if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) => {
                let text = format!("{}{}", self.render(&lhs)?, self.render(&rhs)?);
                Ok(Value::string(text))
            }
            BinOp::Eq | BinOp::NotEq if !(lhs.is_numeric() && rhs.is_numeric()) => {
                let same = lhs.same(&rhs);
                Ok(Value::Bool(if op == BinOp::Eq { same } else { !same }))
            }
            BinOp::And | BinOp::Or => match (lhs.as_bool(), rhs.as_bool()) {
                (Some(a), Some(b)) => Ok(Value::Bool(if op == BinOp::And {
                    a && b
                } else {
                    a || b
                })),
                _ => Err(RuntimeError::TypeMismatch {
                    expected: "boolean operands".into(),
                    found: format!("{} and {}", lhs.shape(), rhs.shape()),
                }),
            },
            _ => ops::numeric(op, &lhs, &rhs),
        }
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Lit(lit) => Ok(literal(lit)),
            Expr::Name(name) => self.read_name(frame, name),
            Expr::This => frame
                .this
                .clone()
                .map(Value::Object)
                .ok_or_else(|| RuntimeError::Unresolved {
                    name: "this".into(),
                }),
            Expr::Field(base, name) => self.read_field(frame, base, name),
            Expr::Index(..) => {
                let lv = self.lvalue(frame, expr)?;
                Ok(self.load(frame, &lv))
            }
            Expr::Call { target, name, args } => {
                self.eval_call(frame, target.as_deref(), name, args)
            }
            Expr::SuperMethod { name, args } => {
                let values = self.eval_args(frame, args)?;
                let Some(this) = frame.this.clone() else {
                    return Err(RuntimeError::Unresolved {
                        name: "super".into(),
                    });
                };
                let shapes = shapes_of(&values);
                let parent = frame.class.decl.superclass.clone();
                if let Some(parent) = parent.filter(|p| self.has_class(p)) {
                    if let Some((owner, idx)) = self.find_method(&parent, name, &shapes, false) {
                        return self.call(owner, idx, Some(this), values);
                    }
                }
                let receiver = Value::Object(this.clone());
                self.object_method(&receiver, &this, name, &values)
            }
            Expr::New { class, args } => {
                let values = self.eval_args(frame, args)?;
                self.instantiate(class, values)
            }
            Expr::NewArray {
                elem,
                dims,
                extra_dims,
            } => {
                let mut sizes = Vec::with_capacity(dims.len());
                for dim in dims {
                    let value = self.eval(frame, dim)?;
                    let n = value.as_i64().ok_or_else(|| RuntimeError::TypeMismatch {
                        expected: "int".into(),
                        found: value.shape(),
                    })?;
                    if n < 0 {
                        return Err(RuntimeError::exception(
                            "java.lang.NegativeArraySizeException",
                            n.to_string(),
                        ));
                    }
                    sizes.push(n as usize);
                }
                Ok(self.make_array(&elem.name, &sizes, *extra_dims))
            }
            Expr::ArrayLit { ty, items } => {
                let elem = ty.element().to_string();
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let v = self.eval(frame, item)?;
                    values.push(self.coerce(&elem, v)?);
                }
                Ok(Value::array(elem, values))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(frame, operand)?;
                match op {
                    UnaryOp::Neg => ops::negate(&value),
                    UnaryOp::Plus => ops::promote(&value),
                    UnaryOp::Not => value
                        .as_bool()
                        .map(|b| Value::Bool(!b))
                        .ok_or_else(|| RuntimeError::TypeMismatch {
                            expected: "boolean".into(),
                            found: value.shape(),
                        }),
                }
            }
            Expr::Binary(op @ (BinOp::And | BinOp::Or), lhs, rhs) => {
                let left = self.condition(frame, lhs)?;
                if (*op == BinOp::And) != left {
                    return Ok(Value::Bool(left));
                }
                Ok(Value::Bool(self.condition(frame, rhs)?))
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval(frame, lhs)?;
                let right = self.eval(frame, rhs)?;
                self.binary(*op, left, right)
            }
            Expr::Assign { target, op, value } => {
                let lv = self.lvalue(frame, target)?;
                let result = match op {
                    None => self.eval(frame, value)?,
                    Some(op) => {
                        let current = self.load(frame, &lv);
                        let rhs = self.eval(frame, value)?;
                        self.binary(*op, current, rhs)?
                    }
                };
                self.store(frame, &lv, result, op.is_some())
            }
            Expr::IncDec {
                target,
                delta,
                prefix,
            } => {
                let lv = self.lvalue(frame, target)?;
                let current = self.load(frame, &lv);
                let next = ops::numeric(BinOp::Add, &current, &Value::Int(*delta))?;
                let stored = self.store(frame, &lv, next, true)?;
                Ok(if *prefix { stored } else { current })
            }
            Expr::Ternary(cond, then, otherwise) => {
                if self.condition(frame, cond)? {
                    self.eval(frame, then)
                } else {
                    self.eval(frame, otherwise)
                }
            }
            Expr::Cast(ty, operand) => {
                let value = self.eval(frame, operand)?;
                self.cast(ty, value)
            }
            Expr::InstanceOf(operand, ty) => {
                let value = self.eval(frame, operand)?;
                Ok(Value::Bool(match &value {
                    Value::Null => false,
                    Value::Object(obj) => {
                        let class = obj.borrow().class_name.clone();
                        self.is_subclass(&class, &ty.name)
                    }
                    other => self.assignable(&ty.to_string(), &other.shape()),
                }))
            }
        }
    }
}
