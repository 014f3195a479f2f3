//! [`BuildService`] backed by the embedded interpreter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use jolt_core::{
    BuildError, BuildService, ClassHandle, InvokeError, LoadError, MemberRef, MemberSignature,
    Value, CONSTRUCTOR,
};
use tracing::{debug, warn};

use crate::ast::CompilationUnit;
use crate::interp::{is_builtin_class, Runtime};
use crate::parse_unit;
use crate::staging::{source_hash, Staging};

/// Parsed units kept for re-compiles of identical text.
const PARSE_CACHE_LIMIT: usize = 256;

pub struct VmService {
    runtime: Rc<RefCell<Runtime>>,
    staging: Option<Staging>,
    compiled: HashMap<String, CompilationUnit>,
    parsed: HashMap<String, CompilationUnit>,
}

impl Default for VmService {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl VmService {
    /// A service that keeps no files on disk.
    pub fn in_memory() -> Self {
        Self {
            runtime: Rc::new(RefCell::new(Runtime::default())),
            staging: None,
            compiled: HashMap::new(),
            parsed: HashMap::new(),
        }
    }

    /// A service that writes each compiled unit under a fresh session
    /// directory inside `root`.
    pub fn with_staging(root: &Path) -> Self {
        Self {
            staging: Some(Staging::new(root)),
            ..Self::in_memory()
        }
    }

    /// Redirect what user code prints to `System.out`.
    pub fn with_output(self, out: Box<dyn Write>) -> Self {
        self.runtime.borrow_mut().set_output(out);
        self
    }

    pub fn with_error_output(self, err: Box<dyn Write>) -> Self {
        self.runtime.borrow_mut().set_error_output(err);
        self
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.as_ref().map(Staging::dir)
    }

    pub fn is_compiled(&self, unit: &str) -> bool {
        self.compiled.contains_key(unit)
    }

    fn parse_cached(&mut self, unit: &str, source: &str) -> Result<CompilationUnit, BuildError> {
        let digest = source_hash(source);
        if let Some(cu) = self.parsed.get(&digest) {
            return Ok(cu.clone());
        }
        let cu = parse_unit(source).map_err(|e| BuildError::Rejected {
            unit: unit.to_string(),
            diagnostics: e.to_string(),
        })?;
        if self.parsed.len() >= PARSE_CACHE_LIMIT {
            self.parsed.clear();
        }
        self.parsed.insert(digest, cu.clone());
        Ok(cu)
    }

    fn check_superclasses(&self, unit: &str, cu: &CompilationUnit) -> Result<(), BuildError> {
        let runtime = self.runtime.borrow();
        for class in &cu.classes {
            let Some(sup) = &class.superclass else {
                continue;
            };
            let known = cu.classes.iter().any(|c| &c.name == sup)
                || runtime.has_class(sup)
                || is_builtin_class(sup);
            if !known {
                return Err(BuildError::Rejected {
                    unit: unit.to_string(),
                    diagnostics: format!(
                        "line {}: cannot find symbol: class {}",
                        class.line, sup
                    ),
                });
            }
        }
        Ok(())
    }
}

impl BuildService for VmService {
    type Handle = VmHandle;

    fn compile(&mut self, unit: &str, source: &str) -> Result<(), BuildError> {
        let cu = self.parse_cached(unit, source)?;
        if !cu.classes.iter().any(|c| c.name == unit) {
            return Err(BuildError::MissingPrimaryClass {
                unit: unit.to_string(),
            });
        }
        self.check_superclasses(unit, &cu)?;
        if let Some(staging) = self.staging.as_mut() {
            staging.write(unit, source).map_err(|e| BuildError::Staging {
                unit: unit.to_string(),
                message: e.to_string(),
            })?;
        }
        debug!(unit, classes = cu.classes.len(), "compiled unit");
        self.compiled.insert(unit.to_string(), cu);
        Ok(())
    }

    fn load(&mut self, unit: &str) -> Result<VmHandle, LoadError> {
        let cu = self
            .compiled
            .get(unit)
            .ok_or_else(|| LoadError::NotCompiled(unit.to_string()))?;
        let installed = self.runtime.borrow_mut().install(unit, cu);
        if let Err(e) = installed {
            self.runtime.borrow_mut().uninstall(unit);
            return Err(LoadError::Initializer {
                class: unit.to_string(),
                message: e.to_string(),
            });
        }
        if let Some(staging) = self.staging.as_mut() {
            let members = self.runtime.borrow().members(unit);
            staging
                .record_members(unit, members)
                .map_err(|e| LoadError::Staging(e.to_string()))?;
        }
        debug!(unit, "loaded unit");
        Ok(VmHandle {
            runtime: self.runtime.clone(),
            class: unit.to_string(),
        })
    }

    fn handle(&self, class: &str) -> Option<VmHandle> {
        self.runtime.borrow().has_class(class).then(|| VmHandle {
            runtime: self.runtime.clone(),
            class: class.to_string(),
        })
    }

    fn resolve_callable(&self, name: &str, shapes: &[String]) -> Option<MemberRef> {
        if name == CONSTRUCTOR {
            return None;
        }
        let runtime = self.runtime.borrow();
        let classes: Vec<String> = runtime.class_names().cloned().collect();
        classes.into_iter().find_map(|class| {
            runtime
                .select(&class, name, shapes)
                .map(|member| MemberRef { class, member })
        })
    }

    fn discard(&mut self, unit: &str) {
        self.runtime.borrow_mut().uninstall(unit);
        self.compiled.remove(unit);
        if let Some(staging) = self.staging.as_mut() {
            if let Err(e) = staging.remove(unit) {
                warn!(unit, error = %e, "could not remove staged unit");
            }
        }
    }

    fn discard_all(&mut self) -> Result<(), LoadError> {
        self.runtime.borrow_mut().clear();
        self.compiled.clear();
        self.parsed.clear();
        if let Some(staging) = self.staging.as_mut() {
            staging
                .remove_all()
                .map_err(|e| LoadError::Staging(e.to_string()))?;
        }
        Ok(())
    }

    fn render(&self, value: &Value) -> String {
        let rendered = self.runtime.borrow_mut().render(value);
        rendered.unwrap_or_else(|e| {
            warn!(error = %e, "toString() failed while rendering");
            value.to_string()
        })
    }
}

/// A loaded class inside a [`VmService`].
#[derive(Clone)]
pub struct VmHandle {
    runtime: Rc<RefCell<Runtime>>,
    class: String,
}

impl std::fmt::Debug for VmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmHandle").field("class", &self.class).finish()
    }
}

impl ClassHandle for VmHandle {
    fn name(&self) -> &str {
        &self.class
    }

    fn members(&self) -> Vec<MemberSignature> {
        self.runtime.borrow().members(&self.class)
    }

    fn find_member(&self, name: &str, shapes: &[String]) -> Option<MemberSignature> {
        self.runtime.borrow().select(&self.class, name, shapes)
    }

    fn invoke(
        &self,
        member: &MemberSignature,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        let result = self
            .runtime
            .borrow_mut()
            .invoke(&self.class, member, receiver, args);
        result.map_err(InvokeError::from)
    }

    fn construct(&self, args: &[Value]) -> Result<Value, InvokeError> {
        let result = self.runtime.borrow_mut().construct(&self.class, args);
        result.map_err(InvokeError::from)
    }

    fn get_static(&self, field: &str) -> Option<Value> {
        self.runtime.borrow().get_static(&self.class, field)
    }

    fn set_static(&self, field: &str, value: Value) -> Result<(), InvokeError> {
        let result = self.runtime.borrow_mut().set_static(&self.class, field, value);
        result.map_err(InvokeError::from)
    }
}

/// A clonable in-memory sink for captured program output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Return everything captured so far and empty the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (VmService, SharedBuffer) {
        let out = SharedBuffer::new();
        let svc = VmService::in_memory().with_output(Box::new(out.clone()));
        (svc, out)
    }

    #[test]
    fn compile_requires_primary_class() {
        let (mut svc, _) = service();
        let err = svc.compile("Eval", "class Other {}").unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingPrimaryClass {
                unit: "Eval".into()
            }
        );
    }

    #[test]
    fn compile_rejects_syntax_errors() {
        let (mut svc, _) = service();
        let err = svc.compile("Eval", "class Eval { int x = ; }").unwrap_err();
        assert!(matches!(err, BuildError::Rejected { .. }));
    }

    #[test]
    fn compile_rejects_unknown_superclass() {
        let (mut svc, _) = service();
        let err = svc.compile("Dog", "class Dog extends Animal {}").unwrap_err();
        match err {
            BuildError::Rejected { diagnostics, .. } => assert!(diagnostics.contains("Animal")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn load_before_compile_fails() {
        let (mut svc, _) = service();
        assert_eq!(
            svc.load("Nope").unwrap_err(),
            LoadError::NotCompiled("Nope".into())
        );
    }

    #[test]
    fn invoke_static_method_and_capture_output() {
        let (mut svc, out) = service();
        svc.compile(
            "Eval",
            "public class Eval { public static void main() { System.out.println(\"hi \" + 2); } }",
        )
        .unwrap();
        let handle = svc.load("Eval").unwrap();
        let main = handle.find_member("main", &[]).unwrap();
        handle.invoke(&main, None, &[]).unwrap();
        assert_eq!(out.contents(), "hi 2\n");
    }

    #[test]
    fn static_fields_round_trip_through_handle() {
        let (mut svc, _) = service();
        svc.compile("Eval", "class Eval { static int x = 1; static long y; }")
            .unwrap();
        let handle = svc.load("Eval").unwrap();
        assert_eq!(handle.get_static("x"), Some(Value::Int(1)));
        handle.set_static("y", Value::Int(5)).unwrap();
        assert!(matches!(handle.get_static("y"), Some(Value::Long(5))));
        assert!(handle.set_static("missing", Value::Int(1)).is_err());
    }

    #[test]
    fn failing_initializer_leaves_nothing_loaded() {
        let (mut svc, _) = service();
        svc.compile("Eval", "class Eval { static int x = 1 / 0; }")
            .unwrap();
        let err = svc.load("Eval").unwrap_err();
        assert!(matches!(err, LoadError::Initializer { .. }));
        assert!(svc.handle("Eval").is_none());
    }

    #[test]
    fn resolve_callable_searches_loaded_classes() {
        let (mut svc, _) = service();
        svc.compile("Util", "class Util { static int twice(int n) { return n * 2; } }")
            .unwrap();
        svc.load("Util").unwrap();
        let found = svc.resolve_callable("twice", &["int".into()]).unwrap();
        assert_eq!(found.class, "Util");
        assert!(svc.resolve_callable("twice", &["String".into()]).is_none());
    }

    #[test]
    fn render_uses_user_to_string() {
        let (mut svc, _) = service();
        svc.compile(
            "P",
            "class P { int x = 3; public String toString() { return \"P(\" + x + \")\"; } }",
        )
        .unwrap();
        let handle = svc.load("P").unwrap();
        let p = handle.construct(&[]).unwrap();
        assert_eq!(svc.render(&p), "P(3)");
    }

    #[test]
    fn discard_forgets_unit() {
        let (mut svc, _) = service();
        svc.compile("A", "class A {}").unwrap();
        svc.load("A").unwrap();
        svc.discard("A");
        assert!(svc.handle("A").is_none());
        assert!(!svc.is_compiled("A"));
    }
}
