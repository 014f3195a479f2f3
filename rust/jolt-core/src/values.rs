//! Runtime value representation shared by the engine and every build backend.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Runtime values produced by evaluating fragments.
///
/// Primitives are stored unboxed with their declared width. Strings are
/// immutable. Arrays and objects are reference values: cloning a `Value`
/// clones the reference, never the referent.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
}

pub type ArrayRef = Rc<RefCell<ArrayData>>;
pub type ObjectRef = Rc<RefCell<Instance>>;

/// Copies already made during one deep-copy pass, keyed by the original
/// referent. Sharing one memo across several values keeps their aliasing.
#[derive(Debug, Default)]
pub struct CopyMemo {
    arrays: HashMap<*const RefCell<ArrayData>, ArrayRef>,
    objects: HashMap<*const RefCell<Instance>, ObjectRef>,
}

impl CopyMemo {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Backing storage of an array value.
#[derive(Debug, Clone)]
pub struct ArrayData {
    pub elem_type: String,
    pub items: Vec<Value>,
}

/// An instance of a user class.
#[derive(Debug, Clone)]
pub struct Instance {
    pub class_name: String,
    pub fields: BTreeMap<String, Value>,
    pub id: u64,
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(elem_type: impl Into<String>, items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayData {
            elem_type: elem_type.into(),
            items,
        })))
    }

    pub fn object(instance: Instance) -> Self {
        Value::Object(Rc::new(RefCell::new(instance)))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// A copy that shares no array or object with `self`. Referents reached
    /// twice (or cyclically) are copied once.
    pub fn deep_copy(&self, memo: &mut CopyMemo) -> Value {
        match self {
            Value::Array(arr) => {
                let key = Rc::as_ptr(arr);
                if let Some(copy) = memo.arrays.get(&key) {
                    return Value::Array(Rc::clone(copy));
                }
                let copy = Rc::new(RefCell::new(ArrayData {
                    elem_type: arr.borrow().elem_type.clone(),
                    items: Vec::new(),
                }));
                memo.arrays.insert(key, Rc::clone(&copy));
                let source = arr.borrow().items.clone();
                let items: Vec<Value> = source.iter().map(|v| v.deep_copy(memo)).collect();
                copy.borrow_mut().items = items;
                Value::Array(copy)
            }
            Value::Object(obj) => {
                let key = Rc::as_ptr(obj);
                if let Some(copy) = memo.objects.get(&key) {
                    return Value::Object(Rc::clone(copy));
                }
                let (class_name, id, source) = {
                    let o = obj.borrow();
                    (o.class_name.clone(), o.id, o.fields.clone())
                };
                let copy = Rc::new(RefCell::new(Instance {
                    class_name,
                    fields: BTreeMap::new(),
                    id,
                }));
                memo.objects.insert(key, Rc::clone(&copy));
                let fields: BTreeMap<String, Value> = source
                    .iter()
                    .map(|(name, v)| (name.clone(), v.deep_copy(memo)))
                    .collect();
                copy.borrow_mut().fields = fields;
                Value::Object(copy)
            }
            other => other.clone(),
        }
    }

    /// The static shape of this value, as a type name.
    ///
    /// Used for overload resolution: `5` has shape `int`, `"a"` has shape
    /// `String`, an instance of `Point` has shape `Point`, and `null` has the
    /// pseudo-shape `null` which is assignable to every reference type.
    pub fn shape(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Char(_) => "char".to_string(),
            Value::Byte(_) => "byte".to_string(),
            Value::Short(_) => "short".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Long(_) => "long".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Double(_) => "double".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::Array(a) => format!("{}[]", a.borrow().elem_type),
            Value::Object(o) => o.borrow().class_name.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Char(_)
                | Value::Byte(_)
                | Value::Short(_)
                | Value::Int(_)
                | Value::Long(_)
                | Value::Float(_)
                | Value::Double(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral view of any integral primitive, chars included.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Char(c) => Some(*c as i64),
            Value::Byte(n) => Some(*n as i64),
            Value::Short(n) => Some(*n as i64),
            Value::Int(n) => Some(*n as i64),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Floating view of any numeric primitive.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f as f64),
            Value::Double(f) => Some(*f),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Reference equality for arrays and objects, value equality otherwise.
    /// This is the semantics of `==` in the target language.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Byte(n) => write!(f, "{}", n),
            Value::Short(n) => write!(f, "{}", n),
            Value::Int(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", format_floating(*x as f64, true)),
            Value::Double(x) => write!(f, "{}", format_floating(*x, false)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                let a = arr.borrow();
                let code = match a.elem_type.as_str() {
                    "int" => "I".to_string(),
                    "long" => "J".to_string(),
                    "double" => "D".to_string(),
                    "float" => "F".to_string(),
                    "char" => "C".to_string(),
                    "boolean" => "Z".to_string(),
                    "byte" => "B".to_string(),
                    "short" => "S".to_string(),
                    other => format!("L{};", other),
                };
                write!(f, "[{}@{:x}", code, Rc::as_ptr(arr) as usize & 0xffff_ffff)
            }
            Value::Object(o) => {
                let o = o.borrow();
                write!(f, "{}@{:x}", o.class_name, o.id)
            }
        }
    }
}

/// Format a floating-point number the way the target language prints it:
/// integral values keep a trailing `.0`, very large or very small magnitudes
/// switch to `1.0E10` notation.
pub fn format_floating(x: f64, single: bool) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = x.abs();
    if abs == 0.0 || (1e-3..1e7).contains(&abs) {
        let text = if single {
            format!("{}", x as f32)
        } else {
            format!("{}", x)
        };
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = if single {
            format!("{:e}", x as f32)
        } else {
            format!("{:e}", x)
        };
        match text.split_once('e') {
            Some((mantissa, exp)) if mantissa.contains('.') => format!("{}E{}", mantissa, exp),
            Some((mantissa, exp)) => format!("{}.0E{}", mantissa, exp),
            None => text,
        }
    }
}

// ── Type names ──────────────────────────────────────────────────────

pub const PRIMITIVES: &[&str] = &[
    "boolean", "char", "byte", "short", "int", "long", "float", "double",
];

pub fn is_primitive(type_name: &str) -> bool {
    PRIMITIVES.contains(&type_name)
}

/// Strip generic arguments: `List<String>` becomes `List`.
pub fn erase_generics(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for ch in type_name.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out
}

/// The primitive behind a wrapper class name, if any.
pub fn unboxed(type_name: &str) -> Option<&'static str> {
    Some(match type_name {
        "Boolean" => "boolean",
        "Character" => "char",
        "Byte" => "byte",
        "Short" => "short",
        "Integer" => "int",
        "Long" => "long",
        "Float" => "float",
        "Double" => "double",
        _ => return None,
    })
}

fn widening_rank(type_name: &str) -> Option<u8> {
    Some(match type_name {
        "byte" => 1,
        "short" => 2,
        "int" => 3,
        "long" => 4,
        "float" => 5,
        "double" => 6,
        _ => return None,
    })
}

/// Whether a value of shape `shape` can be passed where `target` is expected,
/// without consulting any class hierarchy. Backends layer subclassing on top.
pub fn shape_assignable(target: &str, shape: &str) -> bool {
    let target = erase_generics(target);
    let target = target.as_str();
    if target == shape || target == "Object" || target == "var" {
        return true;
    }
    if shape == "null" {
        return !is_primitive(target);
    }
    let target = unboxed(target).unwrap_or(target);
    let shape = unboxed(shape).unwrap_or(shape);
    if target == shape {
        return true;
    }
    if shape == "char" {
        return matches!(target, "int" | "long" | "float" | "double");
    }
    match (widening_rank(target), widening_rank(shape)) {
        (Some(t), Some(s)) => s <= t && !(shape == "byte" && target == "char"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_print_like_the_language() {
        assert_eq!(Value::Double(2.0).to_string(), "2.0");
        assert_eq!(Value::Double(0.1).to_string(), "0.1");
        assert_eq!(Value::Double(1e10).to_string(), "1.0E10");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Double(-0.0005).to_string(), "-5.0E-4");
    }

    #[test]
    fn shapes() {
        assert_eq!(Value::Int(1).shape(), "int");
        assert_eq!(Value::string("x").shape(), "String");
        assert_eq!(Value::array("int", vec![]).shape(), "int[]");
        assert_eq!(Value::Null.shape(), "null");
    }

    #[test]
    fn assignability_follows_widening() {
        assert!(shape_assignable("long", "int"));
        assert!(shape_assignable("double", "int"));
        assert!(shape_assignable("int", "char"));
        assert!(!shape_assignable("int", "long"));
        assert!(!shape_assignable("int", "String"));
        assert!(shape_assignable("Integer", "int"));
        assert!(shape_assignable("String", "null"));
        assert!(!shape_assignable("int", "null"));
        assert!(shape_assignable("List<String>", "List"));
    }

    #[test]
    fn equality_is_reference_for_objects() {
        let a = Value::object(Instance {
            class_name: "P".into(),
            fields: BTreeMap::new(),
            id: 1,
        });
        let b = Value::object(Instance {
            class_name: "P".into(),
            fields: BTreeMap::new(),
            id: 1,
        });
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::Int(3), Value::Long(3));
    }

    #[test]
    fn deep_copy_detaches_and_keeps_aliasing() {
        let inner = Value::array("int", vec![Value::Int(1)]);
        let outer = Value::array("int[]", vec![inner.clone(), inner.clone()]);

        let mut memo = CopyMemo::new();
        let copy = outer.deep_copy(&mut memo);
        let again = inner.deep_copy(&mut memo);
        assert_ne!(copy, outer);

        let Value::Array(copy) = copy else {
            panic!("expected an array");
        };
        let items = copy.borrow().items.clone();
        assert_eq!(items[0], items[1]);
        assert_eq!(items[0], again);
        assert_ne!(items[0], inner);

        if let Value::Array(c) = &items[0] {
            c.borrow_mut().items[0] = Value::Int(9);
        }
        if let Value::Array(orig) = &inner {
            assert_eq!(orig.borrow().items[0], Value::Int(1));
        }
    }

    #[test]
    fn deep_copy_of_objects_keeps_identity_text() {
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::Int(3));
        let p = Value::object(Instance {
            class_name: "Point".into(),
            fields,
            id: 7,
        });
        let copy = p.deep_copy(&mut CopyMemo::new());
        assert_ne!(copy, p);
        assert_eq!(copy.to_string(), "Point@7");
        assert!(copy.is_reference());
        assert_eq!(Value::Int(1).deep_copy(&mut CopyMemo::new()), Value::Int(1));
    }
}
