//! Session variables and the declaration text that regenerates them.

use jolt_core::values::format_floating;
use jolt_core::{CopyMemo, Value};

/// One declared session variable.
///
/// `declaration` is regenerated on every value change so it always reads
/// `type name = <literal of the current value>`. Values with no source
/// literal (objects, arrays) declare as `null` and are seeded into each
/// loaded unit through its static fields instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    /// The type as entered, `var` included.
    pub declared_type: String,
    pub value: Value,
    declaration: String,
}

impl Binding {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, value: Value) -> Self {
        let mut binding = Self {
            name: name.into(),
            declared_type: declared_type.into(),
            value,
            declaration: String::new(),
        };
        binding.regenerate();
        binding
    }

    pub fn declaration(&self) -> &str {
        &self.declaration
    }

    /// The type used when the binding is re-declared as a field.
    pub fn field_type(&self) -> String {
        field_type(&self.declared_type, &self.value)
    }

    /// The same binding over a deep copy of its value.
    pub fn detached(&self, memo: &mut CopyMemo) -> Binding {
        Binding {
            value: self.value.deep_copy(memo),
            ..self.clone()
        }
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
        self.regenerate();
    }

    fn regenerate(&mut self) {
        self.declaration = declaration_text(&self.field_type(), &self.name, &self.value);
    }
}

/// Deep copies of `bindings` made in one pass, so arrays and objects shared
/// between bindings stay shared between the copies.
pub fn detach_all<'a>(bindings: impl IntoIterator<Item = &'a Binding>) -> Vec<Binding> {
    let mut memo = CopyMemo::new();
    bindings.into_iter().map(|b| b.detached(&mut memo)).collect()
}

/// Resolve `var` against a value's shape.
pub fn field_type(declared: &str, value: &Value) -> String {
    if declared != "var" {
        return declared.to_string();
    }
    match value {
        Value::Null => "Object".to_string(),
        other => other.shape(),
    }
}

/// `type name = literal`, without the trailing `;`.
pub fn declaration_text(ty: &str, name: &str, value: &Value) -> String {
    format!("{} {} = {}", ty, name, initializer(value))
}

/// Source text that evaluates to `value`, or `null` when no literal can.
pub fn initializer(value: &Value) -> String {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => char_literal(*c),
        Value::Byte(n) => format!("(byte) {}", n),
        Value::Short(n) => format!("(short) {}", n),
        Value::Int(n) => n.to_string(),
        Value::Long(n) if *n == i64::MIN => "(-9223372036854775807L - 1L)".to_string(),
        Value::Long(n) => format!("{}L", n),
        Value::Float(x) => floating_literal(*x as f64, "F"),
        Value::Double(x) => floating_literal(*x, ""),
        Value::Str(s) => string_literal(s),
    }
}

fn floating_literal(x: f64, suffix: &str) -> String {
    if x.is_nan() {
        format!("(0.0{0} / 0.0{0})", suffix)
    } else if x.is_infinite() {
        let sign = if x > 0.0 { "" } else { "-" };
        format!("({}1.0{} / 0.0{})", sign, suffix, suffix)
    } else {
        format!("{}{}", format_floating(x, !suffix.is_empty()), suffix)
    }
}

fn char_literal(c: char) -> String {
    if c == '\'' || c == '\\' || c.is_control() {
        format!("(char) {}", c as u32)
    } else {
        format!("'{}'", c)
    }
}

pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Initializer for `Type name;` with no value.
pub fn default_initializer(ty: &str) -> &'static str {
    match ty {
        "boolean" => "false",
        "char" => "(char) 0",
        "byte" | "short" | "int" => "0",
        "long" => "0L",
        "float" => "0.0F",
        "double" => "0.0",
        _ => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_tracks_value() {
        let mut b = Binding::new("x", "int", Value::Int(5));
        assert_eq!(b.declaration(), "int x = 5");
        b.set_value(Value::Int(6));
        assert_eq!(b.declaration(), "int x = 6");
    }

    #[test]
    fn var_takes_the_value_shape() {
        let b = Binding::new("s", "var", Value::string("hi"));
        assert_eq!(b.field_type(), "String");
        assert_eq!(b.declaration(), "String s = \"hi\"");
        assert_eq!(field_type("var", &Value::Null), "Object");
    }

    #[test]
    fn literals_reparse_as_the_same_value() {
        assert_eq!(initializer(&Value::Long(3)), "3L");
        assert_eq!(initializer(&Value::Double(2.0)), "2.0");
        assert_eq!(initializer(&Value::Double(1e10)), "1.0E10");
        assert_eq!(initializer(&Value::Float(1.5)), "1.5F");
        assert_eq!(initializer(&Value::Byte(-3)), "(byte) -3");
        assert_eq!(initializer(&Value::Char('a')), "'a'");
        assert_eq!(initializer(&Value::Char('\'')), "(char) 39");
        assert_eq!(initializer(&Value::Double(f64::NAN)), "(0.0 / 0.0)");
        assert_eq!(initializer(&Value::Float(f32::NEG_INFINITY)), "(-1.0F / 0.0F)");
        assert_eq!(initializer(&Value::string("a\"b\n")), "\"a\\\"b\\n\"");
        assert_eq!(initializer(&Value::array("int", vec![])), "null");
    }
}
