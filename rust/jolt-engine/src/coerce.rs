//! Fitting an evaluated value to the type a binding was declared with.

use crate::error::EvalError;
use jolt_core::values::{erase_generics, is_primitive, shape_assignable, unboxed};
use jolt_core::Value;

/// Convert `value` for storage in a binding declared as `declared`.
///
/// Follows assignment conversion: identity, primitive widening, unboxing,
/// and narrowing of `int` values that fit into `byte`, `short` or `char`.
/// Reference types accept `null` and any object; the backend owns the class
/// hierarchy and rejects bad objects when the binding is seeded.
pub fn coerce(value: Value, declared: &str) -> Result<Value, EvalError> {
    let declared = erase_generics(declared);
    if declared == "var" || declared == "Object" {
        return Ok(value);
    }
    let target = unboxed(&declared).unwrap_or(declared.as_str());

    if value.is_null() {
        return if is_primitive(&declared) {
            Err(EvalError::mismatch(&declared, "null"))
        } else {
            Ok(value)
        };
    }

    if is_primitive(target) {
        let shape = value.shape();
        if shape_assignable(target, &shape) {
            return convert(&value, target).ok_or_else(|| EvalError::mismatch(target, shape));
        }
        if let Value::Int(n) = value {
            if fits(n, target) {
                return convert(&value, target).ok_or_else(|| EvalError::mismatch(target, shape));
            }
        }
        return Err(EvalError::mismatch(&declared, shape));
    }

    match &value {
        Value::Object(_) => Ok(value),
        Value::Str(_) if matches!(target, "String" | "CharSequence") => Ok(value),
        Value::Array(_) if shape_assignable(target, &value.shape()) => Ok(value),
        other => Err(EvalError::mismatch(&declared, other.shape())),
    }
}

fn fits(n: i32, target: &str) -> bool {
    match target {
        "byte" => i8::try_from(n).is_ok(),
        "short" => i16::try_from(n).is_ok(),
        "char" => u16::try_from(n).is_ok(),
        _ => false,
    }
}

/// Re-represent a numeric value at the width of `target`, wrapping like a
/// primitive cast.
fn convert(value: &Value, target: &str) -> Option<Value> {
    if target == "boolean" {
        return value.as_bool().map(Value::Bool);
    }
    if let (Value::Float(_) | Value::Double(_), "float" | "double") = (value, target) {
        let x = value.as_f64()?;
        return Some(if target == "float" {
            Value::Float(x as f32)
        } else {
            Value::Double(x)
        });
    }
    let n = value.as_i64();
    Some(match target {
        "byte" => Value::Byte(n? as i8),
        "short" => Value::Short(n? as i16),
        "char" => Value::Char(char::from_u32(n? as u16 as u32)?),
        "int" => Value::Int(n? as i32),
        "long" => Value::Long(n?),
        "float" => Value::Float(n? as f32),
        "double" => Value::Double(n? as f64),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_changes_representation() {
        assert!(matches!(coerce(Value::Int(3), "long"), Ok(Value::Long(3))));
        assert!(matches!(coerce(Value::Int(3), "double"), Ok(Value::Double(x)) if x == 3.0));
        assert!(matches!(coerce(Value::Char('a'), "int"), Ok(Value::Int(97))));
        assert!(matches!(coerce(Value::Int(7), "Integer"), Ok(Value::Int(7))));
    }

    #[test]
    fn int_values_narrow_when_they_fit() {
        assert!(matches!(coerce(Value::Int(100), "byte"), Ok(Value::Byte(100))));
        assert!(matches!(coerce(Value::Int(65), "char"), Ok(Value::Char('A'))));
        assert_eq!(
            coerce(Value::Int(300), "byte").unwrap_err(),
            EvalError::mismatch("byte", "int")
        );
    }

    #[test]
    fn mismatches_are_reported() {
        assert_eq!(
            coerce(Value::string("a"), "int").unwrap_err(),
            EvalError::mismatch("int", "String")
        );
        assert_eq!(
            coerce(Value::Double(1.5), "int").unwrap_err(),
            EvalError::mismatch("int", "double")
        );
        assert_eq!(
            coerce(Value::Null, "int").unwrap_err(),
            EvalError::mismatch("int", "null")
        );
        assert!(coerce(Value::Null, "String").is_ok());
        assert!(coerce(Value::array("int", vec![]), "int[]").is_ok());
        assert!(coerce(Value::Int(1), "String").is_err());
    }
}
