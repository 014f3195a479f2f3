//! Primitive arithmetic, comparison and conversion.

use super::RuntimeError;
use crate::ast::BinOp;
use jolt_core::values::{is_primitive, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Int,
    Long,
    Float,
    Double,
}

fn rank(v: &Value) -> Option<Rank> {
    match v {
        Value::Char(_) | Value::Byte(_) | Value::Short(_) | Value::Int(_) => Some(Rank::Int),
        Value::Long(_) => Some(Rank::Long),
        Value::Float(_) => Some(Rank::Float),
        Value::Double(_) => Some(Rank::Double),
        _ => None,
    }
}

fn divide_by_zero() -> RuntimeError {
    RuntimeError::exception("java.lang.ArithmeticException", "/ by zero")
}

fn bad_operands(op: BinOp, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: format!("operands for '{}'", op),
        found: format!("{} and {}", a.shape(), b.shape()),
    }
}

/// Arithmetic and comparison on numeric operands with binary numeric promotion.
pub fn numeric(op: BinOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (Some(ra), Some(rb)) = (rank(a), rank(b)) else {
        return Err(bad_operands(op, a, b));
    };
    let (Some(fa), Some(fb)) = (a.as_f64(), b.as_f64()) else {
        return Err(bad_operands(op, a, b));
    };
    match ra.max(rb) {
        Rank::Int | Rank::Long => {
            let (x, y) = match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(bad_operands(op, a, b)),
            };
            if ra.max(rb) == Rank::Int {
                let (x, y) = (x as i32, y as i32);
                Ok(match op {
                    BinOp::Add => Value::Int(x.wrapping_add(y)),
                    BinOp::Sub => Value::Int(x.wrapping_sub(y)),
                    BinOp::Mul => Value::Int(x.wrapping_mul(y)),
                    BinOp::Div if y == 0 => return Err(divide_by_zero()),
                    BinOp::Div => Value::Int(x.wrapping_div(y)),
                    BinOp::Mod if y == 0 => return Err(divide_by_zero()),
                    BinOp::Mod => Value::Int(x.wrapping_rem(y)),
                    _ => compare(op, x.cmp(&y))?,
                })
            } else {
                Ok(match op {
                    BinOp::Add => Value::Long(x.wrapping_add(y)),
                    BinOp::Sub => Value::Long(x.wrapping_sub(y)),
                    BinOp::Mul => Value::Long(x.wrapping_mul(y)),
                    BinOp::Div if y == 0 => return Err(divide_by_zero()),
                    BinOp::Div => Value::Long(x.wrapping_div(y)),
                    BinOp::Mod if y == 0 => return Err(divide_by_zero()),
                    BinOp::Mod => Value::Long(x.wrapping_rem(y)),
                    _ => compare(op, x.cmp(&y))?,
                })
            }
        }
        Rank::Float => {
            let (x, y) = (fa as f32, fb as f32);
            Ok(match op {
                BinOp::Add => Value::Float(x + y),
                BinOp::Sub => Value::Float(x - y),
                BinOp::Mul => Value::Float(x * y),
                BinOp::Div => Value::Float(x / y),
                BinOp::Mod => Value::Float(x % y),
                _ => compare_float(op, fa, fb)?,
            })
        }
        Rank::Double => Ok(match op {
            BinOp::Add => Value::Double(fa + fb),
            BinOp::Sub => Value::Double(fa - fb),
            BinOp::Mul => Value::Double(fa * fb),
            BinOp::Div => Value::Double(fa / fb),
            BinOp::Mod => Value::Double(fa % fb),
            _ => compare_float(op, fa, fb)?,
        }),
    }
}

fn compare(op: BinOp, ord: std::cmp::Ordering) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering::*;
    Ok(Value::Bool(match op {
        BinOp::Eq => ord == Equal,
        BinOp::NotEq => ord != Equal,
        BinOp::Lt => ord == Less,
        BinOp::LtEq => ord != Greater,
        BinOp::Gt => ord == Greater,
        BinOp::GtEq => ord != Less,
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "boolean operands".into(),
                found: format!("numbers for '{}'", other),
            })
        }
    }))
}

fn compare_float(op: BinOp, x: f64, y: f64) -> Result<Value, RuntimeError> {
    // NaN compares false with everything, != true.
    Ok(Value::Bool(match op {
        BinOp::Eq => x == y,
        BinOp::NotEq => x != y,
        BinOp::Lt => x < y,
        BinOp::LtEq => x <= y,
        BinOp::Gt => x > y,
        BinOp::GtEq => x >= y,
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "boolean operands".into(),
                found: format!("numbers for '{}'", other),
            })
        }
    }))
}

pub fn negate(v: &Value) -> Result<Value, RuntimeError> {
    Ok(match v {
        Value::Char(_) | Value::Byte(_) | Value::Short(_) | Value::Int(_) => {
            Value::Int((v.as_i64().unwrap_or(0) as i32).wrapping_neg())
        }
        Value::Long(n) => Value::Long(n.wrapping_neg()),
        Value::Float(f) => Value::Float(-f),
        Value::Double(f) => Value::Double(-f),
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "numeric operand".into(),
                found: other.shape(),
            })
        }
    })
}

/// Unary plus: promotes small integral types to `int`.
pub fn promote(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Char(_) | Value::Byte(_) | Value::Short(_) => {
            Ok(Value::Int(v.as_i64().unwrap_or(0) as i32))
        }
        other if other.is_numeric() => Ok(other.clone()),
        other => Err(RuntimeError::TypeMismatch {
            expected: "numeric operand".into(),
            found: other.shape(),
        }),
    }
}

/// Zero value of a declared type.
pub fn default_value(type_name: &str) -> Value {
    match type_name {
        "boolean" => Value::Bool(false),
        "char" => Value::Char('\0'),
        "byte" => Value::Byte(0),
        "short" => Value::Short(0),
        "int" => Value::Int(0),
        "long" => Value::Long(0),
        "float" => Value::Float(0.0),
        "double" => Value::Double(0.0),
        _ => Value::Null,
    }
}

fn char_from(n: i64) -> char {
    char::from_u32(n as u16 as u32).unwrap_or('\u{FFFD}')
}

/// Primitive conversion as performed by a cast, an assignment or a compound
/// assignment. Reference targets pass the value through unchanged.
pub fn convert(type_name: &str, v: Value) -> Result<Value, RuntimeError> {
    if !is_primitive(type_name) {
        return Ok(v);
    }
    let mismatch = |v: &Value| RuntimeError::TypeMismatch {
        expected: type_name.to_string(),
        found: v.shape(),
    };
    if type_name == "boolean" {
        return match v {
            Value::Bool(_) => Ok(v),
            other => Err(mismatch(&other)),
        };
    }
    if !v.is_numeric() {
        if v.is_null() {
            return Err(RuntimeError::exception(
                "java.lang.NullPointerException",
                format!("cannot unbox null to {}", type_name),
            ));
        }
        return Err(mismatch(&v));
    }
    let is_floating = matches!(v, Value::Float(_) | Value::Double(_));
    let f = v.as_f64().unwrap_or(0.0);
    // Floating to sub-int targets narrows through int first.
    let i = if is_floating {
        match type_name {
            "long" => f as i64,
            _ => f as i32 as i64,
        }
    } else {
        v.as_i64().unwrap_or(0)
    };
    Ok(match type_name {
        "char" => Value::Char(char_from(i)),
        "byte" => Value::Byte(i as i8),
        "short" => Value::Short(i as i16),
        "int" => Value::Int(i as i32),
        "long" => Value::Long(i),
        "float" => Value::Float(f as f32),
        "double" => Value::Double(match v {
            Value::Float(x) => x as f64,
            _ => f,
        }),
        _ => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_wraps() {
        assert_eq!(
            numeric(BinOp::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap(),
            Value::Int(i32::MIN)
        );
    }

    #[test]
    fn integer_division_truncates_and_checks_zero() {
        assert!(matches!(
            numeric(BinOp::Div, &Value::Int(-7), &Value::Int(2)).unwrap(),
            Value::Int(-3)
        ));
        assert!(numeric(BinOp::Mod, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(matches!(
            numeric(BinOp::Div, &Value::Double(1.0), &Value::Int(0)).unwrap(),
            Value::Double(f) if f.is_infinite()
        ));
    }

    #[test]
    fn promotion_picks_widest() {
        assert!(matches!(
            numeric(BinOp::Mul, &Value::Int(2), &Value::Long(3)).unwrap(),
            Value::Long(6)
        ));
        assert!(matches!(
            numeric(BinOp::Add, &Value::Char('a'), &Value::Int(1)).unwrap(),
            Value::Int(98)
        ));
        assert!(matches!(
            numeric(BinOp::Add, &Value::Int(1), &Value::Double(0.5)).unwrap(),
            Value::Double(f) if f == 1.5
        ));
    }

    #[test]
    fn conversions_follow_casts() {
        assert!(matches!(convert("int", Value::Double(3.9)).unwrap(), Value::Int(3)));
        assert!(matches!(convert("int", Value::Double(-3.9)).unwrap(), Value::Int(-3)));
        assert!(matches!(convert("char", Value::Int(65)).unwrap(), Value::Char('A')));
        assert!(matches!(convert("byte", Value::Int(200)).unwrap(), Value::Byte(-56)));
        assert!(matches!(convert("double", Value::Int(2)).unwrap(), Value::Double(f) if f == 2.0));
        assert!(convert("int", Value::string("x")).is_err());
        assert!(convert("boolean", Value::Int(1)).is_err());
    }
}
