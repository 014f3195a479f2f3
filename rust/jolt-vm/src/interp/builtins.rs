//! Library classes available without user definitions.

use super::RuntimeError;
use jolt_core::values::Value;

const BUILTIN_CLASSES: &[&str] = &[
    "Object",
    "Math",
    "System",
    "String",
    "Integer",
    "Long",
    "Double",
    "Float",
    "Character",
    "Boolean",
];

pub fn is_builtin_class(name: &str) -> bool {
    BUILTIN_CLASSES.contains(&name) || is_throwable(name)
}

/// Library exception types are recognised by name.
pub fn is_throwable(name: &str) -> bool {
    name == "Throwable" || name.ends_with("Exception") || name.ends_with("Error")
}

pub fn static_field(class: &str, name: &str) -> Option<Value> {
    Some(match (class, name) {
        ("Math", "PI") => Value::Double(std::f64::consts::PI),
        ("Math", "E") => Value::Double(std::f64::consts::E),
        ("Integer", "MAX_VALUE") => Value::Int(i32::MAX),
        ("Integer", "MIN_VALUE") => Value::Int(i32::MIN),
        ("Long", "MAX_VALUE") => Value::Long(i64::MAX),
        ("Long", "MIN_VALUE") => Value::Long(i64::MIN),
        ("Double", "MAX_VALUE") => Value::Double(f64::MAX),
        ("Double", "MIN_VALUE") => Value::Double(f64::from_bits(1)),
        ("Double", "POSITIVE_INFINITY") => Value::Double(f64::INFINITY),
        ("Double", "NEGATIVE_INFINITY") => Value::Double(f64::NEG_INFINITY),
        ("Double", "NaN") => Value::Double(f64::NAN),
        _ => return None,
    })
}

fn number_format(text: &str) -> RuntimeError {
    RuntimeError::exception(
        "java.lang.NumberFormatException",
        format!("For input string: \"{}\"", text),
    )
}

fn arg_mismatch(what: &str, args: &[Value]) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: what.to_string(),
        found: args
            .iter()
            .map(|a| a.shape())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn float_arg(args: &[Value], i: usize, what: &str) -> Result<f64, RuntimeError> {
    args.get(i)
        .and_then(Value::as_f64)
        .ok_or_else(|| arg_mismatch(what, args))
}

fn str_arg<'a>(args: &'a [Value], i: usize, what: &str) -> Result<&'a str, RuntimeError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| arg_mismatch(what, args))
}

/// Static library methods. `None` when no such method exists.
pub fn call_static(class: &str, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    let result = match (class, name, args.len()) {
        ("Math", "max", 2) | ("Math", "min", 2) => math_minmax(name, &args[0], &args[1]),
        ("Math", "abs", 1) => math_abs(&args[0]),
        ("Math", "pow", 2) => float_arg(args, 0, "double")
            .and_then(|a| Ok(Value::Double(a.powf(float_arg(args, 1, "double")?)))),
        ("Math", "sqrt", 1) => float_arg(args, 0, "double").map(|a| Value::Double(a.sqrt())),
        ("Math", "cbrt", 1) => float_arg(args, 0, "double").map(|a| Value::Double(a.cbrt())),
        ("Math", "floor", 1) => float_arg(args, 0, "double").map(|a| Value::Double(a.floor())),
        ("Math", "ceil", 1) => float_arg(args, 0, "double").map(|a| Value::Double(a.ceil())),
        ("Math", "round", 1) => match &args[0] {
            Value::Float(f) => Ok(Value::Int((f + 0.5).floor() as i32)),
            other => float_arg(std::slice::from_ref(other), 0, "double")
                .map(|a| Value::Long((a + 0.5).floor() as i64)),
        },
        ("Integer", "parseInt", 1) | ("Integer", "valueOf", 1) => str_arg(args, 0, "String")
            .and_then(|s| {
                s.trim_start_matches('+')
                    .parse::<i32>()
                    .map(Value::Int)
                    .map_err(|_| number_format(s))
            }),
        ("Long", "parseLong", 1) => str_arg(args, 0, "String").and_then(|s| {
            s.parse::<i64>()
                .map(Value::Long)
                .map_err(|_| number_format(s))
        }),
        ("Double", "parseDouble", 1) | ("Double", "valueOf", 1) => match &args[0] {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| number_format(s)),
            other => float_arg(std::slice::from_ref(other), 0, "String").map(Value::Double),
        },
        ("Boolean", "parseBoolean", 1) => {
            str_arg(args, 0, "String").map(|s| Value::Bool(s.eq_ignore_ascii_case("true")))
        }
        ("Character", "isDigit", 1) => char_test(args, |c| c.is_ascii_digit()),
        ("Character", "isLetter", 1) => char_test(args, char::is_alphabetic),
        ("Character", "isWhitespace", 1) => char_test(args, char::is_whitespace),
        ("Character", "isUpperCase", 1) => char_test(args, char::is_uppercase),
        ("Character", "isLowerCase", 1) => char_test(args, char::is_lowercase),
        ("Character", "toUpperCase", 1) => char_map(args, |c| c.to_uppercase().next()),
        ("Character", "toLowerCase", 1) => char_map(args, |c| c.to_lowercase().next()),
        _ => return None,
    };
    Some(result)
}

fn char_test(args: &[Value], test: impl Fn(char) -> bool) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Char(c) => Ok(Value::Bool(test(*c))),
        _ => Err(arg_mismatch("char", args)),
    }
}

fn char_map(args: &[Value], map: impl Fn(char) -> Option<char>) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Char(c) => Ok(Value::Char(map(*c).unwrap_or(*c))),
        _ => Err(arg_mismatch("char", args)),
    }
}

fn math_minmax(name: &str, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let pick_first = |less: bool| if (name == "min") == less { a } else { b };
    match (a, b) {
        (Value::Double(_) | Value::Float(_), _) | (_, Value::Double(_) | Value::Float(_)) => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(arg_mismatch("numbers", &[a.clone(), b.clone()])),
            };
            let r = if name == "min" { x.min(y) } else { x.max(y) };
            if matches!(a, Value::Double(_)) || matches!(b, Value::Double(_)) {
                Ok(Value::Double(r))
            } else {
                Ok(Value::Float(r as f32))
            }
        }
        _ => {
            let (x, y) = match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(arg_mismatch("numbers", &[a.clone(), b.clone()])),
            };
            let chosen = pick_first(x < y).clone();
            if matches!(a, Value::Long(_)) || matches!(b, Value::Long(_)) {
                Ok(Value::Long(chosen.as_i64().unwrap_or(0)))
            } else {
                Ok(Value::Int(chosen.as_i64().unwrap_or(0) as i32))
            }
        }
    }
}

fn math_abs(v: &Value) -> Result<Value, RuntimeError> {
    Ok(match v {
        Value::Int(n) => Value::Int(n.wrapping_abs()),
        Value::Long(n) => Value::Long(n.wrapping_abs()),
        Value::Float(f) => Value::Float(f.abs()),
        Value::Double(f) => Value::Double(f.abs()),
        Value::Char(_) | Value::Byte(_) | Value::Short(_) => {
            Value::Int((v.as_i64().unwrap_or(0) as i32).wrapping_abs())
        }
        other => return Err(arg_mismatch("number", std::slice::from_ref(other))),
    })
}

fn index_arg(args: &[Value], i: usize) -> Result<i64, RuntimeError> {
    args.get(i)
        .and_then(Value::as_i64)
        .ok_or_else(|| arg_mismatch("int", args))
}

fn out_of_range(index: i64, len: usize) -> RuntimeError {
    RuntimeError::exception(
        "java.lang.StringIndexOutOfBoundsException",
        format!("index {}, length {}", index, len),
    )
}

/// Instance methods of `String`. `None` when no such method exists.
pub fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let slice = |from: i64, to: i64| -> Result<Value, RuntimeError> {
        if from < 0 || to > len as i64 || from > to {
            return Err(out_of_range(if from < 0 { from } else { to }, len));
        }
        Ok(Value::string(
            chars[from as usize..to as usize].iter().collect::<String>(),
        ))
    };
    let result = match (name, args.len()) {
        ("length", 0) => Ok(Value::Int(len as i32)),
        ("isEmpty", 0) => Ok(Value::Bool(len == 0)),
        ("charAt", 1) => index_arg(args, 0).and_then(|i| {
            usize::try_from(i)
                .ok()
                .and_then(|u| chars.get(u).copied())
                .map(Value::Char)
                .ok_or_else(|| out_of_range(i, len))
        }),
        ("substring", 1) => index_arg(args, 0).and_then(|from| slice(from, len as i64)),
        ("substring", 2) => {
            index_arg(args, 0).and_then(|from| slice(from, index_arg(args, 1)?))
        }
        ("indexOf", 1) => Ok(Value::Int(match &args[0] {
            Value::Char(c) => chars.iter().position(|x| x == c).map_or(-1, |p| p as i32),
            Value::Str(needle) => s
                .find(needle.as_ref())
                .map_or(-1, |byte| s[..byte].chars().count() as i32),
            _ => -1,
        })),
        ("contains", 1) => str_arg(args, 0, "CharSequence").map(|n| Value::Bool(s.contains(n))),
        ("startsWith", 1) => str_arg(args, 0, "String").map(|n| Value::Bool(s.starts_with(n))),
        ("endsWith", 1) => str_arg(args, 0, "String").map(|n| Value::Bool(s.ends_with(n))),
        ("equals", 1) => Ok(Value::Bool(args[0].as_str() == Some(s))),
        ("equalsIgnoreCase", 1) => Ok(Value::Bool(
            args[0]
                .as_str()
                .is_some_and(|o| o.to_lowercase() == s.to_lowercase()),
        )),
        ("toUpperCase", 0) => Ok(Value::string(s.to_uppercase())),
        ("toLowerCase", 0) => Ok(Value::string(s.to_lowercase())),
        ("trim", 0) => Ok(Value::string(s.trim())),
        ("concat", 1) => str_arg(args, 0, "String").map(|o| Value::string(format!("{}{}", s, o))),
        ("replace", 2) => match (&args[0], &args[1]) {
            (Value::Char(a), Value::Char(b)) => {
                Ok(Value::string(s.replace(*a, &b.to_string())))
            }
            (Value::Str(a), Value::Str(b)) => Ok(Value::string(s.replace(a.as_ref(), b))),
            _ => Err(arg_mismatch("(char, char) or (String, String)", args)),
        },
        ("compareTo", 1) => str_arg(args, 0, "String").map(|o| {
            let other: Vec<char> = o.chars().collect();
            let diff = chars
                .iter()
                .zip(other.iter())
                .find(|(a, b)| a != b)
                .map(|(a, b)| *a as i32 - *b as i32)
                .unwrap_or(len as i32 - other.len() as i32);
            Value::Int(diff)
        }),
        ("hashCode", 0) => Ok(Value::Int(chars.iter().fold(0i32, |h, c| {
            h.wrapping_mul(31).wrapping_add(*c as i32)
        }))),
        ("toString", 0) => Ok(Value::string(s)),
        _ => return None,
    };
    Some(result)
}
