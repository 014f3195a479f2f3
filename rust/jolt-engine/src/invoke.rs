//! Direct dispatch of call fragments, and the throwaway units used when a
//! fragment cannot be dispatched.

use crate::classify::{is_call, matching_close, split_top_level};
use crate::error::EvalError;
use crate::session::SessionState;
use crate::splice::{seed, seed_holder};
use crate::synth::{
    dynamic_unit, expression_unit, prelude, DYNAMIC_UNIT, ENTRY_UNIT, EXPRESSION_UNIT,
    HOLDER_UNIT, THROWAWAY_ROUTINE,
};
use jolt_core::{BuildService, ClassHandle, InvokeError, MemberSignature, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static DOUBLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());
static SUFFIXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?\d+)([LSB])$").unwrap());
static FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?\d+\.\d+)F$").unwrap());
static NEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^new\s+([A-Za-z_$][\w$.]*)\s*\(").unwrap());

/// Units that never hold user-callable members.
const INTERNAL_UNITS: &[&str] = &[ENTRY_UNIT, EXPRESSION_UNIT, DYNAMIC_UNIT];

/// `qualifier.name(args)` with the argument texts still unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite<'a> {
    pub qualifier: Option<&'a str>,
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> CallSite<'a> {
    /// Parse a fragment that is exactly one call, optionally `;`-terminated.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim().trim_end_matches(';').trim_end();
        if !is_call(text) {
            return None;
        }
        let open = text.find('(')?;
        let close = matching_close(text, open)?;
        let callee = text[..open].trim();
        let (qualifier, name) = match callee.rsplit_once('.') {
            Some((q, n)) => (Some(q), n),
            None => (None, callee),
        };
        Some(Self {
            qualifier,
            name,
            args: split_top_level(&text[open + 1..close]),
        })
    }
}

/// Literal value of one argument, or the value of the binding it names.
/// `None` when the argument needs real evaluation.
pub fn parse_argument<H>(arg: &str, session: &SessionState<H>) -> Option<Value> {
    let arg = arg.trim();
    if arg == "null" {
        return Some(Value::Null);
    }
    if INT.is_match(arg) {
        return arg.parse().ok().map(Value::Int);
    }
    if DOUBLE.is_match(arg) {
        return arg.parse().ok().map(Value::Double);
    }
    if arg.eq_ignore_ascii_case("true") || arg.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(arg.eq_ignore_ascii_case("true")));
    }
    if let Some(caps) = SUFFIXED.captures(arg) {
        let digits = &caps[1];
        return match &caps[2] {
            "L" => digits.parse().ok().map(Value::Long),
            "S" => digits.parse().ok().map(Value::Short),
            _ => digits.parse().ok().map(Value::Byte),
        };
    }
    if let Some(caps) = FLOAT.captures(arg) {
        return caps[1].parse().ok().map(Value::Float);
    }
    if let Some(inner) = arg.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')) {
        let mut chars = inner.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) if c != '\\' => Some(Value::Char(c)),
            _ => None,
        };
    }
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        let inner = &arg[1..arg.len() - 1];
        return (!inner.contains(['\\', '"'])).then(|| Value::string(inner));
    }
    session.binding(arg).map(|b| b.value.clone())
}

/// Result of a dispatched call.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub class: String,
    pub member: MemberSignature,
    pub value: Value,
}

impl Dispatched {
    pub fn returns_value(&self) -> bool {
        self.member.ret != "void"
    }
}

/// Invoke a call fragment directly through a class handle.
///
/// Search order: session methods in the holder, any loaded class by
/// member name, a binding used as a receiver, a loaded class used as a
/// qualifier. `Ok(None)` means no member matched or an argument was not a
/// literal; the caller falls back to compiling the fragment.
pub fn dispatch<S: BuildService>(
    service: &S,
    session: &SessionState<S::Handle>,
    site: &CallSite<'_>,
) -> Result<Option<Dispatched>, EvalError> {
    let Some(args) = literal_args(&site.args, session) else {
        debug!(call = site.name, "arguments need evaluation, not dispatching");
        return Ok(None);
    };
    let shapes: Vec<String> = args.iter().map(Value::shape).collect();

    let found = match site.qualifier {
        None => unqualified(service, session, site.name, &shapes),
        Some(qualifier) => qualified(service, session, qualifier, site.name, &shapes),
    };
    let Some((handle, member, receiver)) = found else {
        debug!(call = site.name, shapes = %shapes.join(", "), "no member matched");
        return Ok(None);
    };

    seed_holder(session)?;
    let receiver = match receiver {
        Receiver::Static => None,
        Receiver::Value(v) => Some(v),
        Receiver::Fresh => match handle.construct(&[]) {
            Ok(instance) => Some(instance),
            Err(InvokeError::MemberNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        },
    };
    debug!(class = handle.name(), member = %member, "dispatching");
    let value = handle.invoke(&member, receiver.as_ref(), &args)?;
    Ok(Some(Dispatched {
        class: handle.name().to_string(),
        member,
        value,
    }))
}

enum Receiver {
    Static,
    Value(Value),
    /// Instance method found by name search: call it on a new instance.
    Fresh,
}

fn unqualified<S: BuildService>(
    service: &S,
    session: &SessionState<S::Handle>,
    name: &str,
    shapes: &[String],
) -> Option<(S::Handle, MemberSignature, Receiver)> {
    if let Some(holder) = session.unit(HOLDER_UNIT) {
        if let Some(member) = holder.handle.find_member(name, shapes) {
            return Some((holder.handle.clone(), member, Receiver::Static));
        }
    }
    let found = service.resolve_callable(name, shapes)?;
    if INTERNAL_UNITS.contains(&found.class.as_str()) {
        return None;
    }
    let handle = service.handle(&found.class)?;
    let receiver = if found.member.is_static {
        Receiver::Static
    } else {
        Receiver::Fresh
    };
    Some((handle, found.member, receiver))
}

fn qualified<S: BuildService>(
    service: &S,
    session: &SessionState<S::Handle>,
    qualifier: &str,
    name: &str,
    shapes: &[String],
) -> Option<(S::Handle, MemberSignature, Receiver)> {
    if let Some(binding) = session.binding(qualifier) {
        let Value::Object(obj) = &binding.value else {
            return None;
        };
        let class = obj.borrow().class_name.clone();
        let handle = service.handle(&class)?;
        let member = handle.find_member(name, shapes)?;
        return Some((handle, member, Receiver::Value(binding.value.clone())));
    }
    if INTERNAL_UNITS.contains(&qualifier) {
        return None;
    }
    let handle = service.handle(qualifier)?;
    let member = handle.find_member(name, shapes).filter(|m| m.is_static)?;
    Some((handle, member, Receiver::Static))
}

fn literal_args<H>(args: &[&str], session: &SessionState<H>) -> Option<Vec<Value>> {
    args.iter().map(|a| parse_argument(a, session)).collect()
}

/// Instantiate `new C(args)` through the class handle. `Ok(None)` when the
/// text is not a plain construction of a loaded class.
pub fn construct<S: BuildService>(
    service: &S,
    session: &SessionState<S::Handle>,
    text: &str,
) -> Result<Option<Value>, EvalError> {
    let text = text.trim();
    let Some(caps) = NEW.captures(text) else {
        return Ok(None);
    };
    let open = caps.get(0).map_or(0, |m| m.end() - 1);
    if matching_close(text, open) != Some(text.len() - 1) {
        return Ok(None);
    }
    let Some(handle) = service.handle(&caps[1]) else {
        return Ok(None);
    };
    let Some(args) = literal_args(&split_top_level(&text[open + 1..text.len() - 1]), session)
    else {
        return Ok(None);
    };
    seed_holder(session)?;
    match handle.construct(&args) {
        Ok(value) => Ok(Some(value)),
        Err(InvokeError::MemberNotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Compile `expression` into the throwaway expression unit and return its
/// value.
pub fn evaluate_expression<S: BuildService>(
    service: &mut S,
    session: &SessionState<S::Handle>,
    expression: &str,
) -> Result<Value, EvalError> {
    let prelude = prelude(
        session.imports(),
        session.unit(HOLDER_UNIT).is_some(),
        EXPRESSION_UNIT,
    );
    let source = expression_unit(&prelude, session.bindings(), expression);
    run_throwaway(service, session, EXPRESSION_UNIT, &source)
}

/// Compile `statement` into the throwaway statement unit and run it once.
pub fn execute_statement<S: BuildService>(
    service: &mut S,
    session: &SessionState<S::Handle>,
    statement: &str,
) -> Result<(), EvalError> {
    let prelude = prelude(
        session.imports(),
        session.unit(HOLDER_UNIT).is_some(),
        DYNAMIC_UNIT,
    );
    let source = dynamic_unit(&prelude, session.bindings(), statement);
    run_throwaway(service, session, DYNAMIC_UNIT, &source).map(|_| ())
}

fn run_throwaway<S: BuildService>(
    service: &mut S,
    session: &SessionState<S::Handle>,
    unit: &str,
    source: &str,
) -> Result<Value, EvalError> {
    debug!(unit, "compiling throwaway unit\n{}", source);
    let result = compile_and_run(service, session, unit, source);
    service.discard(unit);
    result
}

fn compile_and_run<S: BuildService>(
    service: &mut S,
    session: &SessionState<S::Handle>,
    unit: &str,
    source: &str,
) -> Result<Value, EvalError> {
    service.compile(unit, source)?;
    let handle = service.load(unit)?;
    seed(&handle, session.bindings())?;
    seed_holder(session)?;
    let routine = handle
        .find_member(THROWAWAY_ROUTINE, &[])
        .ok_or_else(|| EvalError::MemberNotFound {
            name: format!("{}.{}", unit, THROWAWAY_ROUTINE),
            shapes: String::new(),
        })?;
    Ok(handle.invoke(&routine, None, &[])?)
}
