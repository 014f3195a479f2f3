//! Code synthesis: whole compilation units built as text.
//!
//! Every unit starts with the session's library imports and, when the
//! method holder exists, a static import of it. Units that run user code
//! re-declare every binding as a static field so earlier state is visible.

use crate::binding::Binding;
use crate::classify::{matching_close, skip_quoted, split_top_level};
use crate::error::EvalError;
use crate::session::{ImportRecord, MethodDef};
use jolt_core::values::erase_generics;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

/// The entry routine unit and the routine inside it.
pub const ENTRY_UNIT: &str = "Eval";
pub const ENTRY_ROUTINE: &str = "main";
/// Holder of every method defined at the prompt.
pub const HOLDER_UNIT: &str = "Methods";
/// Throwaway unit whose `eval()` returns an expression's value.
pub const EXPRESSION_UNIT: &str = "Expression";
/// Throwaway unit whose `eval()` runs one statement.
pub const DYNAMIC_UNIT: &str = "Dynamic";
pub const THROWAWAY_ROUTINE: &str = "eval";

static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:class|interface)\s+([A-Za-z_$][\w$]*)").unwrap());

static STATIC_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bstatic\b").unwrap());

static LEADING_VISIBILITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(public|private|protected)\b").unwrap());

/// Import lines for a unit named `unit`.
pub fn prelude(imports: &[ImportRecord], holder_exists: bool, unit: &str) -> String {
    let mut out = String::new();
    for import in imports.iter().filter(|i| i.is_external()) {
        let _ = writeln!(out, "{}", import.text);
    }
    if holder_exists && unit != HOLDER_UNIT {
        let _ = writeln!(out, "import static {}.*;", HOLDER_UNIT);
    }
    out
}

/// `static <declaration>;` for each binding, one per line.
pub fn fields<'a>(bindings: impl IntoIterator<Item = &'a Binding>) -> String {
    let mut out = String::new();
    for binding in bindings {
        let _ = writeln!(out, "    static {};", binding.declaration());
    }
    out
}

pub fn expression_unit<'a>(
    prelude: &str,
    bindings: impl IntoIterator<Item = &'a Binding>,
    expression: &str,
) -> String {
    format!(
        "{}public class {} {{\n{}    public static Object {}() {{\n        return {};\n    }}\n}}\n",
        prelude,
        EXPRESSION_UNIT,
        fields(bindings),
        THROWAWAY_ROUTINE,
        expression.trim().trim_end_matches(';')
    )
}

pub fn dynamic_unit<'a>(
    prelude: &str,
    bindings: impl IntoIterator<Item = &'a Binding>,
    statement: &str,
) -> String {
    let statement = statement.trim();
    let terminator = if statement.ends_with(';') || statement.ends_with('}') {
        ""
    } else {
        ";"
    };
    format!(
        "{}public class {} {{\n{}    public static void {}() {{\n        {}{}\n    }}\n}}\n",
        prelude,
        DYNAMIC_UNIT,
        fields(bindings),
        THROWAWAY_ROUTINE,
        statement,
        terminator
    )
}

pub fn holder_unit<'a>(
    prelude: &str,
    bindings: impl IntoIterator<Item = &'a Binding>,
    methods: &[MethodDef],
) -> String {
    let mut out = format!("{}public class {} {{\n{}", prelude, HOLDER_UNIT, fields(bindings));
    for method in methods {
        let _ = writeln!(out, "    {}", method.text);
    }
    out.push_str("}\n");
    out
}

pub fn class_unit(prelude: &str, class_text: &str) -> String {
    format!("{}{}\n", prelude, class_text.trim())
}

/// Split a fragment holding several top-level classes into one text per
/// class, by brace depth.
pub fn split_classes(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let chunk = text[start..=i].trim();
                    if !chunk.is_empty() {
                        chunks.push(chunk.to_string());
                    }
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// The name a class declaration declares.
pub fn class_name(class_text: &str) -> Result<String, EvalError> {
    CLASS_NAME
        .captures(class_text)
        .map(|c| c[1].to_string())
        .ok_or_else(|| EvalError::shape("class declaration", class_text))
}

/// Make a method declaration static by editing its header only.
pub fn make_static(method_text: &str) -> String {
    let text = method_text.trim();
    let header_end = text.find('(').unwrap_or(text.len());
    if STATIC_WORD.is_match(&text[..header_end]) {
        return text.to_string();
    }
    match LEADING_VISIBILITY.find(text) {
        Some(m) => format!("{} static{}", &text[..m.end()], &text[m.end()..]),
        None => format!("static {}", text),
    }
}

/// Name and erased parameter types of a method declaration.
pub fn method_signature(method_text: &str) -> Result<(String, Vec<String>), EvalError> {
    let open = method_text
        .find('(')
        .ok_or_else(|| EvalError::shape("method declaration", method_text))?;
    let name = method_text[..open]
        .split_whitespace()
        .last()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| EvalError::shape("method declaration", method_text))?
        .to_string();
    let close = matching_close(method_text, open)
        .ok_or_else(|| EvalError::shape("method declaration", method_text))?;
    let params = split_top_level(&method_text[open + 1..close])
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(param_type)
        .collect();
    Ok((name, params))
}

fn param_type(param: &str) -> String {
    let param = param.strip_prefix("final ").unwrap_or(param).trim();
    let ty = match param.rfind(char::is_whitespace) {
        Some(at) => param[..at].trim(),
        None => param,
    };
    match ty.strip_suffix("...") {
        Some(elem) => format!("{}[]", erase_generics(elem)),
        None => erase_generics(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jolt_core::Value;

    #[test]
    fn prelude_replays_library_imports_and_holder() {
        let imports = vec![
            ImportRecord::parse("import java.util.List;").unwrap(),
            ImportRecord::parse("import Point;").unwrap(),
        ];
        assert_eq!(
            prelude(&imports, true, EXPRESSION_UNIT),
            "import java.util.List;\nimport static Methods.*;\n"
        );
        assert_eq!(prelude(&imports, true, HOLDER_UNIT), "import java.util.List;\n");
        assert_eq!(prelude(&[], false, ENTRY_UNIT), "");
    }

    #[test]
    fn expression_unit_redeclares_bindings() {
        let bindings = [Binding::new("x", "int", Value::Int(6))];
        let unit = expression_unit("", &bindings, "x * 2");
        assert_eq!(
            unit,
            "public class Expression {\n    static int x = 6;\n    public static Object eval() {\n        return x * 2;\n    }\n}\n"
        );
    }

    #[test]
    fn dynamic_unit_terminates_the_statement() {
        let unit = dynamic_unit("", [], "System.out.println(1)");
        assert!(unit.contains("        System.out.println(1);\n"));
    }

    #[test]
    fn splits_sibling_classes() {
        let chunks = split_classes(
            "class A { String s = \"}\"; } public class B extends A { void f() { } }",
        );
        assert_eq!(chunks.len(), 2);
        assert_eq!(class_name(&chunks[0]).unwrap(), "A");
        assert_eq!(class_name(&chunks[1]).unwrap(), "B");
        assert!(class_name("int x;").is_err());
    }

    #[test]
    fn statics_are_inserted_after_visibility() {
        assert_eq!(
            make_static("public int f(int a) { return a; }"),
            "public static int f(int a) { return a; }"
        );
        assert_eq!(make_static("int f() { return 1; }"), "static int f() { return 1; }");
        assert_eq!(
            make_static("private static void g() { }"),
            "private static void g() { }"
        );
        assert_eq!(
            make_static("public void h() { String s = \"static\"; }"),
            "public static void h() { String s = \"static\"; }"
        );
    }

    #[test]
    fn signatures_erase_names_and_generics() {
        assert_eq!(
            method_signature("public int add(final int a, List<String> b, int... rest) { }")
                .unwrap(),
            (
                "add".to_string(),
                vec!["int".to_string(), "List".to_string(), "int[]".to_string()]
            )
        );
        assert_eq!(
            method_signature("static void nop() {}").unwrap(),
            ("nop".to_string(), vec![])
        );
        assert!(matches!(
            method_signature("public int broken"),
            Err(EvalError::FragmentShape { .. })
        ));
    }
}
