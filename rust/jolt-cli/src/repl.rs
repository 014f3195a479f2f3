//! Interactive shell over the evaluation engine.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use jolt_engine::synth::{ENTRY_UNIT, HOLDER_UNIT};
use jolt_engine::{DefinitionKind, Engine, Outcome, ResetKind, HARD_RESET, SOFT_RESET};
use jolt_vm::VmService;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::{DefaultHistory, History, SearchDirection};
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing::{debug, warn};

use crate::colors::Palette;

/// Words highlighted and offered for completion.
const KEYWORDS: &[&str] = &[
    "abstract", "boolean", "break", "byte", "char", "class", "continue", "do", "double", "else",
    "extends", "false", "final", "float", "for", "if", "implements", "import", "instanceof",
    "int", "interface", "long", "new", "null", "private", "protected", "public", "return",
    "short", "static", "super", "this", "throw", "true", "var", "void", "while",
];

const TYPES: &[&str] = &[
    "String", "Object", "Integer", "Long", "Double", "Math", "System", "Character", "Boolean",
];

const COMMANDS: &[&str] = &[
    ":help", ":quit", ":state", ":history", ":load", ":clear", ":reset", ":reset-all",
];

/// Environment variable used to override the history location.
pub const REPL_HISTORY_PATH_ENV: &str = "JOLT_REPL_HISTORY_PATH";

// ── Line editor helper ──────────────────────────────────────────────

/// Names the session currently defines, refreshed after every fragment.
type SessionNames = Rc<RefCell<Vec<String>>>;

struct JoltHelper {
    palette: Palette,
    names: SessionNames,
}

impl Completer for JoltHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == ':' || c == '-'))
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((start, Vec::new()));
        }

        let pair = |s: &str| Pair {
            display: s.to_string(),
            replacement: s.to_string(),
        };
        let candidates = if line.trim_start() == word && word.starts_with(':') {
            COMMANDS
                .iter()
                .filter(|c| c.starts_with(word))
                .map(|c| pair(*c))
                .collect()
        } else {
            let names = self.names.borrow();
            KEYWORDS
                .iter()
                .chain(TYPES)
                .copied()
                .chain(names.iter().map(String::as_str))
                .filter(|c| c.starts_with(word))
                .map(pair)
                .collect()
        };
        Ok((start, candidates))
    }
}

impl Hinter for JoltHelper {
    type Hint = String;
}

impl Highlighter for JoltHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if !self.palette.enabled() || line.starts_with(':') {
            return Cow::Borrowed(line);
        }
        Cow::Owned(highlight_keywords(line, &self.palette))
    }
}

impl Validator for JoltHelper {}

impl Helper for JoltHelper {}

/// Paint keywords outside string and char literals.
fn highlight_keywords(line: &str, palette: &Palette) -> String {
    let mut out = String::with_capacity(line.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let flush = |word: &mut String, out: &mut String| {
        if KEYWORDS.contains(&word.as_str()) {
            out.push_str(&palette.cyan(word));
        } else {
            out.push_str(word);
        }
        word.clear();
    };
    for c in line.chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' || c == '$' {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    flush(&mut word, &mut out);
    out
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Quit,
    Help,
    State,
    History,
    Clear,
    Load(&'a str),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParsedCommand<'a> {
    NotACommand,
    UnknownCommand,
    InvalidUsage(&'static str),
    Command(ReplCommand<'a>),
}

/// Shell commands. `:reset` and `:reset-all` are fragments the engine
/// handles itself, so they are not commands here.
pub fn parse_repl_command(line: &str) -> ParsedCommand<'_> {
    let trimmed = line.trim();
    if trimmed == "exit" {
        return ParsedCommand::Command(ReplCommand::Quit);
    }
    if !trimmed.starts_with(':') || trimmed == SOFT_RESET || trimmed == HARD_RESET {
        return ParsedCommand::NotACommand;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    match cmd {
        ":quit" | ":q" | ":exit" => ParsedCommand::Command(ReplCommand::Quit),
        ":help" | ":h" => ParsedCommand::Command(ReplCommand::Help),
        ":state" | ":s" => ParsedCommand::Command(ReplCommand::State),
        ":history" => ParsedCommand::Command(ReplCommand::History),
        ":clear" | ":c" => ParsedCommand::Command(ReplCommand::Clear),
        ":load" | ":l" => match arg {
            Some(path) => ParsedCommand::Command(ReplCommand::Load(path)),
            None => ParsedCommand::InvalidUsage("Usage: :load <file>"),
        },
        _ => ParsedCommand::UnknownCommand,
    }
}

// ── Fragment accumulation ───────────────────────────────────────────

/// True while braces, parentheses or brackets are still open. Delimiters
/// inside string and char literals do not count.
pub fn needs_more_input(input: &str) -> bool {
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in input.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q || c == '\n' {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

/// Split a file into fragments the way the shell accumulates typed lines:
/// a fragment ends at the first line where every delimiter is closed.
pub fn split_fragments(source: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut buffer = String::new();
    for line in source.lines() {
        if buffer.is_empty() && (line.trim().is_empty() || line.trim_start().starts_with("//")) {
            continue;
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(line);
        if !needs_more_input(&buffer) {
            fragments.push(buffer.trim().to_string());
            buffer.clear();
        }
    }
    if !buffer.trim().is_empty() {
        fragments.push(buffer.trim().to_string());
    }
    fragments
}

// ── Output ──────────────────────────────────────────────────────────

/// Text to show for an outcome, if any.
pub fn format_outcome(outcome: &Outcome, palette: &Palette) -> Option<String> {
    match outcome {
        Outcome::Nothing | Outcome::Executed => None,
        Outcome::Value { rendered, .. } => Some(rendered.clone()),
        Outcome::Declared { name, rendered, .. } | Outcome::Assigned { name, rendered, .. } => {
            Some(format!("{} {} {}", name, palette.gray("==>"), rendered))
        }
        Outcome::Defined { kind, names } => {
            let kind = match kind {
                DefinitionKind::Class => "class",
                DefinitionKind::Method => "method",
            };
            Some(palette.gray(&format!("(defined {} {})", kind, names.join(", "))))
        }
        Outcome::Imported { symbol, .. } => Some(palette.gray(&format!("(imported {})", symbol))),
        Outcome::Reset(ResetKind::Soft) => Some(palette.gray("(routine cleared)")),
        Outcome::Reset(ResetKind::Hard) => Some(palette.gray("(session cleared)")),
        Outcome::Failed(report) => Some(format!(
            "{} {}\n{}",
            palette.red("Error:"),
            report.error,
            palette.gray(report.state.trim_end())
        )),
    }
}

/// An engine plus the presentation settings of one shell session.
pub struct Shell {
    engine: Engine<VmService>,
    palette: Palette,
}

impl Shell {
    pub fn new(engine: Engine<VmService>, palette: Palette) -> Self {
        Self { engine, palette }
    }

    pub fn engine(&self) -> &Engine<VmService> {
        &self.engine
    }

    /// Evaluate one fragment and print what it produced. Program output has
    /// already gone to stdout by the time this returns.
    pub fn eval_fragment(&mut self, fragment: &str) -> Outcome {
        let outcome = self.engine.evaluate(fragment);
        if let Some(text) = format_outcome(&outcome, &self.palette) {
            if matches!(outcome, Outcome::Failed(_)) {
                eprintln!("{}", text);
            } else {
                println!("{}", text);
            }
        }
        outcome
    }

    /// Evaluate every fragment of a file. Returns how many failed.
    pub fn eval_file(&mut self, path: &Path, keep_going: bool) -> io::Result<usize> {
        let source = fs::read_to_string(path)?;
        let mut failures = 0;
        for fragment in split_fragments(&source) {
            if let Outcome::Failed(_) = self.eval_fragment(&fragment) {
                failures += 1;
                if !keep_going {
                    break;
                }
            }
        }
        Ok(failures)
    }

    /// Names worth completing: bindings, session methods and classes.
    pub fn session_names(&self) -> Vec<String> {
        let session = self.engine.session();
        let mut names: Vec<String> = session
            .bindings()
            .map(|b| b.name.clone())
            .chain(session.methods().iter().map(|m| m.name.clone()))
            .chain(
                session
                    .units()
                    .map(|u| u.name.clone())
                    .filter(|n| n != ENTRY_UNIT && n != HOLDER_UNIT),
            )
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn shutdown(&mut self) {
        if let Err(err) = self.engine.shutdown() {
            warn!(error = %err, "could not clean up the session");
        }
    }
}

pub struct ReplOptions {
    pub palette: Palette,
    pub history_path: Option<PathBuf>,
}

pub fn run_repl(mut shell: Shell, options: ReplOptions) -> Result<(), ReadlineError> {
    let palette = options.palette;
    println!("{}", palette.bold(&palette.cyan(&format!("Jolt v{}", env!("CARGO_PKG_VERSION")))));
    println!(
        "{}\n",
        palette.gray("Type :help for available commands, :quit to exit.")
    );

    let config = rustyline::Config::builder().auto_add_history(true).build();
    let mut rl: Editor<JoltHelper, DefaultHistory> = Editor::with_config(config)?;
    let names = SessionNames::default();
    rl.set_helper(Some(JoltHelper {
        palette,
        names: names.clone(),
    }));

    if let Some(path) = options.history_path.as_deref().filter(|p| p.exists()) {
        if let Err(err) = rl.load_history(path) {
            eprintln!(
                "{} failed to load history from {}: {}",
                palette.yellow("Warning:"),
                path.display(),
                err
            );
        }
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            format!("{} ", palette.green("jolt>"))
        } else {
            format!("{}  ", palette.gray("..."))
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match handle_command(&line, &mut rl, &mut shell, &palette) {
                        Some(true) => continue,
                        Some(false) => break,
                        None => {}
                    }
                } else {
                    buffer.push('\n');
                }
                buffer.push_str(&line);
                if needs_more_input(&buffer) {
                    continue;
                }
                let fragment = std::mem::take(&mut buffer);
                shell.eval_fragment(&fragment);
                *names.borrow_mut() = shell.session_names();
            }
            Err(ReadlineError::Interrupted) => {
                if buffer.is_empty() {
                    println!("{}", palette.gray("(use :quit to exit)"));
                } else {
                    buffer.clear();
                    println!("{}", palette.gray("(input discarded)"));
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                shell.shutdown();
                return Err(err);
            }
        }
    }

    if let Some(path) = options.history_path.as_deref() {
        save_history(&mut rl, path, &palette);
    }
    shell.shutdown();
    println!("{}", palette.cyan("Goodbye!"));
    Ok(())
}

fn save_history(rl: &mut Editor<JoltHelper, DefaultHistory>, path: &Path, palette: &Palette) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!(
                "{} failed to create history directory {}: {}",
                palette.yellow("Warning:"),
                parent.display(),
                err
            );
            return;
        }
    }
    if let Err(err) = rl.save_history(path) {
        eprintln!(
            "{} failed to save history to {}: {}",
            palette.yellow("Warning:"),
            path.display(),
            err
        );
    }
}

/// Some(true) to keep reading, Some(false) to quit, None if not a command.
fn handle_command(
    line: &str,
    rl: &mut Editor<JoltHelper, DefaultHistory>,
    shell: &mut Shell,
    palette: &Palette,
) -> Option<bool> {
    match parse_repl_command(line) {
        ParsedCommand::NotACommand => None,
        ParsedCommand::UnknownCommand => {
            eprintln!("{} unknown command. Type :help for usage.", palette.red("Error:"));
            Some(true)
        }
        ParsedCommand::InvalidUsage(usage) => {
            eprintln!("{} {}", palette.red("Error:"), usage);
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Quit) => Some(false),
        ParsedCommand::Command(ReplCommand::Help) => {
            print_help(palette);
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::State) => {
            println!("{}", shell.engine().session().render().trim_end());
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::History) => {
            let history = rl.history();
            for i in 0..history.len() {
                if let Ok(Some(result)) = history.get(i, SearchDirection::Forward) {
                    println!("{:>4} {}", palette.gray(&(i + 1).to_string()), result.entry);
                }
            }
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Clear) => {
            print!("\x1b[2J\x1b[H");
            io::stdout().flush().ok();
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Load(path)) => {
            debug!(path, "loading fragments");
            match shell.eval_file(Path::new(path), true) {
                Ok(0) => {}
                Ok(failed) => eprintln!(
                    "{} {} fragment(s) failed",
                    palette.yellow("Warning:"),
                    failed
                ),
                Err(err) => eprintln!("{} cannot read {}: {}", palette.red("Error:"), path, err),
            }
            Some(true)
        }
    }
}

/// Resolve the history file.
///
/// `JOLT_REPL_HISTORY_PATH` wins over the configured `history_path`. Either
/// may be absolute, `~/...`, or relative to HOME. Without either, history
/// lives in `${HOME}/.jolt/repl_history`.
pub fn resolve_history_path(
    home: Option<&Path>,
    env_override: Option<&str>,
    configured: Option<&str>,
) -> Option<PathBuf> {
    let raw = [env_override, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|p| !p.is_empty());
    let Some(raw) = raw else {
        return home.map(|h| h.join(".jolt").join("repl_history"));
    };
    if raw == "~" {
        return home.map(Path::to_path_buf);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home.map(|h| h.join(rest));
    }
    let path = PathBuf::from(raw);
    if path.is_relative() {
        return home.map(|h| h.join(path));
    }
    Some(path)
}

pub fn history_path(configured: Option<&str>) -> Option<PathBuf> {
    let override_path = std::env::var(REPL_HISTORY_PATH_ENV).ok();
    resolve_history_path(
        dirs::home_dir().as_deref(),
        override_path.as_deref(),
        configured,
    )
}

fn print_help(palette: &Palette) {
    let row = |cmd: &str, text: &str| println!("  {:<24}{}", palette.cyan(cmd), palette.gray(text));
    println!("{}", palette.bold("Commands:"));
    row(":help, :h", "Show this help");
    row(":quit, :q, exit", "Exit the shell");
    row(":state, :s", "Show bindings, imports, units and methods");
    row(":history", "Show input history");
    row(":load <file>", "Evaluate every fragment in a file");
    row(":clear, :c", "Clear the terminal screen");
    row(":reset", "Clear the entry routine, keep bindings");
    row(":reset-all", "Forget the whole session");
    println!();
    println!("{}", palette.bold("Fragments:"));
    println!("  {}", palette.gray("int x = 5;            declare a binding"));
    println!("  {}", palette.gray("x = x + 1;            update it"));
    println!("  {}", palette.gray("int sq(int n) { ... } define a session method"));
    println!("  {}", palette.gray("class Point { ... }   define a class"));
    println!("  {}", palette.gray("sq(x)                 evaluate an expression"));
    println!(
        "  {}",
        palette.gray(&format!(
            "History is kept across sessions (override with ${})",
            REPL_HISTORY_PATH_ENV
        ))
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_more_input() {
        assert!(needs_more_input("class A {"));
        assert!(needs_more_input("int f(int a,"));
        assert!(!needs_more_input("String s = \"{\";"));
        assert!(!needs_more_input("char c = '}';"));
        assert!(!needs_more_input("class A { void f() { } }"));
    }

    #[test]
    fn test_parse_repl_command() {
        assert_eq!(
            parse_repl_command(":load demo.jsh"),
            ParsedCommand::Command(ReplCommand::Load("demo.jsh"))
        );
        assert_eq!(
            parse_repl_command(":load"),
            ParsedCommand::InvalidUsage("Usage: :load <file>")
        );
        assert_eq!(parse_repl_command("exit"), ParsedCommand::Command(ReplCommand::Quit));
        assert_eq!(parse_repl_command(":reset"), ParsedCommand::NotACommand);
        assert_eq!(parse_repl_command(":reset-all"), ParsedCommand::NotACommand);
        assert_eq!(parse_repl_command(":nope"), ParsedCommand::UnknownCommand);
        assert_eq!(parse_repl_command("x + 1"), ParsedCommand::NotACommand);
    }

    #[test]
    fn test_resolve_history_path() {
        let home = Path::new("/home/tester");
        assert_eq!(
            resolve_history_path(Some(home), None, None),
            Some(PathBuf::from("/home/tester/.jolt/repl_history"))
        );
        assert_eq!(
            resolve_history_path(Some(home), None, Some("~/h.log")),
            Some(PathBuf::from("/home/tester/h.log"))
        );
        assert_eq!(
            resolve_history_path(Some(home), Some("/tmp/r.log"), Some("~/h.log")),
            Some(PathBuf::from("/tmp/r.log"))
        );
        assert_eq!(
            resolve_history_path(Some(home), Some("rel/r.log"), None),
            Some(PathBuf::from("/home/tester/rel/r.log"))
        );
        assert_eq!(resolve_history_path(None, None, Some("rel.log")), None);
    }

    #[test]
    fn test_highlight_skips_literals() {
        let palette = Palette::new(true);
        let line = highlight_keywords("int s = \"int\";", &palette);
        assert_eq!(line, format!("{} s = \"int\";", palette.cyan("int")));
    }
}
