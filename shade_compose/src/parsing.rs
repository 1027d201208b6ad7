//! regex based recognition of the handful of GLSL constructs the composition
//! engine needs to know about: function signatures, prototypes, global
//! variable declarations, `$placeholders` and `#version` pragmas.
//!
//! This is not a GLSL parser. Anything that does not look like one of these
//! constructs is passed through untouched.

use std::sync::LazyLock;
use regex::Regex;
use smallvec::SmallVec;
use crate::Version;

const TYPE: &str = concat!(
    r"(?:void|bool|int|uint|float|double|[biud]?vec[234]|d?mat[234](?:x[234])?",
    r"|[iu]?sampler(?:1D|2D|3D|Cube|2DRect|1DArray|2DArray|CubeArray|Buffer|2DMS|2DMSArray)",
    r"|sampler(?:1D|2D|2DRect|Cube|1DArray|2DArray|CubeArray)Shadow)",
);
const IDENT: &str = r"(?:[a-zA-Z_][a-zA-Z0-9_]*)";
const TEMPLATE_VAR: &str = r"(?:\$[a-zA-Z_][a-zA-Z0-9_]*|\$\{[a-zA-Z_][a-zA-Z0-9_]*\})";
const PARAM_QUALIFIERS: &str = r"(?:(?:in|out|inout|const|highp|mediump|lowp)\s+)*";

fn arg_list() -> String {
    let decl = format!(r"{PARAM_QUALIFIERS}{TYPE}\s+{IDENT}");
    format!(r"(?:{decl}(?:\s*,\s*{decl})*)?")
}

fn anon_arg_list() -> String {
    let decl = format!(r"{PARAM_QUALIFIERS}{TYPE}(?:\s+{IDENT})?");
    format!(r"(?:{decl}(?:\s*,\s*{decl})*)?")
}

// `vec4 name(float x, vec2 y) {`
static FUNC_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^\s*({TYPE})\s+({IDENT}|{TEMPLATE_VAR})\s*\((void|{})\)\s*\{{", arg_list()))
        .expect("function definition regex")
});

// `vec4 name(float, vec2);`
static FUNC_PROTOTYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*({TYPE})\s+({IDENT}|{TEMPLATE_VAR})\s*\((void|{})\)\s*;", anon_arg_list()))
        .expect("function prototype regex")
});

// `uniform vec4 u_a, u_b;`
static PROGRAM_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\s*(const|uniform|attribute|varying|in|out)\s+(?:(?:highp|mediump|lowp)\s+)?({TYPE})\s+({IDENT}(?:\s*,\s*{IDENT})*)\s*(?:=|;)"
    )).expect("program variable regex")
});

static TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{TYPE}$")).expect("type name regex")
});

static TEMPLATE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(TEMPLATE_VAR).expect("template variable regex")
});

static VERSION_PRAGMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*#version[ \t]+(\d+)(?:[ \t]+([A-Za-z_]+))?[^\n]*\n?").expect("version pragma regex")
});

static COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("comment regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arg {
    pub ty: String,
    pub name: String,
}

impl Arg {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self { ty: ty.into(), name: name.into() }
    }
}

pub type Args = SmallVec<[Arg; 4]>;

/// name, arguments and return type of a glsl function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: String,
    pub args: Args,
    pub rtype: String,
}

impl Signature {
    /// `vec4 name(vec4 pos, float t)`
    pub fn display(&self) -> String {
        let args = self.args.iter().map(|a| format!("{} {}", a.ty, a.name)).collect::<Vec<_>>().join(", ");
        format!("{} {}({})", self.rtype, self.name, args)
    }
}

/// a global variable declared verbatim in a template, e.g. `uniform vec4 u_color;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramVariable {
    pub qualifier: String,
    pub dtype: String,
    pub name: String,
}

fn parse_args(args: &str, anonymous: bool) -> Args {
    let args = args.trim();
    if args.is_empty() || args == "void" {
        return Args::new();
    }
    args.split(',').map(|arg| {
        let words = arg.split_whitespace().collect::<SmallVec<[&str; 4]>>();
        // the last word is the name, unless this is an unnamed prototype argument
        match words.as_slice() {
            [.., ty, name] if !(anonymous && TYPE_NAME.is_match(name)) => Arg::new(*ty, *name),
            [.., ty] => Arg::new(*ty, ""),
            [] => Arg::new("", ""),
        }
    }).collect()
}

fn signature_from_captures(caps: &regex::Captures, anonymous: bool) -> Signature {
    Signature {
        rtype: caps[1].to_string(),
        name: caps[2].to_string(),
        args: parse_args(caps.get(3).map_or("", |m| m.as_str()), anonymous),
    }
}

/// signature of the first function defined in `code`
pub fn parse_function_signature(code: &str) -> Option<Signature> {
    FUNC_DEF.captures(code).map(|caps| signature_from_captures(&caps, false))
}

/// signatures of all functions defined in `code`, in order of appearance
pub fn find_functions(code: &str) -> Vec<Signature> {
    FUNC_DEF.captures_iter(code).map(|caps| signature_from_captures(&caps, false)).collect()
}

/// signatures of all function prototypes (declarations without body) in `code`.
/// Unnamed prototype arguments get an empty name.
pub fn find_prototypes(code: &str) -> Vec<Signature> {
    code.lines()
        .filter_map(|line| FUNC_PROTOTYPE.captures(line))
        .map(|caps| signature_from_captures(&caps, true))
        .collect()
}

/// global variables declared in `code`, one entry per declared name
pub fn find_program_variables(code: &str) -> Vec<ProgramVariable> {
    code.lines()
        .filter_map(|line| PROGRAM_VARIABLE.captures(line))
        .flat_map(|caps| {
            let (qualifier, dtype) = (caps[1].to_string(), caps[2].to_string());
            caps[3].split(',').map(|name| ProgramVariable {
                qualifier: qualifier.clone(),
                dtype: dtype.clone(),
                name: name.trim().to_string(),
            }).collect::<Vec<_>>()
        })
        .collect()
}

/// names of all `$name` / `${name}` placeholders in `code` (without the `$`),
/// in order of appearance, without duplicates
pub fn find_template_variables(code: &str) -> Vec<String> {
    let mut found: Vec<String> = vec![];
    for m in TEMPLATE_VARIABLE.find_iter(code) {
        let name = m.as_str().trim_start_matches('$').trim_start_matches('{').trim_end_matches('}');
        if !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    }
    found
}

/// replaces every `$key` / `${key}` that is not followed by further identifier
/// characters with `value`
pub fn substitute_placeholder(code: &str, key: &str, value: &str) -> String {
    let braced = format!("${{{key}}}");
    let code = code.replace(&braced, value);
    let pattern = format!("${key}");

    let mut out = String::with_capacity(code.len());
    let mut rest = code.as_str();
    while let Some(pos) = rest.find(&pattern) {
        let after = &rest[pos + pattern.len()..];
        out.push_str(&rest[..pos]);
        match after.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            true => out.push_str(&pattern), // e.g. `$foo` inside of `$foobar`
            false => out.push_str(value),
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// the `#version` pragma declared in `code`, if any
pub fn find_version_pragma(code: &str) -> Option<Version> {
    VERSION_PRAGMA.captures(code).and_then(|caps| {
        let number = caps[1].parse().ok()?;
        Some(Version { number, profile: caps.get(2).map(|p| p.as_str().to_string()) })
    })
}

pub fn strip_version_pragma(code: &str) -> String { VERSION_PRAGMA.replace_all(code, "").into_owned() }

/// removes `//` and `/* */` comments
pub fn strip_comments(code: &str) -> String { COMMENT.replace_all(code, "").into_owned() }
