use thiserror::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // wiring errors, raised at the point of misuse
    #[error("invalid template variable '{}' for function '{}'", .key, .function)]
    UnknownPlaceholder {function: String, key: String},
    #[error("no value bound to '{}' in function '{}'", .key, .function)]
    Unbound {function: String, key: String},
    #[error("varying assignment is only allowed in 'main', not in '{}'", .0)]
    VaryingOutsideMain(String),
    #[error("variable assignment is only allowed for varyings, not for {} '{}' (in '{}')", .kind, .variable, .function)]
    NotAVarying {function: String, variable: String, kind: String},
    #[error("function '{}' requires {} arguments (got {})", .function, .expected, .found)]
    ArgumentCount {function: String, expected: usize, found: usize},
    #[error("only functions and function chains can be called, not {}", .0)]
    NotCallable(String),
    #[error("variable specification '{}' must be of the form \"vtype dtype name\" or \"const dtype name value\"", .0)]
    MalformedVariableSpec(String),
    #[error("'{}' is not a valid variable kind", .0)]
    InvalidVariableKind(String),
    #[error("variable '{}' is locked to type \"{} {}\"; cannot assign a value of type \"{} {}\"", .variable, .locked_kind, .locked_dtype, .found_kind, .found_dtype)]
    TypeLocked {variable: String, locked_kind: String, locked_dtype: String, found_kind: String, found_dtype: String},
    #[error("cannot assign a value directly to varying '{}'", .0)]
    ValueOnVarying(String),
    #[error("cannot make a shader variable from {}", .0)]
    UnsupportedValue(String),
    #[error("template variable '${}' is reserved for hooks", .0)]
    ReservedTemplateVariable(String),
    #[error("binding {} to '{}' would make it depend on itself", .value, .function)]
    DependencyCycle {function: String, value: String},
    #[error("varying '{}' cannot take its type from {}, which depends on it", .varying, .source)]
    LinkCycle {varying: String, r#source: String},
    #[error("the code of function chain '{}' is derived from its members and cannot be set", .0)]
    CodeOnChain(String),
    #[error("cannot chain output '{}' of function '{}' to the input of '{}'", .output, .previous, .next)]
    ChainMismatch {output: String, previous: String, next: String},
    #[error("function chain '{}' mixes void and non-void members ('{}')", .chain, .member)]
    ChainMixedVoid {chain: String, member: String},
    #[error("function '{}' is not part of chain '{}'", .function, .chain)]
    NotInChain {chain: String, function: String},
    #[error("index {} is out of range for function chain '{}' of length {}", .index, .chain, .len)]
    ChainIndex {chain: String, index: usize, len: usize},
    #[error("'{}' has no hook chain", .0)]
    NoSuchChain(String),

    // compile-time errors
    #[error("failed to parse function signature:\n{}", .listing)]
    SignatureParse {listing: String},
    #[error("could not find the beginning of the body of function '{}'", .0)]
    MissingFunctionBody(String),
    #[error("object {} was not part of the compiled graph", .0)]
    UnknownObject(String),
    #[error("variable '{}' has no {}", .variable, .missing)]
    MissingType {variable: String, missing: &'static str},
    #[error("could not find a free name for '{}' after {} attempts", .name, .attempts)]
    NameCollision {name: String, attempts: u32},
    #[error("shader '{}' declares conflicting versions '{}' and '{}'", .shader, .first, .second)]
    VersionConflict {shader: String, first: String, second: String},
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("unsubstituted placeholders in '{}': {:?}\n  replacements made: {:?}", .function, .placeholders, .replaced)]
    UnsubstitutedPlaceholders {function: String, placeholders: Vec<String>, replaced: Vec<String>},
}
