use std::{cell::{Ref, RefCell, RefMut}, ops::Deref};
use logwise::privacy::LogIt;

use crate::{
    compiler::{Names, StageContext},
    object::NodeKind,
    parsing::{self, Args, Signature},
    prettify,
    Bindable, Change, Error, FunctionChain, ShaderObject, Variable, Varying, Version, Warning,
};

/// builtin outputs that can be assigned at the end of a function
const BUILTIN_OUTPUTS: &[&str] = &["gl_PointSize", "gl_Position", "gl_FragColor"];

fn is_builtin_output(name: &str) -> bool { BUILTIN_OUTPUTS.iter().any(|prefix| name.starts_with(prefix)) }

/// implicit insertion points of every function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// right after the opening brace of the function body
    Pre,
    /// right before the closing brace of the function body
    Post,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Pre => "pre",
            Hook::Post => "post",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Placeholder(String),
    Hook(Hook),
}

impl Slot {
    fn key(&self) -> &str {
        match self {
            Slot::Placeholder(key) => key,
            Slot::Hook(hook) => hook.as_str(),
        }
    }
}

/// a target that is assigned at the end of a function, e.g. `gl_Position = ...;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// only valid on `main` functions
    Varying(Varying),
    /// `gl_Position`, `gl_PointSize` or `gl_FragColor` (optionally indexed or swizzled)
    Builtin(String),
}

impl Output {
    fn key(&self) -> String {
        match self {
            Output::Varying(varying) => varying.name().unwrap_or_default(),
            Output::Builtin(name) => name.clone(),
        }
    }
}

/// key of [`Function::set`], [`Function::get`] and [`Function::unbind`].
///
/// names select a placeholder, a hook (`"pre"`, `"post"`) or a builtin output
/// (`"gl_Position"`...), variables select a varying output.
#[derive(Debug, Clone)]
pub enum SlotKey {
    Name(String),
    Variable(Variable),
}

impl From<&str> for SlotKey { fn from(name: &str) -> Self { SlotKey::Name(name.to_string()) } }
impl From<String> for SlotKey { fn from(name: String) -> Self { SlotKey::Name(name) } }
impl From<Hook> for SlotKey { fn from(hook: Hook) -> Self { SlotKey::Name(hook.as_str().to_string()) } }
impl From<Variable> for SlotKey { fn from(var: Variable) -> Self { SlotKey::Variable(var) } }
impl From<&Variable> for SlotKey { fn from(var: &Variable) -> Self { SlotKey::Variable(var.clone()) } }
impl From<Varying> for SlotKey { fn from(var: Varying) -> Self { SlotKey::Variable(var.into()) } }
impl From<&Varying> for SlotKey { fn from(var: &Varying) -> Self { SlotKey::Variable(var.0.clone()) } }

enum Target {
    Slot(Slot),
    Output(Output),
}

#[derive(Default)]
pub(crate) struct MainData {
    chains: Vec<(String, FunctionChain)>,
}

pub(crate) struct FunctionData {
    /// comments and `#version` pragma removed
    code: String,
    version: Option<Version>,
    pub(crate) signature: Signature,
    template_vars: Vec<String>,
    expressions: Vec<(Slot, ShaderObject)>,
    replacements: Vec<(String, String)>,
    assignments: Vec<(Output, ShaderObject)>,
    pub(crate) main: Option<MainData>,
}

struct ParsedCode {
    code: String,
    version: Option<Version>,
    signature: Signature,
    template_vars: Vec<String>,
}

fn parse_code(code: &str, is_main: bool) -> Result<ParsedCode, Error> {
    let version = parsing::find_version_pragma(code);
    let code = parsing::strip_comments(&parsing::strip_version_pragma(code));
    let signature = match is_main {
        true => Signature { name: "main".into(), args: Args::new(), rtype: "void".into() },
        false => parsing::parse_function_signature(&code)
            .ok_or_else(|| Error::SignatureParse { listing: prettify::numbered_listing(&code) })?,
    };

    let mut template_vars = vec![];
    for var in parsing::find_template_variables(&code) {
        if var == signature.name || signature.name.strip_prefix('$') == Some(var.as_str()) {
            continue;
        }
        if var == Hook::Pre.as_str() || var == Hook::Post.as_str() {
            return Err(Error::ReservedTemplateVariable(var));
        }
        template_vars.push(var);
    }
    Ok(ParsedCode { code, version, signature, template_vars })
}

/// byte offset right after the opening brace of the definition of `name`
fn body_start(code: &str, name: &str) -> Option<usize> {
    code.match_indices(name)
        .filter(|(i, _)| !code[..*i].ends_with(|c: char| c.is_alphanumeric() || c == '_'))
        .find_map(|(i, _)| {
            let rest = code[i + name.len()..].trim_start().strip_prefix('(')?;
            let close = rest.find(')')?;
            let body = rest[close + 1..].trim_start().strip_prefix('{')?;
            Some(code.len() - body.len())
        })
}

/// binds `value` to the slot currently holding `existing` without creating a
/// new object, if that is possible
fn rebind_in_place(existing: &ShaderObject, value: &Bindable) -> Option<Result<(), Error>> {
    match value {
        Bindable::Object(obj) => (obj.id() == existing.id()).then_some(Ok(())),
        Bindable::Text(text) => existing.as_text().filter(|t| t.text() == *text).map(|_| Ok(())),
        Bindable::Value(value) => existing.as_variable()
            .filter(|var| !var.is_varying())
            .map(|var| var.set_value(value.clone())),
    }
}

impl ShaderObject {
    pub(crate) fn check_no_cycle(&self, value: &ShaderObject) -> Result<(), Error> {
        match value.id() == self.id() || value.depends_on(self) {
            true => Err(Error::DependencyCycle {
                function: self.name().unwrap_or_else(|| self.describe()),
                value: value.describe(),
            }),
            false => Ok(()),
        }
    }
}

/// a glsl function template.
///
/// the code may contain `$placeholder` markers which are replaced by the
/// expressions bound to them when the function is compiled. Binding objects
/// makes them dependencies of the function, so that their declarations end up
/// in the compiled shader as well.
///
/// ```text
/// vec4 transform(vec4 pos) {
///     return $matrix * pos;
/// }
/// ```
#[derive(Clone)]
pub struct Function(pub(crate) ShaderObject);

impl Function {
    pub fn new(code: &str) -> Result<Function, Error> { Function::build(code, None) }

    /// a function whose code references `deps` verbatim, e.g. helper
    /// functions it calls by name
    pub fn with_dependencies<D: Into<ShaderObject>>(code: &str, deps: impl IntoIterator<Item = D>) -> Result<Function, Error> {
        let function = Function::new(code)?;
        for dep in deps {
            let dep = dep.into();
            function.check_no_cycle(&dep)?;
            function.add_dependency(&dep);
        }
        Ok(function)
    }

    fn build(code: &str, main: Option<MainData>) -> Result<Function, Error> {
        let parsed = parse_code(code, main.is_some())?;
        Ok(Function(ShaderObject::from_kind(NodeKind::Function(RefCell::new(FunctionData {
            code: parsed.code,
            version: parsed.version,
            signature: parsed.signature,
            template_vars: parsed.template_vars,
            expressions: vec![],
            replacements: vec![],
            assignments: vec![],
            main,
        })))))
    }

    pub(crate) fn data(&self) -> Ref<'_, FunctionData> { unwrap_variant!(self.0.node_kind(), NodeKind::Function(data) => data.borrow()) }

    pub(crate) fn data_mut(&self) -> RefMut<'_, FunctionData> { unwrap_variant!(self.0.node_kind(), NodeKind::Function(data) => data.borrow_mut()) }

    pub fn code(&self) -> String { self.data().code.clone() }

    /// replaces the template code. Bindings are kept, placeholders that no
    /// longer exist are ignored when compiling.
    pub fn set_code(&self, code: &str) -> Result<(), Error> {
        let parsed = parse_code(code, self.is_main())?;
        {
            let mut data = self.data_mut();
            data.code = parsed.code;
            data.version = parsed.version;
            data.signature = parsed.signature;
            data.template_vars = parsed.template_vars;
        }
        self.notify(Change::CODE);
        Ok(())
    }

    pub fn name(&self) -> String { self.data().signature.name.clone() }

    pub fn args(&self) -> Args { self.data().signature.args.clone() }

    pub fn rtype(&self) -> String { self.data().signature.rtype.clone() }

    pub fn signature(&self) -> Signature { self.data().signature.clone() }

    /// names of all placeholders that can be bound, without the `$`
    pub fn template_vars(&self) -> Vec<String> { self.data().template_vars.clone() }

    /// the `#version` pragma the template declared, if any
    pub fn version_pragma(&self) -> Option<Version> { self.data().version.clone() }

    /// the function's own name, its argument names and every global variable
    /// its code declares verbatim. For `main` functions also the names and
    /// arguments of every other function defined in the code.
    pub fn static_names(&self) -> Vec<String> {
        let data = self.data();
        let mut names = parsing::find_program_variables(&data.code).into_iter().map(|v| v.name).collect::<Vec<_>>();
        names.extend(data.signature.args.iter().map(|arg| arg.name.clone()));
        names.push(data.signature.name.clone());
        if data.main.is_some() {
            for function in parsing::find_functions(&data.code).into_iter().filter(|f| f.name != "main") {
                names.push(function.name);
                names.extend(function.args.into_iter().map(|arg| arg.name));
            }
        }
        names.retain(|name| !name.is_empty());
        let mut unique = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        unique
    }

    /// binds `value` to `$key`. Fails if the code has no such placeholder.
    pub fn bind_placeholder(&self, key: &str, value: impl Into<Bindable>) -> Result<(), Error> {
        if !self.data().template_vars.iter().any(|var| var == key) {
            return Err(Error::UnknownPlaceholder { function: self.name(), key: key.to_string() });
        }
        self.bind_slot(Slot::Placeholder(key.to_string()), value.into())
    }

    /// binds `value` to a hook. Hooks always exist, they do not have to
    /// appear in the code.
    pub fn set_hook(&self, hook: Hook, value: impl Into<Bindable>) -> Result<(), Error> {
        self.bind_slot(Slot::Hook(hook), value.into())
    }

    fn bind_slot(&self, slot: Slot, value: Bindable) -> Result<(), Error> {
        let existing = self.data().expressions.iter().find(|(s, _)| *s == slot).map(|(_, obj)| obj.clone());
        if let Some(done) = existing.as_ref().and_then(|existing| rebind_in_place(existing, &value)) {
            return done;
        }

        let obj = ShaderObject::create(value, Some(slot.key()))?;
        self.check_no_cycle(&obj)?;
        {
            let mut data = self.data_mut();
            match data.expressions.iter_mut().find(|(s, _)| *s == slot) {
                Some(entry) => entry.1 = obj.clone(),
                None => data.expressions.push((slot.clone(), obj.clone())),
            }
            // text expressions may introduce new placeholders
            if let Some(text) = obj.as_text() {
                for var in parsing::find_template_variables(&text.text()) {
                    let reserved = var == Hook::Pre.as_str() || var == Hook::Post.as_str();
                    if !reserved && !data.template_vars.contains(&var) {
                        data.template_vars.push(var);
                    }
                }
            }
        }
        if let Some(old) = &existing {
            self.remove_dependency(old);
        }
        self.add_dependency(&obj);

        logwise::trace_sync!(
            "bound {value} to {key} of {function}",
            value = LogIt(&obj),
            key = LogIt(slot.key()),
            function = LogIt(&self.name())
        );
        self.notify(Change::BOTH);
        Ok(())
    }

    /// assigns `value` to `output` at the end of the function body
    pub fn bind_output(&self, output: Output, value: impl Into<Bindable>) -> Result<(), Error> {
        let function = self.name();
        match &output {
            Output::Varying(_) if function != "main" => return Err(Error::VaryingOutsideMain(function)),
            Output::Builtin(name) if !is_builtin_output(name) => {
                return Err(Error::UnknownPlaceholder { function, key: name.clone() });
            }
            _ => (),
        }

        let value = value.into();
        let existing = self.data().assignments.iter().find(|(o, _)| *o == output).map(|(_, obj)| obj.clone());
        if let Some(done) = existing.as_ref().and_then(|existing| rebind_in_place(existing, &value)) {
            return done;
        }

        let obj = ShaderObject::create(value, Some(output.key().as_str()))?;
        self.check_no_cycle(&obj)?;
        if let Output::Varying(varying) = &output {
            varying.check_link(&obj)?;
        }
        {
            let mut data = self.data_mut();
            match data.assignments.iter_mut().find(|(o, _)| *o == output) {
                Some(entry) => entry.1 = obj.clone(),
                None => data.assignments.push((output.clone(), obj.clone())),
            }
        }
        match (&existing, &output) {
            (Some(old), _) => self.remove_dependency(old),
            (None, Output::Varying(varying)) => self.add_dependency(varying),
            (None, Output::Builtin(_)) => (),
        }
        self.add_dependency(&obj);
        if let Output::Varying(varying) = &output {
            varying.link(&obj)?;
        }

        logwise::trace_sync!(
            "assigned {value} to {output} in {function}",
            value = LogIt(&obj),
            output = LogIt(&output.key()),
            function = LogIt(&function)
        );
        self.notify(Change::BOTH);
        Ok(())
    }

    fn target(&self, key: SlotKey) -> Result<Target, Error> {
        match key {
            SlotKey::Variable(var) => match var.as_varying() {
                Some(varying) => Ok(Target::Output(Output::Varying(varying))),
                None => Err(Error::NotAVarying {
                    function: self.name(),
                    variable: var.name().unwrap_or_default(),
                    kind: var.kind().map_or("untyped", |k| k.as_str()).to_string(),
                }),
            },
            SlotKey::Name(name) => Ok(match name.as_str() {
                "pre" => Target::Slot(Slot::Hook(Hook::Pre)),
                "post" => Target::Slot(Slot::Hook(Hook::Post)),
                builtin if is_builtin_output(builtin) => Target::Output(Output::Builtin(name)),
                _ => Target::Slot(Slot::Placeholder(name)),
            }),
        }
    }

    /// binds `value` to a placeholder, hook or output, depending on `key`.
    /// Assigning an equal value again does nothing.
    pub fn set(&self, key: impl Into<SlotKey>, value: impl Into<Bindable>) -> Result<(), Error> {
        match self.target(key.into())? {
            Target::Slot(Slot::Placeholder(key)) => self.bind_placeholder(&key, value),
            Target::Slot(Slot::Hook(hook)) => self.set_hook(hook, value),
            Target::Output(output) => self.bind_output(output, value),
        }
    }

    /// the object bound to `key`
    pub fn get(&self, key: impl Into<SlotKey>) -> Result<ShaderObject, Error> {
        let target = self.target(key.into())?;
        let data = self.data();
        let (found, key) = match &target {
            Target::Slot(slot) => {
                if let Slot::Placeholder(key) = slot {
                    if !data.template_vars.contains(key) {
                        return Err(Error::UnknownPlaceholder { function: data.signature.name.clone(), key: key.clone() });
                    }
                }
                (data.expressions.iter().find(|(s, _)| s == slot).map(|(_, obj)| obj.clone()), slot.key().to_string())
            }
            Target::Output(output) => {
                (data.assignments.iter().find(|(o, _)| o == output).map(|(_, obj)| obj.clone()), output.key())
            }
        };
        found.ok_or_else(|| Error::Unbound { function: data.signature.name.clone(), key })
    }

    /// removes the binding of `key` together with its dependency edges
    pub fn unbind(&self, key: impl Into<SlotKey>) -> Result<(), Error> {
        let target = self.target(key.into())?;
        let removed = {
            let mut data = self.data_mut();
            let function = data.signature.name.clone();
            match &target {
                Target::Slot(slot) => {
                    if let Slot::Placeholder(key) = slot {
                        if !data.template_vars.contains(key) {
                            return Err(Error::UnknownPlaceholder { function, key: key.clone() });
                        }
                    }
                    let i = data.expressions.iter().position(|(s, _)| s == slot)
                        .ok_or_else(|| Error::Unbound { function, key: slot.key().to_string() })?;
                    data.expressions.remove(i).1
                }
                Target::Output(output) => {
                    let i = data.assignments.iter().position(|(o, _)| o == output)
                        .ok_or_else(|| Error::Unbound { function, key: output.key() })?;
                    data.assignments.remove(i).1
                }
            }
        };
        self.remove_dependency(&removed);
        if let Target::Output(Output::Varying(varying)) = &target {
            self.remove_dependency(varying);
        }
        self.notify(Change::BOTH);
        Ok(())
    }

    /// replaces every occurrence of `from` in the code with `to` when compiling
    pub fn replace(&self, from: &str, to: &str) {
        {
            let mut data = self.data_mut();
            match data.replacements.iter_mut().find(|(f, _)| f == from) {
                Some((_, current)) if current == to => return,
                Some((_, current)) => *current = to.to_string(),
                None => data.replacements.push((from.to_string(), to.to_string())),
            }
        }
        self.notify(Change::CODE);
    }

    pub(crate) fn definition(&self, names: &Names, stage: &mut StageContext) -> Result<String, Error> {
        let fname = names.get(self)?.to_string();
        let data = self.data();
        let mut code = data.code.clone();
        if fname != data.signature.name {
            code = code.replace(&format!(" {}(", data.signature.name), &format!(" {fname}("));
        }
        for (from, to) in &data.replacements {
            code = code.replace(from, to);
        }

        let has_hook = |hook| data.expressions.iter().any(|(slot, _)| *slot == Slot::Hook(hook));
        let mut post_lines = data.assignments.iter().map(|(output, value)| {
            let target = match output {
                Output::Varying(varying) => names.get(varying)?.to_string(),
                Output::Builtin(name) => name.clone(),
            };
            Ok(format!("    {target} = {};", value.expression(names)?))
        }).collect::<Result<Vec<_>, Error>>()?;
        if has_hook(Hook::Post) {
            post_lines.push("    $post".to_string());
        }
        if !post_lines.is_empty() {
            let end = code.rfind('}').ok_or_else(|| Error::MissingFunctionBody(fname.clone()))?;
            code.insert_str(end, &format!("\n{}\n", post_lines.join("\n")));
        }

        if has_hook(Hook::Pre) {
            let body_start = body_start(&code, &fname).ok_or_else(|| Error::MissingFunctionBody(fname.clone()))?;
            code.insert_str(body_start, "\n    $pre\n");
        }

        let mut replaced = vec![];
        for (slot, value) in &data.expressions {
            code = parsing::substitute_placeholder(&code, slot.key(), &value.expression(names)?);
            replaced.push(slot.key().to_string());
        }

        if code.contains('$') {
            let placeholders = parsing::find_template_variables(&code);
            logwise::warn_sync!(
                "unsubstituted placeholders in {function}: {placeholders}, replacements made: {replaced}",
                function = LogIt(&fname),
                placeholders = LogIt(&placeholders),
                replaced = LogIt(&replaced)
            );
            stage.warnings.push(Warning::UnsubstitutedPlaceholders { function: fname, placeholders, replaced });
        }
        Ok(code + "\n")
    }
}

/// the `main` function of a shader stage.
///
/// the template is a complete shader: it may declare global variables and
/// define helper functions besides `main`, and is never renamed. Placeholders
/// can be turned into hook chains that other code attaches callbacks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MainFunction(pub(crate) Function);

impl MainFunction {
    pub fn new(code: &str) -> Result<MainFunction, Error> {
        Function::build(code, Some(MainData::default())).map(MainFunction)
    }

    /// binds a new empty [`FunctionChain`] named after `hook` to `$hook`
    pub fn add_chain(&self, hook: &str) -> Result<FunctionChain, Error> {
        let chain = FunctionChain::new(Some(hook), Vec::<ShaderObject>::new())?;
        self.bind_placeholder(hook, &chain)?;
        let mut data = self.data_mut();
        if let Some(main) = data.main.as_mut() {
            main.chains.retain(|(name, _)| name != hook);
            main.chains.push((hook.to_string(), chain.clone()));
        }
        Ok(chain)
    }

    pub fn chain(&self, hook: &str) -> Option<FunctionChain> {
        self.data().main.as_ref()
            .and_then(|main| main.chains.iter().find(|(name, _)| name == hook))
            .map(|(_, chain)| chain.clone())
    }

    /// appends `function` to the chain created by [`MainFunction::add_chain`]
    pub fn add_callback(&self, hook: &str, function: impl Into<ShaderObject>) -> Result<(), Error> {
        self.chain(hook).ok_or_else(|| Error::NoSuchChain(hook.to_string()))?.append(function)
    }

    pub fn remove_callback(&self, hook: &str, function: impl Into<ShaderObject>) -> Result<(), Error> {
        self.chain(hook).ok_or_else(|| Error::NoSuchChain(hook.to_string()))?.remove(function)
    }
}

impl Deref for MainFunction {
    type Target = Function;
    fn deref(&self) -> &Function { &self.0 }
}

impl From<MainFunction> for ShaderObject {
    fn from(main: MainFunction) -> Self { main.0.0 }
}

impl From<&MainFunction> for ShaderObject {
    fn from(main: &MainFunction) -> Self { main.0.0.clone() }
}
