use std::{collections::HashMap, fmt::Display, ops::Index};
use smallvec::SmallVec;
use logwise::privacy::LogIt;

use crate::{
    glsl_words, prettify, CompileSettings, Error, Naming, ObjectId, ShaderObject, Version, Warning,
};

/// the names assigned to the objects of one compilation
#[derive(Debug, Clone, Default)]
pub struct Names(HashMap<ObjectId, String>);

impl Names {
    pub fn get(&self, obj: &ShaderObject) -> Result<&str, Error> {
        self.0.get(&obj.id()).map(String::as_str).ok_or_else(|| Error::UnknownObject(obj.describe()))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// per stage state while definitions are generated
pub(crate) struct StageContext {
    pub(crate) stage: String,
    pub(crate) version: Option<Version>,
    pub(crate) warnings: Vec<Warning>,
}

impl StageContext {
    pub(crate) fn uses_in_out(&self) -> bool { self.version.as_ref().is_some_and(Version::uses_in_out) }

    pub(crate) fn is_vertex(&self) -> bool { matches!(self.stage.as_str(), "vert" | "vertex") }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().enumerate().all(|(i, c)|
        match i {
            0 => c.is_ascii_alphabetic(),
            _ => c.is_ascii_alphanumeric(),
        } || c == '_'
    )
}

fn ident_satisfies_glsl_constraints(s: &str) -> bool {
    !(
        s.starts_with("gl_") ||
        s.starts_with("__") ||
        glsl_words::is_reserved(s)
    )
}

const ANONYMOUS_IDENTIFIER_PREFIX: &str = "_";

/// turns a declared name into something that can start an identifier.
/// Reserved words are left alone, they are resolved by suffixing.
fn valid_base_ident(name: &str) -> String {
    let name = name.trim_start_matches('$');
    let mut ident = name.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect::<String>();
    if !ident.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        ident.insert_str(0, ANONYMOUS_IDENTIFIER_PREFIX);
    }
    match (ident.starts_with("__"), ident.starts_with("gl_")) {
        (true, _) => format!("{ANONYMOUS_IDENTIFIER_PREFIX}0{ident}"),
        (_, true) => ANONYMOUS_IDENTIFIER_PREFIX.to_string() + &ident,
        _ => ident,
    }
}

/// `base` shortened (at a char boundary) so that `suffix` fits into `max_len`
fn truncated(base: &str, suffix: &str, max_len: usize) -> String {
    let mut len = max_len.saturating_sub(suffix.len()).min(base.len()).max(1);
    while !base.is_char_boundary(len) {
        len -= 1;
    }
    format!("{}{suffix}", &base[..len])
}

enum NameOwner {
    /// declared verbatim by the code of these objects
    Static(SmallVec<[ObjectId; 2]>),
    Assigned(ObjectId),
}

struct Namespaces {
    stages: Vec<HashMap<String, NameOwner>>,
    /// last suffix handed out per base name
    counters: HashMap<String, u32>,
}

impl Namespaces {
    fn is_available(&self, name: &str, obj: ObjectId, scope: &[usize]) -> bool {
        is_ident(name) && ident_satisfies_glsl_constraints(name) &&
        scope.iter().all(|stage| match self.stages[*stage].get(name) {
            None => true,
            Some(NameOwner::Static(owners)) => owners.contains(&obj),
            Some(NameOwner::Assigned(owner)) => *owner == obj,
        })
    }

    fn assign(&mut self, name: &str, obj: ObjectId, scope: &[usize]) {
        for stage in scope {
            self.stages[*stage].insert(name.to_string(), NameOwner::Assigned(obj));
        }
    }

    fn pretty_name(&mut self, base: &str, obj: ObjectId, scope: &[usize], settings: &CompileSettings) -> Result<String, Error> {
        if self.is_available(base, obj, scope) {
            return Ok(base.to_string());
        }
        loop {
            let counter = self.counters.entry(base.to_string()).or_insert(0);
            *counter += 1;
            if *counter > settings.max_suffix {
                return Err(Error::NameCollision { name: base.to_string(), attempts: settings.max_suffix });
            }
            let name = format!("{base}_{counter}");
            if self.is_available(&name, obj, scope) {
                return Ok(name);
            }
        }
    }
}

/// the compiled source of every shader stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledShaders {
    stages: Vec<(String, String)>,
    warnings: Vec<Warning>,
}

impl CompiledShaders {
    pub fn get(&self, stage: &str) -> Option<&str> {
        self.stages.iter().find(|(name, _)| name == stage).map(|(_, code)| code.as_str())
    }

    /// `(stage, source)` pairs in the order the stages were given to the [`Compiler`]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.stages.iter().map(|(stage, code)| (stage.as_str(), code.as_str()))
    }

    pub fn warnings(&self) -> &[Warning] { &self.warnings }

    /// like `to_string()` but with ansi color codes for syntax highlighting
    pub fn to_string_colored(&self) -> String {
        self.stages.iter()
            .map(|(stage, code)| format!("{stage}:\n{}", prettify::numbered_listing_colored(code)))
            .collect()
    }
}

impl Index<&str> for CompiledShaders {
    type Output = str;

    /// panics if there is no stage named `stage`
    fn index(&self, stage: &str) -> &str {
        match self.get(stage) {
            Some(code) => code,
            None => panic!("no shader stage named '{stage}' was compiled"),
        }
    }
}

impl Display for CompiledShaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (stage, code) in &self.stages {
            writeln!(f, "{stage}:")?;
            write!(f, "{}", prettify::numbered_listing(code))?;
        }
        Ok(())
    }
}

/// turns the dependency graphs of one or more root objects into glsl
/// source, one string per stage.
///
/// all objects of all stages are named together: variables get the same
/// name in every stage, other objects are only kept apart from the objects
/// of the stages they appear in.
pub struct Compiler {
    shaders: Vec<(String, ShaderObject)>,
    settings: CompileSettings,
    names: Option<Names>,
}

impl Compiler {
    /// `shaders` are `(stage, root)` pairs, e.g. `("vert", vertex_main)`
    pub fn new<K: Into<String>, S: Into<ShaderObject>>(shaders: impl IntoIterator<Item = (K, S)>) -> Compiler {
        Compiler::with_settings(shaders, CompileSettings::default())
    }

    pub fn with_settings<K: Into<String>, S: Into<ShaderObject>>(shaders: impl IntoIterator<Item = (K, S)>, settings: CompileSettings) -> Compiler {
        Compiler {
            shaders: shaders.into_iter().map(|(stage, root)| (stage.into(), root.into())).collect(),
            settings,
            names: None,
        }
    }

    pub fn settings(&self) -> &CompileSettings { &self.settings }

    /// the name `obj` got in the last successful [`Compiler::compile`]
    pub fn name_of(&self, obj: &ShaderObject) -> Result<&str, Error> {
        match &self.names {
            Some(names) => names.get(obj),
            None => Err(Error::UnknownObject(obj.describe())),
        }
    }

    pub fn compile(&mut self) -> Result<CompiledShaders, Error> {
        let stage_deps = self.shaders.iter().map(|(_, root)| stage_dependencies(root)).collect::<Vec<_>>();
        let versions = self.shaders.iter().zip(&stage_deps)
            .map(|((stage, _), deps)| self.stage_version(stage, deps))
            .collect::<Result<Vec<_>, _>>()?;

        let names = match self.settings.naming {
            Naming::Pretty => self.pretty_names(&stage_deps)?,
            Naming::Fast => self.fast_names(&stage_deps),
        };

        let mut compiled = CompiledShaders::default();
        for (((stage, _), deps), version) in self.shaders.iter().zip(&stage_deps).zip(versions) {
            let mut context = StageContext { stage: stage.clone(), version, warnings: vec![] };
            let mut parts = vec![];
            if let Some(version) = &context.version {
                parts.push(format!("{}\n", version.pragma()));
            }
            for dep in deps {
                if let Some(definition) = dep.definition(&names, &mut context)? {
                    parts.push(definition);
                }
            }
            let code = parts.join("\n");
            logwise::trace_sync!(
                "compiled stage {stage} from {count} objects:\n{code}",
                stage = LogIt(stage),
                count = deps.len(),
                code = LogIt(&code)
            );
            compiled.warnings.append(&mut context.warnings);
            compiled.stages.push((stage.clone(), code));
        }
        self.names = Some(names);
        Ok(compiled)
    }

    fn stage_version(&self, stage: &str, deps: &[ShaderObject]) -> Result<Option<Version>, Error> {
        let mut found: Option<Version> = None;
        for version in deps.iter().filter_map(|dep| dep.as_function()?.version_pragma()) {
            match &found {
                Some(first) if *first != version => return Err(Error::VersionConflict {
                    shader: stage.to_string(),
                    first: first.to_string(),
                    second: version.to_string(),
                }),
                Some(_) => (),
                None => found = Some(version),
            }
        }
        Ok(found.or_else(|| self.settings.default_version.clone()))
    }

    /// objects to name, mains first since they are never renamed, then in
    /// the order they are defined
    fn naming_order<'a>(&self, stage_deps: &'a [Vec<ShaderObject>]) -> Vec<(&'a ShaderObject, Vec<usize>)> {
        let all_stages = (0..stage_deps.len()).collect::<Vec<_>>();
        let mut order: Vec<(&ShaderObject, Vec<usize>)> = vec![];
        for (stage, deps) in stage_deps.iter().enumerate() {
            for dep in deps {
                match order.iter_mut().find(|(obj, _)| obj.id() == dep.id()) {
                    Some((_, scope)) => if !scope.contains(&stage) { scope.push(stage) },
                    None => order.push((dep, vec![stage])),
                }
            }
        }
        for (obj, scope) in &mut order {
            if obj.is_variable() {
                *scope = all_stages.clone();
            }
        }
        order.sort_by_key(|(obj, _)| !is_entry_point(obj));
        order
    }

    fn pretty_names(&self, stage_deps: &[Vec<ShaderObject>]) -> Result<Names, Error> {
        let mut namespaces = Namespaces {
            stages: stage_deps.iter().map(|_| HashMap::new()).collect(),
            counters: HashMap::new(),
        };
        for (stage, deps) in stage_deps.iter().enumerate() {
            for dep in deps {
                for name in dep.static_names() {
                    match namespaces.stages[stage].entry(name).or_insert_with(|| NameOwner::Static(SmallVec::new())) {
                        NameOwner::Static(owners) => if !owners.contains(&dep.id()) { owners.push(dep.id()) },
                        NameOwner::Assigned(_) => (),
                    }
                }
            }
        }

        let mut names = Names::default();
        for (obj, scope) in self.naming_order(stage_deps) {
            let name = match is_entry_point(obj) {
                true => "main".to_string(),
                false => {
                    let base = valid_base_ident(&obj.name().unwrap_or_else(|| "var".into()));
                    namespaces.pretty_name(&base, obj.id(), &scope, &self.settings)?
                }
            };
            namespaces.assign(&name, obj.id(), &scope);
            names.0.insert(obj.id(), name);
        }
        Ok(names)
    }

    fn fast_names(&self, stage_deps: &[Vec<ShaderObject>]) -> Names {
        let mut names = Names::default();
        for (obj, _) in self.naming_order(stage_deps) {
            let name = match is_entry_point(obj) {
                true => "main".to_string(),
                false => {
                    let base = valid_base_ident(&obj.name().unwrap_or_else(|| "var".into()));
                    truncated(&base, &format!("_{}", obj.id()), self.settings.max_name_len)
                }
            };
            names.0.insert(obj.id(), name);
        }
        names
    }
}

/// functions declaring `main` keep that name in every naming mode
fn is_entry_point(obj: &ShaderObject) -> bool {
    obj.as_function().is_some_and(|function| function.name() == "main")
}

/// the objects of one stage that need a name or a definition, each once,
/// dependencies before dependents
fn stage_dependencies(root: &ShaderObject) -> Vec<ShaderObject> {
    let mut deps: Vec<ShaderObject> = vec![];
    for dep in root.dependencies(true) {
        let named = dep.is_variable() || dep.name().is_some();
        if named && !deps.contains(&dep) {
            deps.push(dep);
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bindable, Function, MainFunction, Variable, VariableKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn base_idents() {
        assert_eq!(valid_base_ident("position"), "position");
        assert_eq!(valid_base_ident("$name"), "name");
        assert_eq!(valid_base_ident("gl_Foo"), "_gl_Foo");
        assert_eq!(valid_base_ident("__x"), "_0__x");
        assert_eq!(valid_base_ident("2d"), "_2d");
        assert_eq!(valid_base_ident("a-b"), "a_b");
    }

    #[test]
    fn truncation() {
        assert_eq!(truncated("abcdefghij", "", 8), "abcdefgh");
        assert_eq!(truncated("abcdefghij", "_12", 8), "abcde_12");
        assert_eq!(truncated("ab", "_1", 32), "ab_1");
    }

    #[test]
    fn collisions_get_suffixes() {
        let a = Variable::parse("uniform float u_x").unwrap();
        let b = Variable::parse("uniform float u_x").unwrap();
        let f = Function::new("float f() { return $a + $b; }").unwrap();
        f.set("a", &a).unwrap();
        f.set("b", &b).unwrap();

        let mut compiler = Compiler::new([("obj", &f)]);
        let code = compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&a).unwrap(), "u_x");
        assert_eq!(compiler.name_of(&b).unwrap(), "u_x_1");
        assert!(code["obj"].contains("return u_x + u_x_1;"));
    }

    #[test]
    fn reserved_words_are_never_assigned() {
        let f = Function::new("float f() { return $a + $b + $c; }").unwrap();
        let keyword = Variable::new(Some("uniform"), None, Some(VariableKind::Uniform), Some("float")).unwrap();
        let builtin = Variable::new(Some("gl_Thing"), None, Some(VariableKind::Uniform), Some("float")).unwrap();
        let function = Function::new("float vec4() { return 1.0; }").unwrap();
        f.set("a", &keyword).unwrap();
        f.set("b", &builtin).unwrap();
        f.set("c", function.call(Vec::<Bindable>::new()).unwrap()).unwrap();

        let mut compiler = Compiler::new([("obj", &f)]);
        let code = compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&keyword).unwrap(), "uniform_1");
        assert_eq!(compiler.name_of(&builtin).unwrap(), "_gl_Thing");
        assert!(code["obj"].contains("float vec4_1() { return 1.0; }"), "{code}");
    }

    #[test]
    fn static_names_are_occupied() {
        let main = MainFunction::new("uniform float u_t;\nvoid main() { gl_Position = vec4($t); }").unwrap();
        let t = Variable::parse("uniform float u_t").unwrap();
        main.set("t", &t).unwrap();
        let mut compiler = Compiler::new([("obj", &main)]);
        compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&t).unwrap(), "u_t_1");
        assert_eq!(compiler.name_of(&main).unwrap(), "main");
    }

    #[test]
    fn variables_share_one_name_across_stages() {
        let shared = Variable::parse("uniform float u_scale").unwrap();
        let other = Variable::parse("uniform float u_scale").unwrap();
        let vert = MainFunction::new("void main() { gl_Position = vec4($s); }").unwrap();
        let frag = MainFunction::new("void main() { gl_FragColor = vec4($s * $o); }").unwrap();
        vert.set("s", &shared).unwrap();
        frag.set("s", &shared).unwrap();
        frag.set("o", &other).unwrap();

        let mut compiler = Compiler::new([("vert", &vert), ("frag", &frag)]);
        let code = compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&shared).unwrap(), "u_scale");
        assert_eq!(compiler.name_of(&other).unwrap(), "u_scale_1");
        assert!(code["vert"].starts_with("uniform float u_scale;\n"));
        assert!(code["frag"].contains("u_scale * u_scale_1"));
    }

    #[test]
    fn functions_are_named_per_stage() {
        let helper_vert = Function::new("float helper() { return 1.0; }").unwrap();
        let helper_frag = Function::new("float helper() { return 2.0; }").unwrap();
        let vert = MainFunction::new("void main() { gl_PointSize = $h; }").unwrap();
        let frag = MainFunction::new("void main() { gl_FragColor = vec4($h); }").unwrap();
        vert.set("h", helper_vert.call(Vec::<Bindable>::new()).unwrap()).unwrap();
        frag.set("h", helper_frag.call(Vec::<Bindable>::new()).unwrap()).unwrap();

        let mut compiler = Compiler::new([("vert", &vert), ("frag", &frag)]);
        compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&helper_vert).unwrap(), "helper");
        assert_eq!(compiler.name_of(&helper_frag).unwrap(), "helper");
    }

    #[test]
    fn suffix_search_is_bounded() {
        let f = Function::new("float f() { return $a + $b + $c; }").unwrap();
        for key in ["a", "b", "c"] {
            f.set(key, &Variable::parse("uniform float x").unwrap()).unwrap();
        }
        let settings = CompileSettings { max_suffix: 1, ..Default::default() };
        let result = Compiler::with_settings([("obj", &f)], settings).compile();
        assert_eq!(result, Err(Error::NameCollision { name: "x".into(), attempts: 1 }));
    }

    #[test]
    fn fast_names_are_derived_from_ids() {
        let x = Variable::parse("uniform float u_x").unwrap();
        let main = MainFunction::new("void main() { gl_PointSize = $x; }").unwrap();
        main.set("x", &x).unwrap();
        let settings = CompileSettings { naming: Naming::Fast, ..Default::default() };
        let mut compiler = Compiler::with_settings([("vert", &main)], settings);
        let code = compiler.compile().unwrap();
        let name = format!("u_x_{}", x.id());
        assert_eq!(compiler.name_of(&x).unwrap(), name);
        assert_eq!(compiler.name_of(&main).unwrap(), "main");
        assert!(code["vert"].contains(&format!("gl_PointSize = {name};")));
    }

    #[test]
    fn long_names_are_kept_whole() {
        let helper = Function::new("float compute_screen_space_derivative_len() { return 1.0; }").unwrap();
        let f = Function::with_dependencies("float f() { return compute_screen_space_derivative_len(); }", [&helper]).unwrap();
        let mut compiler = Compiler::new([("obj", &f)]);
        let code = compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&helper).unwrap(), "compute_screen_space_derivative_len");
        assert!(code["obj"].starts_with("float compute_screen_space_derivative_len() {"), "{}", &code["obj"]);

        let other = Function::new("float compute_screen_space_derivative_len() { return 2.0; }").unwrap();
        let g = Function::new("float g() { return $a + $b; }").unwrap();
        g.set("a", helper.call(Vec::<Bindable>::new()).unwrap()).unwrap();
        g.set("b", other.call(Vec::<Bindable>::new()).unwrap()).unwrap();
        let mut compiler = Compiler::new([("obj", &g)]);
        compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&other).unwrap(), "compute_screen_space_derivative_len_1");
    }

    #[test]
    fn plain_main_functions_keep_their_name() {
        let x = Variable::parse("uniform float u_x").unwrap();
        let main = Function::new("void main() { gl_Position = vec4($x); }").unwrap();
        main.set("x", &x).unwrap();
        for naming in [Naming::Pretty, Naming::Fast] {
            let settings = CompileSettings { naming, ..Default::default() };
            let mut compiler = Compiler::with_settings([("vert", &main)], settings);
            let code = compiler.compile().unwrap();
            assert_eq!(compiler.name_of(&main).unwrap(), "main");
            assert!(code["vert"].contains("void main() {"), "{}", &code["vert"]);
        }
    }

    #[test]
    fn version_pragmas() {
        let vert = MainFunction::new("#version 300 es\nvoid main() { gl_Position = vec4($a, 0.0, 1.0); }").unwrap();
        vert.set("a", &Variable::parse("attribute vec2 a_pos").unwrap()).unwrap();
        let code = Compiler::new([("vert", &vert)]).compile().unwrap();
        assert_eq!(&code["vert"], "#version 300 es\n\nin vec2 a_pos;\nvoid main() { gl_Position = vec4(a_pos, 0.0, 1.0); }\n");

        let helper = Function::new("#version 120\nfloat helper() { return 1.0; }").unwrap();
        vert.set("a", helper.call(Vec::<Bindable>::new()).unwrap()).unwrap();
        assert!(matches!(
            Compiler::new([("vert", &vert)]).compile(),
            Err(Error::VersionConflict { ref shader, .. }) if shader == "vert"
        ));
    }

    #[test]
    fn default_version() {
        let f = Function::new("float f() { return 1.0; }").unwrap();
        let settings = CompileSettings { default_version: Some(Version::new(330)), ..Default::default() };
        let code = Compiler::with_settings([("obj", &f)], settings).compile().unwrap();
        assert!(code["obj"].starts_with("#version 330\n"));
    }

    #[test]
    fn unknown_objects() {
        let f = Function::new("float f() { return 1.0; }").unwrap();
        let stranger = Variable::parse("uniform float u").unwrap();
        let mut compiler = Compiler::new([("obj", &f)]);
        assert!(matches!(compiler.name_of(&f), Err(Error::UnknownObject(_))));
        compiler.compile().unwrap();
        assert_eq!(compiler.name_of(&f).unwrap(), "f");
        assert!(matches!(compiler.name_of(&stranger), Err(Error::UnknownObject(_))));
    }

    #[test]
    fn display_lists_stages() {
        let f = Function::new("float f() {\n    return 1.0;\n}").unwrap();
        let code = Compiler::new([("obj", &f)]).compile().unwrap();
        assert_eq!(code.to_string(), "obj:\n1 | float f() {\n2 |     return 1.0;\n3 | }\n");
        assert_eq!(code.iter().collect::<Vec<_>>(), [("obj", "float f() {\n    return 1.0;\n}\n")]);
    }
}
