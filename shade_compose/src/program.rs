use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
};
use logwise::privacy::LogIt;

use crate::{
    object::Observer,
    Change, CompileSettings, CompiledShaders, Compiler, Error, MainFunction, ObjectId, ShaderObject,
    ShaderValue, StateId, Variable, VariableKind,
};

/// the externally managed gpu program a [`ModularProgram`] drives.
///
/// implementations own the actual graphics api objects; the shader core only
/// hands over source code and variable values.
pub trait GpuProgram {
    /// whatever the implementation needs to issue one draw call
    type DrawCall;
    type Error;

    /// replaces the shader sources of the program. Called only with sources
    /// that compiled successfully.
    fn set_shaders(&mut self, shaders: &CompiledShaders) -> Result<(), Self::Error>;

    /// uploads the value of the uniform or attribute `name`
    fn set_variable(&mut self, name: &str, value: &ShaderValue) -> Result<(), Self::Error>;

    fn draw(&mut self, call: Self::DrawCall) -> Result<(), Self::Error>;
}

#[derive(thiserror::Error, Debug)]
pub enum ProgramError<E> {
    #[error(transparent)]
    Compile(#[from] Error),
    #[error("gpu program failed: {0}")]
    Gpu(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl ShaderStage {
    /// key of the stage in [`CompiledShaders`]
    pub fn key(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
            ShaderStage::Geometry => "geom",
        }
    }
}

/// listens to the stage roots on behalf of a program
struct ProgramState {
    id: ObjectId,
    dirty: Cell<bool>,
    listeners: RefCell<Vec<Rc<dyn Fn(Change)>>>,
}

impl ProgramState {
    fn changed(&self, change: Change) {
        if change.code {
            self.dirty.set(true);
        }
        // listeners may register further listeners
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(change);
        }
    }
}

impl Observer for ProgramState {
    fn observer_id(&self) -> ObjectId { self.id }

    fn on_dependency_changed(&self, _source: ObjectId, change: Change) { self.changed(change) }
}

/// a shader program assembled from one [`MainFunction`] per stage.
///
/// any code change in the graphs below the stages marks the program dirty.
/// [`ModularProgram::draw`] recompiles a dirty program, uploads every
/// uniform and attribute whose value changed since its last upload and then
/// draws.
pub struct ModularProgram<P: GpuProgram> {
    gpu: P,
    vert: MainFunction,
    frag: MainFunction,
    geom: Option<MainFunction>,
    state: Rc<ProgramState>,
    settings: CompileSettings,
    compiler: Option<Compiler>,
    compiled: Option<CompiledShaders>,
    /// the last uploaded state of every variable
    uploaded: HashMap<ObjectId, StateId>,
    /// uniforms and attributes of the current build with their glsl names
    settable: Vec<(String, Variable)>,
}

impl<P: GpuProgram> ModularProgram<P> {
    pub fn new(gpu: P, vert: &str, frag: &str) -> Result<Self, Error> {
        Self::with_settings(gpu, vert, frag, CompileSettings::default())
    }

    pub fn with_settings(gpu: P, vert: &str, frag: &str, settings: CompileSettings) -> Result<Self, Error> {
        let program = ModularProgram {
            gpu,
            vert: MainFunction::new(vert)?,
            frag: MainFunction::new(frag)?,
            geom: None,
            state: Rc::new(ProgramState {
                id: ObjectId::next(),
                dirty: Cell::new(true),
                listeners: Default::default(),
            }),
            settings,
            compiler: None,
            compiled: None,
            uploaded: HashMap::new(),
            settable: vec![],
        };
        for root in program.roots() {
            program.subscribe(&root);
        }
        Ok(program)
    }

    fn roots(&self) -> Vec<ShaderObject> {
        [Some(&self.vert), Some(&self.frag), self.geom.as_ref()].into_iter().flatten().map(ShaderObject::from).collect()
    }

    fn subscribe(&self, root: &ShaderObject) {
        let observer: Weak<dyn Observer> = Rc::<ProgramState>::downgrade(&self.state);
        root.subscribe(self.state.id, observer);
    }

    pub fn vert(&self) -> &MainFunction { &self.vert }

    pub fn frag(&self) -> &MainFunction { &self.frag }

    pub fn geom(&self) -> Option<&MainFunction> { self.geom.as_ref() }

    pub fn stage(&self, stage: ShaderStage) -> Option<&MainFunction> {
        match stage {
            ShaderStage::Vertex => Some(&self.vert),
            ShaderStage::Fragment => Some(&self.frag),
            ShaderStage::Geometry => self.geom.as_ref(),
        }
    }

    /// replaces the vertex shader template. Bindings of the old template are lost.
    pub fn set_vert(&mut self, code: &str) -> Result<(), Error> {
        let vert = MainFunction::new(code)?;
        self.vert.unsubscribe(self.state.id);
        self.subscribe(&vert);
        self.vert = vert;
        self.state.changed(Change::CODE);
        Ok(())
    }

    pub fn set_frag(&mut self, code: &str) -> Result<(), Error> {
        let frag = MainFunction::new(code)?;
        self.frag.unsubscribe(self.state.id);
        self.subscribe(&frag);
        self.frag = frag;
        self.state.changed(Change::CODE);
        Ok(())
    }

    /// sets or removes the geometry shader template
    pub fn set_geom(&mut self, code: Option<&str>) -> Result<(), Error> {
        let geom = code.map(MainFunction::new).transpose()?;
        if let Some(old) = &self.geom {
            old.unsubscribe(self.state.id);
        }
        if let Some(geom) = &geom {
            self.subscribe(geom);
        }
        self.geom = geom;
        self.state.changed(Change::CODE);
        Ok(())
    }

    /// calls `listener` whenever the program is marked dirty or a value
    /// below it changes
    pub fn on_change(&self, listener: impl Fn(Change) + 'static) {
        self.state.listeners.borrow_mut().push(Rc::new(listener));
    }

    pub fn is_dirty(&self) -> bool { self.state.dirty.get() }

    pub fn gpu(&self) -> &P { &self.gpu }

    pub fn gpu_mut(&mut self) -> &mut P { &mut self.gpu }

    /// the compiler of the last successful build
    pub fn compiler(&self) -> Option<&Compiler> { self.compiler.as_ref() }

    /// the sources of the last successful build
    pub fn compiled(&self) -> Option<&CompiledShaders> { self.compiled.as_ref() }

    /// recompiles all stages if anything changed since the last build.
    ///
    /// compilation finishes before anything is sent to the gpu program, a
    /// failed compilation leaves the program untouched (and still dirty).
    pub fn build_if_needed(&mut self) -> Result<(), ProgramError<P::Error>> {
        if !self.state.dirty.get() {
            return Ok(());
        }
        let mut stages = vec![
            (ShaderStage::Vertex.key(), ShaderObject::from(&self.vert)),
            (ShaderStage::Fragment.key(), ShaderObject::from(&self.frag)),
        ];
        if let Some(geom) = &self.geom {
            stages.push((ShaderStage::Geometry.key(), geom.into()));
        }
        let mut compiler = Compiler::with_settings(stages, self.settings.clone());
        let compiled = compiler.compile()?;
        let settable = self.settable_variables(&compiler)?;

        logwise::info_sync!(
            "rebuilding program with {stages} stages and {variables} variables",
            stages = compiled.iter().count(),
            variables = settable.len()
        );
        self.gpu.set_shaders(&compiled).map_err(ProgramError::Gpu)?;
        self.uploaded.clear();
        self.settable = settable;
        self.compiler = Some(compiler);
        self.compiled = Some(compiled);
        self.state.dirty.set(false);
        Ok(())
    }

    /// uniforms and attributes of all stages, each once
    fn settable_variables(&self, compiler: &Compiler) -> Result<Vec<(String, Variable)>, Error> {
        let mut settable: Vec<(String, Variable)> = vec![];
        for root in self.roots() {
            for var in root.dependencies(false).iter().filter_map(ShaderObject::as_variable) {
                let uploaded = matches!(var.kind(), Some(VariableKind::Uniform | VariableKind::Attribute));
                if uploaded && !settable.iter().any(|(_, known)| *known == var) {
                    settable.push((compiler.name_of(&var)?.to_string(), var));
                }
            }
        }
        Ok(settable)
    }

    /// uploads every variable whose value changed since its last upload.
    /// Variables without a value are skipped.
    pub fn update_variables(&mut self) -> Result<(), ProgramError<P::Error>> {
        for (name, var) in &self.settable {
            let state = var.state_id();
            if self.uploaded.get(&var.id()) == Some(&state) {
                continue;
            }
            let Some(value) = var.value() else { continue };
            logwise::trace_sync!(
                "uploading {name} = {value}",
                name = LogIt(name),
                value = LogIt(&value)
            );
            self.gpu.set_variable(name, &value).map_err(ProgramError::Gpu)?;
            self.uploaded.insert(var.id(), state);
        }
        Ok(())
    }

    /// builds if needed, uploads changed variables, then draws
    pub fn draw(&mut self, call: P::DrawCall) -> Result<(), ProgramError<P::Error>> {
        self.build_if_needed()?;
        self.update_variables()?;
        self.gpu.draw(call).map_err(ProgramError::Gpu)
    }
}

impl<P: GpuProgram> Drop for ModularProgram<P> {
    fn drop(&mut self) {
        for root in self.roots() {
            root.unsubscribe(self.state.id);
        }
    }
}
