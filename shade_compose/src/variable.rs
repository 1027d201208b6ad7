use std::{cell::{Ref, RefCell, RefMut}, ops::Deref};
use smallvec::SmallVec;

use crate::{
    classify,
    compiler::{Names, StageContext},
    object::NodeKind,
    Change, Error, ObjectId, ShaderObject, ShaderValue, VariableKind,
};

pub(crate) struct VariableData {
    pub(crate) name: Option<String>,
    kind: Option<VariableKind>,
    dtype: Option<String>,
    value: Option<ShaderValue>,
    /// kind and dtype were given explicitly and may not change
    locked: bool,
    counter: u64,
    /// varyings without an explicit dtype take the one of this object
    link: Option<ShaderObject>,
}

/// identity and version of a variable's value. Changes whenever a new value
/// is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId {
    pub object: ObjectId,
    pub counter: u64,
}

/// a global shader variable (`uniform`, `attribute`, `varying`, `const`)
#[derive(Clone)]
pub struct Variable(pub(crate) ShaderObject);

impl Variable {
    /// creates a variable. If both `kind` and `dtype` are given the type is
    /// locked and later values have to match it, otherwise the type is
    /// inferred from every assigned value.
    pub fn new(name: Option<&str>, value: Option<ShaderValue>, kind: Option<VariableKind>, dtype: Option<&str>) -> Result<Variable, Error> {
        let var = Variable(ShaderObject::from_kind(NodeKind::Variable(RefCell::new(VariableData {
            name: name.map(str::to_string),
            kind,
            dtype: dtype.map(str::to_string),
            value: None,
            locked: kind.is_some() && dtype.is_some(),
            counter: 0,
            link: None,
        }))));
        if let Some(value) = value {
            var.set_value(value)?;
        }
        Ok(var)
    }

    /// a variable whose type is inferred from `value`, e.g. a `uniform float`
    pub fn with_value(name: &str, value: impl Into<ShaderValue>) -> Result<Variable, Error> {
        Variable::new(Some(name), Some(value.into()), None, None)
    }

    /// parses `"vtype dtype name"` or `"const dtype name value"`, e.g.
    /// `"uniform vec4 u_color"` or `"const float PI 3.14159"`.
    /// Variables created this way are type locked.
    pub fn parse(spec: &str) -> Result<Variable, Error> {
        let fields = spec.split_whitespace().collect::<SmallVec<[&str; 4]>>();
        match fields.as_slice() {
            [kind, dtype, name] => Variable::new(Some(*name), None, Some(kind.parse()?), Some(*dtype)),
            ["const", dtype, name, value @ ..] if !value.is_empty() => {
                let value = ShaderValue::parse_literal(dtype, &value.join(" "));
                Variable::new(Some(*name), Some(value), Some(VariableKind::Const), Some(*dtype))
            }
            _ => Err(Error::MalformedVariableSpec(spec.to_string())),
        }
    }

    fn data(&self) -> Ref<'_, VariableData> { unwrap_variant!(self.0.node_kind(), NodeKind::Variable(data) => data.borrow()) }

    fn data_mut(&self) -> RefMut<'_, VariableData> { unwrap_variant!(self.0.node_kind(), NodeKind::Variable(data) => data.borrow_mut()) }

    pub fn set_name(&self, name: &str) {
        let changed = {
            let mut data = self.data_mut();
            let changed = data.name.as_deref() != Some(name);
            data.name = Some(name.to_string());
            changed
        };
        if changed {
            self.notify(Change::CODE);
        }
    }

    pub fn kind(&self) -> Option<VariableKind> { self.data().kind }

    /// the declared or inferred glsl type. Varyings without one report the
    /// type of the object they are linked to.
    pub fn dtype(&self) -> Option<String> {
        let (dtype, link) = {
            let data = self.data();
            (data.dtype.clone(), data.link.clone())
        };
        dtype.or_else(|| link.and_then(|link| link.dtype()))
    }

    pub fn value(&self) -> Option<ShaderValue> { self.data().value.clone() }

    pub fn is_locked(&self) -> bool { self.data().locked }

    pub fn is_varying(&self) -> bool { self.kind() == Some(VariableKind::Varying) }

    pub fn as_varying(&self) -> Option<Varying> { self.is_varying().then(|| Varying(self.clone())) }

    pub fn state_id(&self) -> StateId {
        StateId { object: self.id(), counter: self.data().counter }
    }

    /// assigns a new value.
    ///
    /// fails without changing anything if the variable is a varying, if the
    /// value has no glsl representation or if it does not match a locked type.
    /// A value that changes the inferred type is a code change, any other new
    /// value is a value change. Assigning an equal value does nothing.
    pub fn set_value(&self, value: impl Into<ShaderValue>) -> Result<(), Error> {
        let value = value.into();
        let change = {
            let mut data = self.data_mut();
            if data.kind == Some(VariableKind::Varying) {
                return Err(Error::ValueOnVarying(self.describe_name(&data)));
            }
            let is_const = data.kind == Some(VariableKind::Const);
            let found = match (&value, data.locked && is_const) {
                // literals are only meaningful as const initializers
                (ShaderValue::Literal(_), true) => None,
                _ => Some(classify(&value)?),
            };

            if let (true, Some(found)) = (data.locked, &found) {
                let kind_matches = Some(found.kind) == data.kind || (is_const && found.kind == VariableKind::Uniform);
                if !kind_matches || data.dtype.as_deref() != Some(found.dtype.as_str()) {
                    return Err(Error::TypeLocked {
                        variable: self.describe_name(&data),
                        locked_kind: data.kind.map(|k| k.to_string()).unwrap_or_default(),
                        locked_dtype: data.dtype.clone().unwrap_or_default(),
                        found_kind: found.kind.to_string(),
                        found_dtype: found.dtype.clone(),
                    });
                }
            }
            if data.value.as_ref() == Some(&value) {
                return Ok(());
            }

            let mut change = Change::VALUE;
            if let (false, Some(found)) = (data.locked, found) {
                if data.kind != Some(found.kind) || data.dtype.as_deref() != Some(found.dtype.as_str()) {
                    data.kind = Some(found.kind);
                    data.dtype = Some(found.dtype);
                    change = Change::BOTH;
                }
            }
            data.value = Some(value);
            data.counter += 1;
            change
        };
        self.notify(change);
        Ok(())
    }

    fn describe_name(&self, data: &VariableData) -> String {
        data.name.clone().unwrap_or_else(|| format!("<unnamed {}>", self.id()))
    }

    /// `uniform vec4 u_color;` or `const float PI = 3.14159;`
    pub(crate) fn definition(&self, names: &Names, stage: &StageContext) -> Result<String, Error> {
        let name = names.get(self)?;
        let missing = |missing| Error::MissingType { variable: name.to_string(), missing };
        let kind = self.kind().ok_or_else(|| missing("storage qualifier"))?;
        let dtype = self.dtype().ok_or_else(|| missing("data type"))?;

        match kind {
            VariableKind::Const => {
                let value = self.value().ok_or_else(|| missing("value"))?;
                Ok(format!("const {dtype} {name} = {};", value.to_glsl()?))
            }
            kind => {
                let qualifier = match (kind, stage.uses_in_out()) {
                    (VariableKind::Attribute, true) => "in",
                    (VariableKind::Varying, true) => match stage.is_vertex() {
                        true => "out",
                        false => "in",
                    },
                    (kind, _) => kind.as_str(),
                };
                Ok(format!("{qualifier} {dtype} {name};"))
            }
        }
    }
}

/// a variable passed from one shader stage to the next.
///
/// varyings never hold a value, they are assigned by shader code (see
/// [`Function::bind_output`](crate::Function::bind_output)). Their type may be
/// taken from a linked object instead of being declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Varying(pub(crate) Variable);

impl Varying {
    /// a varying whose type is taken from the object it gets linked to
    pub fn new(name: &str) -> Varying {
        Varying(Variable(ShaderObject::from_kind(NodeKind::Variable(RefCell::new(VariableData {
            name: Some(name.to_string()),
            kind: Some(VariableKind::Varying),
            dtype: None,
            value: None,
            locked: false,
            counter: 0,
            link: None,
        })))))
    }

    pub fn with_dtype(name: &str, dtype: &str) -> Varying {
        let varying = Varying::new(name);
        {
            let mut data = varying.0.data_mut();
            data.dtype = Some(dtype.to_string());
            data.locked = true;
        }
        varying
    }

    /// makes this varying take the type of `source` unless it declared one itself.
    ///
    /// fails if `source` is this varying, reaches it through its own links or
    /// depends on it.
    pub fn link(&self, source: impl Into<ShaderObject>) -> Result<(), Error> {
        let source = source.into();
        self.check_link(&source)?;
        let before = self.dtype();
        self.0.data_mut().link = Some(source);
        if self.dtype() != before {
            self.notify(Change::CODE);
        }
        Ok(())
    }

    pub(crate) fn check_link(&self, source: &ShaderObject) -> Result<(), Error> {
        let cycle = || Error::LinkCycle { varying: self.name().unwrap_or_default(), source: source.describe() };
        if source.depends_on(&self.0) {
            return Err(cycle());
        }
        let mut next = Some(source.clone());
        while let Some(obj) = next {
            if obj == *self.0 {
                return Err(cycle());
            }
            next = obj.as_variable().and_then(|var| var.data().link.clone());
        }
        Ok(())
    }

    pub fn linked(&self) -> Option<ShaderObject> { self.0.data().link.clone() }
}

impl Deref for Varying {
    type Target = Variable;
    fn deref(&self) -> &Variable { &self.0 }
}

impl From<Varying> for Variable {
    fn from(varying: Varying) -> Self { varying.0 }
}

impl From<Varying> for ShaderObject {
    fn from(varying: Varying) -> Self { varying.0.0 }
}

impl From<&Varying> for ShaderObject {
    fn from(varying: &Varying) -> Self { varying.0.0.clone() }
}
