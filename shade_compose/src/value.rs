use std::{fmt::{Debug, Display}, rc::Rc, str::FromStr};
use smallvec::SmallVec;
use crate::Error;

/// storage qualifier of a global shader variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKind {
    Const,
    Uniform,
    Attribute,
    Varying,
    Inout,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Const     => "const",
            VariableKind::Uniform   => "uniform",
            VariableKind::Attribute => "attribute",
            VariableKind::Varying   => "varying",
            VariableKind::Inout     => "inout",
        }
    }

    /// the single letter used to prefix auto-generated names (`u_`, `a_`, `v_`)
    pub(crate) fn name_prefix(&self) -> Option<char> {
        match self {
            VariableKind::Uniform   => Some('u'),
            VariableKind::Attribute => Some('a'),
            VariableKind::Varying   => Some('v'),
            VariableKind::Const |
            VariableKind::Inout     => None,
        }
    }
}

impl Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for VariableKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "const"     => VariableKind::Const,
            "uniform"   => VariableKind::Uniform,
            "attribute" => VariableKind::Attribute,
            "varying"   => VariableKind::Varying,
            "inout"     => VariableKind::Inout,
            _ => return Err(Error::InvalidVariableKind(s.to_string())),
        })
    }
}

/// storage qualifier and glsl type name of a value, e.g. `uniform vec4`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlslType {
    pub kind: VariableKind,
    pub dtype: String,
}

impl GlslType {
    pub fn new(kind: VariableKind, dtype: impl Into<String>) -> Self {
        Self { kind, dtype: dtype.into() }
    }

    fn uniform(dtype: impl Into<String>) -> Self { Self::new(VariableKind::Uniform, dtype) }
}

impl Display for GlslType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.dtype)
    }
}

/// implemented by externally managed gpu resources (buffers, textures) that
/// can be bound to a shader variable. The core never uploads these itself,
/// it only needs to know how they are declared.
pub trait GlslTyped: Debug {
    fn glsl_type(&self) -> GlslType;
}

/// shared handle to an external gpu resource. Two handles are equal if they
/// refer to the same resource.
#[derive(Debug, Clone)]
pub struct GpuHandle(Rc<dyn GlslTyped>);

impl GpuHandle {
    pub fn new(resource: Rc<dyn GlslTyped>) -> Self { Self(resource) }

    pub fn resource(&self) -> &Rc<dyn GlslTyped> { &self.0 }

    pub fn glsl_type(&self) -> GlslType { self.0.glsl_type() }
}

impl PartialEq for GpuHandle {
    fn eq(&self, other: &Self) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Float(f32),
    Int(i32),
}

/// any value that can be stored in a shader [`Variable`](crate::Variable)
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderValue {
    Scalar(Scalar),
    /// 2, 3 or 4 components
    Vector(SmallVec<[f32; 4]>),
    /// square matrix given as rows, 2x2, 3x3 or 4x4
    Matrix(SmallVec<[SmallVec<[f32; 4]>; 4]>),
    /// verbatim glsl initializer, only valid for `const` variables
    Literal(String),
    Handle(GpuHandle),
}

/// infers how a variable holding `value` has to be declared.
///
/// scalars and short vectors become `float`/`int`/`vecN` uniforms, square
/// matrices become `matN` uniforms and gpu handles report their own type.
/// Literals carry no type information and are rejected.
pub fn classify(value: &ShaderValue) -> Result<GlslType, Error> {
    match value {
        ShaderValue::Scalar(Scalar::Float(_)) => Ok(GlslType::uniform("float")),
        ShaderValue::Scalar(Scalar::Int(_))   => Ok(GlslType::uniform("int")),
        ShaderValue::Vector(v) => match v.len() {
            2..=4 => Ok(GlslType::uniform(format!("vec{}", v.len()))),
            n => Err(Error::UnsupportedValue(format!("a vector with {n} components"))),
        },
        ShaderValue::Matrix(rows) => {
            let n = rows.len();
            match (2..=4).contains(&n) && rows.iter().all(|row| row.len() == n) {
                true => Ok(GlslType::uniform(format!("mat{n}"))),
                false => Err(Error::UnsupportedValue(format!(
                    "a matrix of shape {:?}", rows.iter().map(|row| row.len()).collect::<Vec<_>>()
                ))),
            }
        },
        ShaderValue::Literal(text) => Err(Error::UnsupportedValue(format!("the untyped literal '{text}'"))),
        ShaderValue::Handle(handle) => Ok(handle.glsl_type()),
    }
}

fn floating_point_to_glsl(x: f32) -> Result<String, Error> {
    use std::num::FpCategory::*;
    match x.classify() {
        Normal | Zero | Subnormal => {
            let mut s = format!("{}", x);
            if !s.contains('.') && !s.contains('e') {s += ".0";}
            Ok(s)
        },
        cat => Err(Error::UnsupportedValue(format!("floating point number of category '{:?}'", cat)))
    }
}

fn floats_to_glsl(xs: &[f32]) -> Result<String, Error> {
    Ok(xs.iter().map(|x| floating_point_to_glsl(*x)).collect::<Result<Vec<_>, _>>()?.join(", "))
}

impl ShaderValue {
    /// glsl source for this value, as used in `const` initializers
    pub fn to_glsl(&self) -> Result<String, Error> {
        match self {
            ShaderValue::Scalar(Scalar::Float(x)) => floating_point_to_glsl(*x),
            ShaderValue::Scalar(Scalar::Int(x)) => Ok(format!("{x}")),
            ShaderValue::Vector(v) => Ok(format!("vec{}({})", v.len(), floats_to_glsl(v)?)),
            ShaderValue::Matrix(rows) => {
                let flat = rows.iter().flatten().copied().collect::<Vec<_>>();
                Ok(format!("mat{}({})", rows.len(), floats_to_glsl(&flat)?))
            },
            ShaderValue::Literal(text) => Ok(text.clone()),
            ShaderValue::Handle(handle) => Err(Error::UnsupportedValue(format!("{:?} as a glsl literal", handle))),
        }
    }

    /// interprets a verbatim initializer according to the declared type,
    /// falling back to a [`ShaderValue::Literal`]
    pub(crate) fn parse_literal(dtype: &str, text: &str) -> ShaderValue {
        match dtype {
            "float" => text.parse().map(|x| ShaderValue::Scalar(Scalar::Float(x))).ok(),
            "int" => text.parse().map(|x| ShaderValue::Scalar(Scalar::Int(x))).ok(),
            _ => None,
        }.unwrap_or_else(|| ShaderValue::Literal(text.to_string()))
    }
}

impl From<f32> for ShaderValue { fn from(x: f32) -> Self { ShaderValue::Scalar(Scalar::Float(x)) } }
impl From<f64> for ShaderValue { fn from(x: f64) -> Self { ShaderValue::Scalar(Scalar::Float(x as f32)) } }
impl From<i32> for ShaderValue { fn from(x: i32) -> Self { ShaderValue::Scalar(Scalar::Int(x)) } }
impl From<GpuHandle> for ShaderValue { fn from(x: GpuHandle) -> Self { ShaderValue::Handle(x) } }
impl From<&[f32]> for ShaderValue { fn from(x: &[f32]) -> Self { ShaderValue::Vector(SmallVec::from_slice(x)) } }

impl<const N: usize> From<[f32; N]> for ShaderValue {
    fn from(x: [f32; N]) -> Self { ShaderValue::Vector(SmallVec::from_slice(&x)) }
}

impl<const N: usize> From<[[f32; N]; N]> for ShaderValue {
    fn from(rows: [[f32; N]; N]) -> Self {
        ShaderValue::Matrix(rows.iter().map(|row| SmallVec::from_slice(row)).collect())
    }
}
