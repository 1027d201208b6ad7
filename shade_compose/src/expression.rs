use std::cell::RefCell;

use crate::{
    compiler::Names,
    object::NodeKind,
    Change, Error, Function, FunctionChain, GpuHandle, ShaderObject, ShaderValue, StatementList, Variable, Varying,
};

/// anything that can be bound to a placeholder, hook or output
#[derive(Debug, Clone)]
pub enum Bindable {
    /// an existing object, bound as is
    Object(ShaderObject),
    /// verbatim glsl, wrapped in a [`TextExpression`]
    Text(String),
    /// a value, wrapped in a new [`Variable`]
    Value(ShaderValue),
}

impl ShaderObject {
    /// converts a bindable into a shader object.
    ///
    /// objects pass through (an unnamed [`Variable`] is named after `reference`),
    /// text becomes a [`TextExpression`] and values become a new [`Variable`]
    /// named after `reference` with a `u_`/`a_`/`v_` prefix matching its kind.
    pub fn create(value: impl Into<Bindable>, reference: Option<&str>) -> Result<ShaderObject, Error> {
        match value.into() {
            Bindable::Object(obj) => {
                if let (Some(var), Some(reference)) = (obj.as_variable(), reference) {
                    if var.name().is_none() {
                        var.set_name(reference);
                    }
                }
                Ok(obj)
            }
            Bindable::Text(text) => Ok(TextExpression::new(text).into()),
            Bindable::Value(value) => {
                let var = Variable::new(None, Some(value), None, None)?;
                if let Some(reference) = reference {
                    // `gl_` is reserved for builtins
                    let base = reference.strip_prefix("gl_").unwrap_or(reference);
                    let name = match var.kind().and_then(|kind| kind.name_prefix()) {
                        Some(prefix) => format!("{prefix}_{base}"),
                        None => base.to_string(),
                    };
                    var.set_name(&name);
                }
                Ok(var.into())
            }
        }
    }
}

/// verbatim glsl text, inlined wherever it is referenced
#[derive(Clone)]
pub struct TextExpression(pub(crate) ShaderObject);

impl TextExpression {
    pub fn new(text: impl Into<String>) -> TextExpression {
        TextExpression(ShaderObject::from_kind(NodeKind::Text(RefCell::new(text.into()))))
    }

    fn cell(&self) -> &RefCell<String> { unwrap_variant!(self.0.node_kind(), NodeKind::Text(text) => text) }

    pub fn text(&self) -> String { self.cell().borrow().clone() }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        if *self.cell().borrow() != text {
            *self.cell().borrow_mut() = text;
            self.notify(Change::CODE);
        }
    }
}

pub(crate) struct CallData {
    pub(crate) function: ShaderObject,
    args: Vec<ShaderObject>,
}

/// a call of a [`Function`] or [`FunctionChain`], inlined as `name(arg, ...)`
#[derive(Clone)]
pub struct FunctionCall(pub(crate) ShaderObject);

impl FunctionCall {
    /// arguments are converted with [`ShaderObject::create`], named after the
    /// corresponding parameters of the callee
    pub fn new<B: Into<Bindable>>(function: impl Into<ShaderObject>, args: impl IntoIterator<Item = B>) -> Result<FunctionCall, Error> {
        let function = function.into();
        let signature = function.signature().ok_or_else(|| Error::NotCallable(function.describe()))?;
        let args = args.into_iter().map(Into::into).collect::<Vec<Bindable>>();
        if args.len() != signature.args.len() {
            return Err(Error::ArgumentCount {
                function: signature.name,
                expected: signature.args.len(),
                found: args.len(),
            });
        }
        let args = args.into_iter().zip(&signature.args)
            .map(|(arg, param)| ShaderObject::create(arg, Some(param.name.as_str())))
            .collect::<Result<Vec<_>, _>>()?;

        let call = ShaderObject::from_kind(NodeKind::Call(CallData {
            function: function.clone(),
            args: args.clone(),
        }));
        call.add_dependency(&function);
        for arg in &args {
            call.add_dependency(arg);
        }
        Ok(FunctionCall(call))
    }

    fn data(&self) -> &CallData { unwrap_variant!(self.0.node_kind(), NodeKind::Call(call) => call) }

    pub fn function(&self) -> ShaderObject { self.data().function.clone() }

    pub fn args(&self) -> Vec<ShaderObject> { self.data().args.clone() }

    pub(crate) fn expression(&self, names: &Names) -> Result<String, Error> {
        let data = self.data();
        let args = data.args.iter().map(|arg| arg.expression(names)).collect::<Result<Vec<_>, _>>()?;
        Ok(format!("{}({})", names.get(&data.function)?, args.join(", ")))
    }
}

impl Function {
    /// a call of this function with the given arguments
    pub fn call<B: Into<Bindable>>(&self, args: impl IntoIterator<Item = B>) -> Result<FunctionCall, Error> {
        FunctionCall::new(self, args)
    }
}

impl FunctionChain {
    pub fn call<B: Into<Bindable>>(&self, args: impl IntoIterator<Item = B>) -> Result<FunctionCall, Error> {
        FunctionCall::new(self, args)
    }
}

macro_rules! bindable_objects {
    ($($handle: ty),* $(,)?) => {$(
        impl From<$handle> for Bindable {
            fn from(x: $handle) -> Self { Bindable::Object(x.into()) }
        }

        impl From<&$handle> for Bindable {
            fn from(x: &$handle) -> Self { Bindable::Object(x.into()) }
        }
    )*};
}

bindable_objects!(ShaderObject, Variable, Varying, Function, FunctionChain, FunctionCall, TextExpression, StatementList);

macro_rules! bindable_values {
    ($($value: ty),* $(,)?) => {$(
        impl From<$value> for Bindable {
            fn from(x: $value) -> Self { Bindable::Value(x.into()) }
        }
    )*};
}

bindable_values!(ShaderValue, f32, f64, i32, GpuHandle, &[f32]);

impl<const N: usize> From<[f32; N]> for Bindable {
    fn from(x: [f32; N]) -> Self { Bindable::Value(x.into()) }
}

impl<const N: usize> From<[[f32; N]; N]> for Bindable {
    fn from(x: [[f32; N]; N]) -> Self { Bindable::Value(x.into()) }
}

impl From<&str> for Bindable {
    fn from(text: &str) -> Self { Bindable::Text(text.to_string()) }
}

impl From<String> for Bindable {
    fn from(text: String) -> Self { Bindable::Text(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VariableKind;

    #[test]
    fn create_passes_objects_through() {
        let text = TextExpression::new("a + b");
        let obj = ShaderObject::create(&text, Some("x")).unwrap();
        assert_eq!(obj, *text);

        let unnamed = Variable::new(None, Some(1.0f32.into()), None, None).unwrap();
        ShaderObject::create(&unnamed, Some("scale")).unwrap();
        assert_eq!(unnamed.name().as_deref(), Some("scale"));

        let named = Variable::with_value("u_keep", 1.0f32).unwrap();
        ShaderObject::create(&named, Some("other")).unwrap();
        assert_eq!(named.name().as_deref(), Some("u_keep"));
    }

    #[test]
    fn create_wraps_text_and_values() {
        let text = ShaderObject::create("pos.xy", None).unwrap();
        assert_eq!(text.as_text().unwrap().text(), "pos.xy");

        let var = ShaderObject::create(2.0f32, Some("gl_PointSize")).unwrap().as_variable().unwrap();
        assert_eq!(var.name().as_deref(), Some("u_PointSize"));
        assert_eq!(var.kind(), Some(VariableKind::Uniform));
        assert_eq!(var.dtype().as_deref(), Some("float"));
    }

    #[test]
    fn calls_check_arguments() {
        let f = Function::new("vec4 shift(vec4 pos, float amount) { return pos + amount; }").unwrap();
        assert!(matches!(
            f.call(["pos"]),
            Err(Error::ArgumentCount { expected: 2, found: 1, .. })
        ));

        let call = f.call([Bindable::from("pos"), 0.5f32.into()]).unwrap();
        assert_eq!(call.dtype().as_deref(), Some("vec4"));
        let args = call.args();
        assert_eq!(args[1].name().as_deref(), Some("u_amount"));
        assert_eq!(call.dependencies(false).last(), Some(&*call));
        assert!(call.depends_on(&f));

        let text = TextExpression::new("1.0");
        assert!(matches!(FunctionCall::new(&text, Vec::<Bindable>::new()), Err(Error::NotCallable(_))));
    }

    #[test]
    fn text_changes_are_code_changes() {
        let text = TextExpression::new("a");
        text.set_text("b");
        assert_eq!(text.text(), "b");
    }
}
