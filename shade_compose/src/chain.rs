use std::cell::{Ref, RefCell, RefMut};
use logwise::privacy::LogIt;

use crate::{
    compiler::Names,
    object::NodeKind,
    parsing::{Args, Signature},
    Change, Error, ShaderObject,
};

pub(crate) struct ChainData {
    pub(crate) name: String,
    functions: Vec<ShaderObject>,
}

/// a function that calls a sequence of other functions.
///
/// if the last member returns a value, the members are chained: the first
/// member receives the chain's arguments and every following member receives
/// the return value of the previous one, so `[f1, f2]` computes `f2(f1(x))`.
/// If every member returns `void`, each member is called with the chain's
/// arguments in turn (callback mode). Members are validated whenever the
/// sequence changes.
#[derive(Clone)]
pub struct FunctionChain(pub(crate) ShaderObject);

/// the signature a chain of members with signatures `sigs` would get
fn chain_signature(name: &str, sigs: &[Signature]) -> Signature {
    Signature {
        name: name.to_string(),
        args: sigs.first().map(|sig| sig.args.clone()).unwrap_or_else(Args::new),
        rtype: sigs.last().map_or_else(|| "void".to_string(), |sig| sig.rtype.clone()),
    }
}

fn validate(chain: &str, functions: &[ShaderObject]) -> Result<(), Error> {
    let sigs = functions.iter()
        .map(|f| match f.node_kind() {
            NodeKind::Function(_) | NodeKind::Chain(_) => f.signature().ok_or_else(|| Error::NotCallable(f.describe())),
            _ => Err(Error::NotCallable(f.describe())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Some(last) = sigs.last() else { return Ok(()) };

    let mixed = |sig: &Signature| Error::ChainMixedVoid { chain: chain.to_string(), member: sig.display() };
    if last.rtype == "void" {
        let first = &sigs[0];
        for sig in &sigs {
            if sig.rtype != "void" {
                return Err(mixed(sig));
            }
            let same_args = sig.args.len() == first.args.len() &&
                sig.args.iter().zip(&first.args).all(|(a, b)| a.ty == b.ty);
            if !same_args {
                return Err(Error::ChainMismatch {
                    output: "void".into(),
                    previous: first.display(),
                    next: sig.display(),
                });
            }
        }
    } else {
        if let Some(sig) = sigs.iter().find(|sig| sig.rtype == "void") {
            return Err(mixed(sig));
        }
        for pair in sigs.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.args.len() != 1 || next.args[0].ty != prev.rtype {
                return Err(Error::ChainMismatch {
                    output: prev.rtype.clone(),
                    previous: prev.display(),
                    next: next.display(),
                });
            }
        }
    }
    Ok(())
}

impl FunctionChain {
    /// a chain named `name` (default `"chain"`) calling `functions` in order
    pub fn new<F: Into<ShaderObject>>(name: Option<&str>, functions: impl IntoIterator<Item = F>) -> Result<FunctionChain, Error> {
        let chain = FunctionChain(ShaderObject::from_kind(NodeKind::Chain(RefCell::new(ChainData {
            name: name.unwrap_or("chain").to_string(),
            functions: vec![],
        }))));
        chain.set_functions(functions)?;
        Ok(chain)
    }

    fn data(&self) -> Ref<'_, ChainData> { unwrap_variant!(self.0.node_kind(), NodeKind::Chain(data) => data.borrow()) }

    fn data_mut(&self) -> RefMut<'_, ChainData> { unwrap_variant!(self.0.node_kind(), NodeKind::Chain(data) => data.borrow_mut()) }

    pub fn name(&self) -> String { self.data().name.clone() }

    /// arguments of the first member, return type of the last one
    pub fn signature(&self) -> Signature {
        let data = self.data();
        let sigs = data.functions.iter().filter_map(|f| f.signature()).collect::<Vec<_>>();
        chain_signature(&data.name, &sigs)
    }

    pub fn functions(&self) -> Vec<ShaderObject> { self.data().functions.clone() }

    pub fn len(&self) -> usize { self.data().functions.len() }

    pub fn is_empty(&self) -> bool { self.data().functions.is_empty() }

    /// replaces all members
    pub fn set_functions<F: Into<ShaderObject>>(&self, functions: impl IntoIterator<Item = F>) -> Result<(), Error> {
        self.update(functions.into_iter().map(Into::into).collect())
    }

    pub fn append(&self, function: impl Into<ShaderObject>) -> Result<(), Error> {
        let mut functions = self.functions();
        functions.push(function.into());
        self.update(functions)
    }

    /// inserts `function` before position `index`, or at the end if `index`
    /// is past the end
    pub fn insert(&self, index: usize, function: impl Into<ShaderObject>) -> Result<(), Error> {
        let mut functions = self.functions();
        functions.insert(index.min(functions.len()), function.into());
        self.update(functions)
    }

    /// removes the first occurrence of `function`
    pub fn remove(&self, function: impl Into<ShaderObject>) -> Result<(), Error> {
        let function = function.into();
        let mut functions = self.functions();
        let i = functions.iter().position(|f| *f == function).ok_or_else(|| Error::NotInChain {
            chain: self.name(),
            function: function.name().unwrap_or_else(|| function.describe()),
        })?;
        functions.remove(i);
        self.update(functions)
    }

    /// replaces the member at `index`
    pub fn set(&self, index: usize, function: impl Into<ShaderObject>) -> Result<(), Error> {
        let mut functions = self.functions();
        let len = functions.len();
        let slot = functions.get_mut(index).ok_or_else(|| Error::ChainIndex { chain: self.name(), index, len })?;
        *slot = function.into();
        self.update(functions)
    }

    /// the code of a chain is generated from its members
    pub fn set_code(&self, _code: &str) -> Result<(), Error> { Err(Error::CodeOnChain(self.name())) }

    fn update(&self, functions: Vec<ShaderObject>) -> Result<(), Error> {
        let name = self.name();
        validate(&name, &functions)?;
        for function in &functions {
            self.check_no_cycle(function)?;
        }

        let old = std::mem::replace(&mut self.data_mut().functions, functions.clone());
        // add before removing, members kept in the chain never lose their edge
        for function in &functions {
            self.add_dependency(function);
        }
        for function in &old {
            self.remove_dependency(function);
        }

        logwise::trace_sync!(
            "chain {chain} now calls {count} functions",
            chain = LogIt(&name),
            count = functions.len()
        );
        self.notify(Change::BOTH);
        Ok(())
    }

    pub(crate) fn definition(&self, names: &Names) -> Result<String, Error> {
        let data = self.data();
        let signature = self.signature();
        let args = signature.args.iter().map(|arg| format!("{} {}", arg.ty, arg.name)).collect::<Vec<_>>();
        let arg_names = signature.args.iter().map(|arg| arg.name.as_str()).collect::<Vec<_>>().join(", ");

        let mut code = format!("{} {}({}) {{\n", signature.rtype, names.get(self)?, args.join(", "));
        if signature.rtype == "void" {
            for function in &data.functions {
                code += &format!("    {}({arg_names});\n", names.get(function)?);
            }
        } else {
            let mut input = arg_names;
            for (i, function) in data.functions.iter().enumerate() {
                let rtype = function.dtype().unwrap_or_default();
                let result = format!("result{}", i + 1);
                code += &format!("    {rtype} {result} = {}({input});\n", names.get(function)?);
                input = result;
            }
            code += &format!("    return {input};\n");
        }
        code += "}\n";
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{object::testing::watch, Function, TextExpression};
    use pretty_assertions::assert_eq;

    fn shift(name: &str, offset: &str) -> Function {
        Function::new(&format!("vec4 {name}(vec4 pos) {{ return pos + vec4({offset}); }}")).unwrap()
    }

    #[test]
    fn transform_chain_threads_results() {
        let f1 = shift("f1", "1, 0, 0, 0");
        let f2 = shift("f2", "0, 1, 0, 0");
        let chain = FunctionChain::new(Some("chain"), [&f1, &f2]).unwrap();
        assert_eq!(chain.signature().display(), "vec4 chain(vec4 pos)");
        assert_eq!(f1.dependents(), [chain.id()]);

        let code = chain.compile().unwrap();
        assert_eq!(code, [
            "vec4 f1(vec4 pos) { return pos + vec4(1, 0, 0, 0); }\n",
            "vec4 f2(vec4 pos) { return pos + vec4(0, 1, 0, 0); }\n",
            "vec4 chain(vec4 pos) {",
            "    vec4 result1 = f1(pos);",
            "    vec4 result2 = f2(result1);",
            "    return result2;",
            "}",
            "",
        ].join("\n"));
    }

    #[test]
    fn callback_chain_passes_arguments() {
        let a = Function::new("void a(vec2 p) { }").unwrap();
        let b = Function::new("void b(vec2 q) { }").unwrap();
        let chain = FunctionChain::new(Some("callbacks"), [&a, &b]).unwrap();
        let code = chain.compile().unwrap();
        assert!(code.ends_with("void callbacks(vec2 p) {\n    a(p);\n    b(p);\n}\n"), "{code}");
    }

    #[test]
    fn empty_chain() {
        let chain = FunctionChain::new(None, Vec::<ShaderObject>::new()).unwrap();
        assert_eq!(chain.name(), "chain");
        assert!(chain.is_empty());
        assert_eq!(chain.signature().display(), "void chain()");
        assert_eq!(chain.compile().unwrap(), "void chain() {\n}\n");
    }

    #[test]
    fn incompatible_members_are_rejected() {
        let f1 = shift("f1", "1.0");
        let scalar = Function::new("float scale(float x) { return x * 2.0; }").unwrap();
        let chain = FunctionChain::new(Some("chain"), [&f1]).unwrap();
        let result = chain.append(&scalar);
        assert!(matches!(result, Err(Error::ChainMismatch { ref output, .. }) if output == "vec4"));
        assert_eq!(chain.len(), 1);

        let void = Function::new("void cb(vec4 pos) { }").unwrap();
        assert!(matches!(chain.insert(0, &void), Err(Error::ChainMixedVoid { .. })));
        assert!(matches!(chain.append(TextExpression::new("x")), Err(Error::NotCallable(_))));
        assert!(matches!(chain.set(3, &f1), Err(Error::ChainIndex { index: 3, len: 1, .. })));
        assert!(matches!(chain.set_code("void f() {}"), Err(Error::CodeOnChain(_))));
    }

    #[test]
    fn mutations_move_edges_and_notify() {
        let f1 = shift("f1", "1.0");
        let f2 = shift("f2", "2.0");
        let chain = FunctionChain::new(None, [&f1]).unwrap();
        let log = watch(&chain);

        chain.append(&f2).unwrap();
        chain.set(0, &f2).unwrap();
        assert!(f1.dependents().is_empty());
        assert_eq!(chain.reference_count(&f2), 2);

        chain.remove(&f2).unwrap();
        assert_eq!(chain.reference_count(&f2), 1);
        assert!(matches!(chain.remove(&f1), Err(Error::NotInChain { .. })));
        assert_eq!(log.changes(), [Change::BOTH; 3]);
    }

    #[test]
    fn chains_cannot_contain_themselves() {
        let inner = FunctionChain::new(Some("inner"), Vec::<ShaderObject>::new()).unwrap();
        let outer = FunctionChain::new(Some("outer"), [&inner]).unwrap();
        assert!(matches!(inner.append(&outer), Err(Error::DependencyCycle { .. })));
    }
}
