use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    hash::Hash,
    num::NonZeroU64,
    rc::{Rc, Weak},
};
use smallvec::SmallVec;

use crate::{
    common::next_thread_unique_id,
    parsing::Signature,
    chain::ChainData,
    expression::CallData,
    function::FunctionData,
    statements::StatementData,
    variable::VariableData,
    compiler::{Names, StageContext},
    Compiler, Error, FunctionCall, FunctionChain, Function, StatementList, TextExpression, Variable,
};

/// identity of a [`ShaderObject`], unique among all objects created on this thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(NonZeroU64);

impl ObjectId {
    pub(crate) fn next() -> Self { ObjectId(next_thread_unique_id()) }

    pub fn get(&self) -> u64 { self.0.get() }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{:x}", self.0) }
}

/// what changed about a shader object.
///
/// `code` changes require the program to be recompiled, `value` changes only
/// require variable values to be uploaded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Change {
    pub code: bool,
    pub value: bool,
}

impl Change {
    pub const CODE: Change = Change { code: true, value: false };
    pub const VALUE: Change = Change { code: false, value: true };
    pub const BOTH: Change = Change { code: true, value: true };
}

/// receives change notifications of the objects it was registered with.
/// Observers are always held weakly, registering never keeps one alive.
pub(crate) trait Observer {
    fn observer_id(&self) -> ObjectId;
    fn on_dependency_changed(&self, source: ObjectId, change: Change);
}

pub(crate) enum NodeKind {
    Variable(RefCell<VariableData>),
    Text(RefCell<String>),
    Call(CallData),
    Function(RefCell<FunctionData>),
    Chain(RefCell<ChainData>),
    Statements(RefCell<StatementData>),
}

pub(crate) struct Node {
    id: ObjectId,
    /// owned dependencies with their reference count, in order of first use
    deps: RefCell<Vec<(ShaderObject, usize)>>,
    /// objects that depend on this one, only used for change propagation
    dependents: RefCell<Vec<(ObjectId, Weak<dyn Observer>)>>,
    pub(crate) kind: NodeKind,
}

impl Node {
    fn notify(&self, change: Change) {
        // upgrade first, observers may add or remove dependents while being notified
        let observers = self.dependents.borrow().iter()
            .filter_map(|(_, observer)| observer.upgrade())
            .collect::<SmallVec<[_; 4]>>();
        for observer in observers {
            observer.on_dependency_changed(self.id, change);
        }
    }
}

impl Observer for Node {
    fn observer_id(&self) -> ObjectId { self.id }

    fn on_dependency_changed(&self, _source: ObjectId, change: Change) { self.notify(change) }
}

impl Drop for Node {
    fn drop(&mut self) {
        for (dep, _) in self.deps.get_mut().drain(..) {
            if let Ok(mut dependents) = dep.0.dependents.try_borrow_mut() {
                dependents.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// a node in the shader dependency graph.
///
/// cloning a `ShaderObject` clones the handle, not the node. The typed
/// handles ([`Variable`], [`Function`], [`FunctionChain`], [`FunctionCall`],
/// [`TextExpression`], [`StatementList`]) all dereference to this type.
#[derive(Clone)]
pub struct ShaderObject(pub(crate) Rc<Node>);

impl ShaderObject {
    pub(crate) fn from_kind(kind: NodeKind) -> Self {
        ShaderObject(Rc::new(Node {
            id: ObjectId::next(),
            deps: Default::default(),
            dependents: Default::default(),
            kind,
        }))
    }

    pub fn id(&self) -> ObjectId { self.0.id }

    pub(crate) fn node_kind(&self) -> &NodeKind { &self.0.kind }

    /// the declared name of this object. Expressions that are inlined at
    /// their point of use (text, calls, statement lists) have no name.
    pub fn name(&self) -> Option<String> {
        match self.node_kind() {
            NodeKind::Variable(data) => data.borrow().name.clone(),
            NodeKind::Function(data) => Some(data.borrow().signature.name.clone()),
            NodeKind::Chain(data) => Some(data.borrow().name.clone()),
            NodeKind::Text(_) |
            NodeKind::Call(_) |
            NodeKind::Statements(_) => None,
        }
    }

    /// glsl type of the value this object evaluates to, if known
    pub fn dtype(&self) -> Option<String> {
        match self.node_kind() {
            NodeKind::Variable(_) => Variable(self.clone()).dtype(),
            NodeKind::Call(call) => call.function.signature().map(|sig| sig.rtype),
            NodeKind::Function(_) |
            NodeKind::Chain(_) => self.signature().map(|sig| sig.rtype),
            NodeKind::Text(_) |
            NodeKind::Statements(_) => None,
        }
    }

    /// signature of functions and function chains
    pub fn signature(&self) -> Option<Signature> {
        match self.node_kind() {
            NodeKind::Function(data) => Some(data.borrow().signature.clone()),
            NodeKind::Chain(_) => Some(FunctionChain(self.clone()).signature()),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<Variable> {
        matches!(self.node_kind(), NodeKind::Variable(_)).then(|| Variable(self.clone()))
    }

    pub fn as_function(&self) -> Option<Function> {
        matches!(self.node_kind(), NodeKind::Function(_)).then(|| Function(self.clone()))
    }

    pub fn as_chain(&self) -> Option<FunctionChain> {
        matches!(self.node_kind(), NodeKind::Chain(_)).then(|| FunctionChain(self.clone()))
    }

    pub fn as_text(&self) -> Option<TextExpression> {
        matches!(self.node_kind(), NodeKind::Text(_)).then(|| TextExpression(self.clone()))
    }

    pub fn as_call(&self) -> Option<FunctionCall> {
        matches!(self.node_kind(), NodeKind::Call(_)).then(|| FunctionCall(self.clone()))
    }

    pub fn as_statements(&self) -> Option<StatementList> {
        matches!(self.node_kind(), NodeKind::Statements(_)).then(|| StatementList(self.clone()))
    }

    pub fn is_variable(&self) -> bool { matches!(self.node_kind(), NodeKind::Variable(_)) }

    /// whether this object is the `main` function of a shader stage
    pub fn is_main(&self) -> bool {
        match self.node_kind() {
            NodeKind::Function(data) => data.borrow().main.is_some(),
            _ => false,
        }
    }

    /// short human readable description used in error messages
    pub fn describe(&self) -> String {
        match self.node_kind() {
            NodeKind::Variable(data) => match &data.borrow().name {
                Some(name) => format!("Variable '{name}'"),
                None => format!("unnamed Variable {}", self.id()),
            },
            NodeKind::Text(text) => format!("TextExpression '{}'", text.borrow()),
            NodeKind::Call(call) => format!("FunctionCall to {}", call.function.describe()),
            NodeKind::Function(data) => format!("Function '{}'", data.borrow().signature.name),
            NodeKind::Chain(data) => format!("FunctionChain '{}'", data.borrow().name),
            NodeKind::Statements(data) => format!("StatementList of {} items", data.borrow().items.len()),
        }
    }

    /// adds a reference to `dep`. On the first reference this object is
    /// registered as a dependent of `dep`.
    pub(crate) fn add_dependency(&self, dep: &ShaderObject) {
        let mut deps = self.0.deps.borrow_mut();
        match deps.iter_mut().find(|(d, _)| d.id() == dep.id()) {
            Some((_, count)) => *count += 1,
            None => {
                deps.push((dep.clone(), 1));
                let observer: Weak<dyn Observer> = Rc::<Node>::downgrade(&self.0);
                dep.subscribe(self.id(), observer);
            }
        }
    }

    /// removes a reference to `dep`. Once no reference is left the edge is
    /// removed in both directions.
    pub(crate) fn remove_dependency(&self, dep: &ShaderObject) {
        let removed = {
            let mut deps = self.0.deps.borrow_mut();
            match deps.iter().position(|(d, _)| d.id() == dep.id()) {
                Some(i) if deps[i].1 > 1 => { deps[i].1 -= 1; None },
                Some(i) => Some(deps.remove(i).0),
                None => None,
            }
        };
        if let Some(dep) = removed {
            dep.unsubscribe(self.id());
        }
    }

    pub(crate) fn subscribe(&self, id: ObjectId, observer: Weak<dyn Observer>) {
        self.0.dependents.borrow_mut().push((id, observer));
    }

    pub(crate) fn unsubscribe(&self, id: ObjectId) {
        self.0.dependents.borrow_mut().retain(|(dependent, _)| *dependent != id);
    }

    /// notifies every object that (transitively) depends on this one
    pub(crate) fn notify(&self, change: Change) { self.0.notify(change) }

    /// the direct dependencies of this object with their reference counts
    pub fn direct_dependencies(&self) -> Vec<(ShaderObject, usize)> { self.0.deps.borrow().clone() }

    /// how often this object references `dep` directly
    pub fn reference_count(&self, dep: &ShaderObject) -> usize {
        self.0.deps.borrow().iter().find(|(d, _)| d.id() == dep.id()).map_or(0, |(_, n)| *n)
    }

    /// ids of the live objects that directly depend on this one
    pub fn dependents(&self) -> Vec<ObjectId> {
        self.0.dependents.borrow().iter()
            .filter(|(_, observer)| observer.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect()
    }

    /// all dependencies of this object (recursively), followed by the object itself.
    ///
    /// if `sorted` is set, the direct dependencies of every object are visited
    /// with everything but variables first, then variables ordered by kind.
    /// Objects reachable on several paths appear several times.
    pub fn dependencies(&self, sorted: bool) -> Vec<ShaderObject> {
        let mut out = vec![];
        self.collect_dependencies(sorted, &mut out);
        out
    }

    fn collect_dependencies(&self, sorted: bool, out: &mut Vec<ShaderObject>) {
        let mut deps = self.0.deps.borrow().iter().map(|(d, _)| d.clone()).collect::<Vec<_>>();
        if sorted {
            deps.sort_by_key(|dep| match dep.as_variable() {
                None => (0, None),
                Some(var) => (1, var.kind()),
            });
        }
        for dep in deps {
            dep.collect_dependencies(sorted, out);
        }
        out.push(self.clone());
    }

    /// whether `other` is reachable from this object's dependencies
    pub fn depends_on(&self, other: &ShaderObject) -> bool {
        self.0.deps.borrow().iter().any(|(dep, _)| dep.id() == other.id() || dep.depends_on(other))
    }

    /// identifiers declared verbatim by this object's code, which
    /// generated names must not collide with
    pub fn static_names(&self) -> Vec<String> {
        match self.node_kind() {
            NodeKind::Function(_) => Function(self.clone()).static_names(),
            NodeKind::Chain(data) => vec![data.borrow().name.clone()],
            _ => vec![],
        }
    }

    /// the glsl text used where this object is referenced
    pub fn expression(&self, names: &Names) -> Result<String, Error> {
        match self.node_kind() {
            NodeKind::Text(text) => Ok(text.borrow().clone()),
            NodeKind::Call(_) => FunctionCall(self.clone()).expression(names),
            NodeKind::Statements(_) => StatementList(self.clone()).expression(names),
            NodeKind::Variable(_) |
            NodeKind::Function(_) |
            NodeKind::Chain(_) => names.get(self).map(str::to_string),
        }
    }

    /// the glsl declaration of this object, or `None` for inlined expressions
    pub(crate) fn definition(&self, names: &Names, stage: &mut StageContext) -> Result<Option<String>, Error> {
        match self.node_kind() {
            NodeKind::Variable(_) => Variable(self.clone()).definition(names, stage).map(Some),
            NodeKind::Function(_) => Function(self.clone()).definition(names, stage).map(Some),
            NodeKind::Chain(_) => FunctionChain(self.clone()).definition(names).map(Some),
            NodeKind::Text(_) |
            NodeKind::Call(_) |
            NodeKind::Statements(_) => Ok(None),
        }
    }

    /// compiles this object and its dependencies as a single stage named `"obj"`
    pub fn compile(&self) -> Result<String, Error> {
        let compiled = Compiler::new([("obj", self.clone())]).compile()?;
        Ok(compiled.get("obj").unwrap_or_default().to_string())
    }
}

impl PartialEq for ShaderObject {
    fn eq(&self, other: &Self) -> bool { self.id() == other.id() }
}

impl Eq for ShaderObject {}

impl Hash for ShaderObject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.id().hash(state) }
}

impl Debug for ShaderObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}>", self.describe(), self.id())
    }
}

/// implements `Deref<Target = ShaderObject>` and the conversions into a
/// plain [`ShaderObject`] for a typed handle
macro_rules! shader_object_handle {
    ($($handle: ident),* $(,)?) => {$(
        impl std::ops::Deref for $handle {
            type Target = ShaderObject;
            fn deref(&self) -> &ShaderObject { &self.0 }
        }

        impl From<$handle> for ShaderObject {
            fn from(handle: $handle) -> Self { handle.0 }
        }

        impl From<&$handle> for ShaderObject {
            fn from(handle: &$handle) -> Self { handle.0.clone() }
        }

        impl std::fmt::Debug for $handle {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { std::fmt::Debug::fmt(&self.0, f) }
        }

        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool { self.0 == other.0 }
        }

        impl Eq for $handle {}
    )*};
}

shader_object_handle!(Variable, Function, FunctionChain, FunctionCall, TextExpression, StatementList);

impl From<&ShaderObject> for ShaderObject {
    fn from(obj: &ShaderObject) -> Self { obj.clone() }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// records every change notification of the object it watches
    pub(crate) struct ChangeLog {
        id: ObjectId,
        changes: RefCell<Vec<Change>>,
    }

    impl ChangeLog {
        pub(crate) fn changes(&self) -> Vec<Change> { self.changes.borrow().clone() }

        pub(crate) fn count(&self) -> usize { self.changes.borrow().len() }
    }

    impl Observer for ChangeLog {
        fn observer_id(&self) -> ObjectId { self.id }

        fn on_dependency_changed(&self, _: ObjectId, change: Change) { self.changes.borrow_mut().push(change) }
    }

    pub(crate) fn watch(obj: &ShaderObject) -> Rc<ChangeLog> {
        let log = Rc::new(ChangeLog { id: ObjectId::next(), changes: Default::default() });
        let observer: Weak<dyn Observer> = Rc::<ChangeLog>::downgrade(&log);
        obj.subscribe(log.observer_id(), observer);
        log
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::watch, *};

    static_assertions::assert_not_impl_any!(ShaderObject: Send, Sync);

    fn text(s: &str) -> ShaderObject { TextExpression::new(s).into() }

    #[test]
    fn reference_counted_edges() {
        let a = text("a");
        let b = text("b");
        a.add_dependency(&b);
        a.add_dependency(&b);
        assert_eq!(a.reference_count(&b), 2);
        assert_eq!(b.dependents(), [a.id()]);

        a.remove_dependency(&b);
        assert_eq!(a.reference_count(&b), 1);
        assert_eq!(b.dependents(), [a.id()]);

        a.remove_dependency(&b);
        assert_eq!(a.reference_count(&b), 0);
        assert!(b.dependents().is_empty());
    }

    #[test]
    fn dropped_dependents_unregister() {
        let leaf = text("leaf");
        {
            let parent = text("parent");
            parent.add_dependency(&leaf);
            assert_eq!(leaf.dependents().len(), 1);
        }
        assert!(leaf.dependents().is_empty());
    }

    #[test]
    fn changes_propagate_transitively() {
        let leaf = text("leaf");
        let mid = text("mid");
        let root = text("root");
        mid.add_dependency(&leaf);
        root.add_dependency(&mid);

        let log = watch(&root);
        leaf.notify(Change::VALUE);
        assert_eq!(log.changes(), [Change::VALUE]);

        root.unsubscribe(log.observer_id());
        leaf.notify(Change::CODE);
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn dependencies_end_with_self() {
        let leaf = text("leaf");
        let root = text("root");
        root.add_dependency(&leaf);
        assert_eq!(root.dependencies(false), [leaf.clone(), root.clone()]);
        assert!(root.depends_on(&leaf));
        assert!(!leaf.depends_on(&root));
    }

    #[test]
    fn sorted_dependencies_put_variables_last() {
        let root = text("root");
        let uniform = Variable::parse("uniform float u").unwrap();
        let attribute = Variable::parse("attribute vec2 a").unwrap();
        let other = text("other");
        root.add_dependency(&attribute);
        root.add_dependency(&uniform);
        root.add_dependency(&other);
        assert_eq!(root.dependencies(true), [other, uniform.0.clone(), attribute.0.clone(), root.clone()]);
    }
}
