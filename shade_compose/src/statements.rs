use std::cell::{Ref, RefCell, RefMut};

use crate::{compiler::Names, object::NodeKind, Bindable, Change, Error, ShaderObject};

/// position of items added without an explicit one
const DEFAULT_POSITION: i32 = 5;

pub(crate) struct StatementData {
    pub(crate) items: Vec<(ShaderObject, i32)>,
}

/// an ordered list of statements, inlined as one `expression;` per line.
///
/// items are sorted by position (ties keep insertion order). Typically bound
/// to a `pre`/`post` hook so that several components can inject code into one
/// function.
#[derive(Clone)]
pub struct StatementList(pub(crate) ShaderObject);

impl StatementList {
    pub fn new() -> StatementList {
        StatementList(ShaderObject::from_kind(NodeKind::Statements(RefCell::new(StatementData { items: vec![] }))))
    }

    fn data(&self) -> Ref<'_, StatementData> { unwrap_variant!(self.0.node_kind(), NodeKind::Statements(data) => data.borrow()) }

    fn data_mut(&self) -> RefMut<'_, StatementData> { unwrap_variant!(self.0.node_kind(), NodeKind::Statements(data) => data.borrow_mut()) }

    pub fn add(&self, item: impl Into<Bindable>) -> Result<(), Error> { self.add_at(item, DEFAULT_POSITION) }

    /// adds `item` at `position`. Adding an item that is already present
    /// (the same object, or equal text) only moves it.
    pub fn add_at(&self, item: impl Into<Bindable>, position: i32) -> Result<(), Error> {
        let item = item.into();
        let existing = self.data().items.iter().position(|(obj, _)| match &item {
            Bindable::Object(new) => obj == new,
            Bindable::Text(text) => obj.as_text().is_some_and(|t| t.text() == *text),
            Bindable::Value(_) => false,
        });
        if let Some(i) = existing {
            let mut data = self.data_mut();
            if data.items[i].1 == position {
                return Ok(());
            }
            data.items[i].1 = position;
        } else {
            let obj = ShaderObject::create(item, None)?;
            self.check_no_cycle(&obj)?;
            self.data_mut().items.push((obj.clone(), position));
            self.add_dependency(&obj);
        }
        self.notify(Change::CODE);
        Ok(())
    }

    /// returns whether `item` was part of the list
    pub fn remove(&self, item: &ShaderObject) -> bool {
        let removed = {
            let mut data = self.data_mut();
            data.items.iter().position(|(obj, _)| obj == item).map(|i| data.items.remove(i).0)
        };
        match removed {
            Some(obj) => {
                self.remove_dependency(&obj);
                self.notify(Change::CODE);
                true
            }
            None => false,
        }
    }

    /// the items in the order they are emitted
    pub fn items(&self) -> Vec<ShaderObject> {
        let mut items = self.data().items.clone();
        items.sort_by_key(|(_, position)| *position);
        items.into_iter().map(|(obj, _)| obj).collect()
    }

    pub fn len(&self) -> usize { self.data().items.len() }

    pub fn is_empty(&self) -> bool { self.data().items.is_empty() }

    pub(crate) fn expression(&self, names: &Names) -> Result<String, Error> {
        let mut code = String::new();
        for item in self.items() {
            code += &item.expression(names)?;
            code += ";\n";
        }
        Ok(code)
    }
}

impl Default for StatementList {
    fn default() -> Self { Self::new() }
}
