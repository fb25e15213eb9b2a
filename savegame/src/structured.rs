//! A checked traversal session over a [`Formatter`].
//!
//! [`StructuredArchive`] exposes the document grammar as closure scopes, so every `enter_*` is
//! paired with its `leave_*` by construction, and validates the nesting it is driven with
//! through a [`FormatterStack`]. Grammar violations are programmer errors and panic.

use std::collections::HashSet;

use crate::{
    archive::VersionedArchive,
    formatter::{ArchiveValue, Formatter, ATTRIBUTED_VALUE_FIELD},
    version::FGuid,
    Error, Result,
};

/// Kind of an open scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Record,
    Field,
    Array,
    ArrayElement,
    Stream,
    StreamElement,
    Map,
    MapElement,
    AttributedValue,
    Attribute,
    AttributedValueValue,
}

impl Scope {
    /// Scopes that hold exactly one value (a scalar or a container).
    fn is_slot(self) -> bool {
        matches!(
            self,
            Scope::Field
                | Scope::ArrayElement
                | Scope::StreamElement
                | Scope::MapElement
                | Scope::Attribute
                | Scope::AttributedValueValue
        )
    }
}

/// One open scope with what has been written into it so far.
#[derive(Debug, Clone)]
struct Frame {
    scope: Scope,
    /// A slot already holds its value.
    filled: bool,
    /// Field, map element or attribute names already used directly under this scope.
    names: HashSet<String>,
}

/// The currently open scopes, innermost last.
#[derive(Debug, Default, Clone)]
pub struct FormatterStack {
    frames: Vec<Frame>,
    root_used: bool,
}

impl FormatterStack {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
    pub fn current(&self) -> Option<Scope> {
        self.frames.last().map(|frame| frame.scope)
    }
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn push(&mut self, scope: Scope) {
        self.frames.push(Frame {
            scope,
            filled: false,
            names: HashSet::new(),
        });
    }

    fn assert_value_slot(&mut self, what: &str) {
        match self.frames.last_mut() {
            None => {
                assert!(!self.root_used, "second root value ({what})");
                self.root_used = true;
            }
            Some(frame) => {
                let scope = frame.scope;
                assert!(scope.is_slot(), "{what} inside {scope:?} without a named slot");
                assert!(!frame.filled, "{what} written into a {scope:?} that already holds a value");
                frame.filled = true;
            }
        }
    }

    /// Claims `name` under the innermost scope. False if it is already taken.
    fn try_claim_name(&mut self, name: &str) -> bool {
        match self.frames.last_mut() {
            Some(frame) => frame.names.insert(name.to_owned()),
            None => true,
        }
    }

    fn claim_name(&mut self, name: &str) {
        let claimed = self.try_claim_name(name);
        assert!(claimed, "duplicate name {name:?} in {:?}", self.current());
    }

    /// Opens a value-level scope (a record, array, stream, map or attributed value).
    fn enter_value(&mut self, scope: Scope) {
        self.assert_value_slot(&format!("{scope:?}"));
        self.push(scope);
    }

    /// Opens a child scope of `parent`, which must be the innermost scope.
    fn enter_child(&mut self, parent: Scope, scope: Scope) {
        assert_eq!(
            self.current(),
            Some(parent),
            "{scope:?} must be entered directly inside {parent:?}"
        );
        self.push(scope);
    }

    /// Opens a named child scope of `parent`.
    fn enter_named_child(&mut self, parent: Scope, scope: Scope, name: &str) {
        assert_eq!(
            self.current(),
            Some(parent),
            "{scope:?} {name:?} must be entered directly inside {parent:?}"
        );
        self.claim_name(name);
        self.push(scope);
    }

    fn leave(&mut self, scope: Scope) {
        let top = self.frames.pop().map(|frame| frame.scope);
        assert_eq!(top, Some(scope), "leave {scope:?} does not match innermost scope");
    }

    fn serialize(&mut self) {
        self.assert_value_slot("value");
    }
}

/// A traversal session: a formatter plus the scope validator.
#[derive(Debug)]
pub struct StructuredArchive<F> {
    formatter: F,
    stack: FormatterStack,
}

impl<F: Formatter> StructuredArchive<F> {
    pub fn new(formatter: F) -> Self {
        Self {
            formatter,
            stack: FormatterStack::new(),
        }
    }
    pub fn formatter(&self) -> &F {
        &self.formatter
    }
    pub fn formatter_mut(&mut self) -> &mut F {
        &mut self.formatter
    }
    pub fn into_formatter(self) -> F {
        assert!(self.stack.is_empty(), "session closed with open scopes");
        self.formatter
    }
    pub fn stack(&self) -> &FormatterStack {
        &self.stack
    }
    pub fn is_loading(&self) -> bool {
        self.formatter.is_loading()
    }
    pub fn underlying_archive(&mut self) -> Option<&mut VersionedArchive> {
        self.formatter.underlying_archive()
    }

    /// Registers `latest` for `id` when saving and returns the version the data uses.
    ///
    /// While loading this is the version the data was written with, `None` if it was never
    /// registered. Sessions without a byte archive report `None`.
    pub fn use_custom_version(&mut self, id: FGuid, latest: i32, label: &str) -> Option<i32> {
        self.underlying_archive()
            .and_then(|ar| ar.using_custom_version(id, latest, label))
    }

    pub fn enter_record(&mut self) -> Result<()> {
        self.stack.enter_value(Scope::Record);
        self.formatter.enter_record()
    }
    pub fn leave_record(&mut self) -> Result<()> {
        self.stack.leave(Scope::Record);
        self.formatter.leave_record()
    }
    pub fn record<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter_record()?;
        let result = f(self)?;
        self.leave_record()?;
        Ok(result)
    }

    pub fn field<T>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack.enter_named_child(Scope::Record, Scope::Field, name);
        self.formatter.enter_field(name)?;
        let result = f(self)?;
        self.stack.leave(Scope::Field);
        self.formatter.leave_field()?;
        Ok(result)
    }
    /// Visits an optional field. On save it is present iff `enter_when_writing`; on load iff
    /// the data contains it.
    pub fn try_field<T>(
        &mut self,
        name: &str,
        enter_when_writing: bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        assert_eq!(
            self.stack.current(),
            Some(Scope::Record),
            "field {name:?} outside of a record"
        );
        if !self.formatter.try_enter_field(name, enter_when_writing)? {
            return Ok(None);
        }
        self.stack.claim_name(name);
        self.stack.push(Scope::Field);
        let result = f(self)?;
        self.stack.leave(Scope::Field);
        self.formatter.leave_field()?;
        Ok(Some(result))
    }
    /// Revisits fields of the current record that were already written, to patch
    /// placeholders after seeking back. Names used inside `f` may repeat earlier ones.
    pub fn rewrite<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        assert_eq!(
            self.stack.current(),
            Some(Scope::Record),
            "rewrite outside of a record"
        );
        let depth = self.stack.depth();
        let names = std::mem::take(&mut self.stack.frames[depth - 1].names);
        let result = f(self);
        if let Some(frame) = self.stack.frames.get_mut(depth - 1) {
            frame.names.extend(names);
        }
        result
    }
    pub fn serialize_field<V: ArchiveValue>(&mut self, name: &str, value: &mut V) -> Result<()> {
        self.field(name, |ar| ar.value(value))
    }

    pub fn array<T>(
        &mut self,
        len: &mut u32,
        f: impl FnOnce(&mut Self, usize) -> Result<T>,
    ) -> Result<T> {
        self.stack.enter_value(Scope::Array);
        self.formatter.enter_array(len)?;
        let result = f(self, *len as usize)?;
        self.stack.leave(Scope::Array);
        self.formatter.leave_array()?;
        Ok(result)
    }
    pub fn array_element<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack.enter_child(Scope::Array, Scope::ArrayElement);
        self.formatter.enter_array_element()?;
        let result = f(self)?;
        self.stack.leave(Scope::ArrayElement);
        self.formatter.leave_array_element()?;
        Ok(result)
    }

    pub fn stream<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack.enter_value(Scope::Stream);
        self.formatter.enter_stream()?;
        let result = f(self)?;
        self.stack.leave(Scope::Stream);
        self.formatter.leave_stream()?;
        Ok(result)
    }
    pub fn stream_element<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack.enter_child(Scope::Stream, Scope::StreamElement);
        self.formatter.enter_stream_element()?;
        let result = f(self)?;
        self.stack.leave(Scope::StreamElement);
        self.formatter.leave_stream_element()?;
        Ok(result)
    }

    pub fn map<T>(
        &mut self,
        len: &mut u32,
        f: impl FnOnce(&mut Self, usize) -> Result<T>,
    ) -> Result<T> {
        self.stack.enter_value(Scope::Map);
        self.formatter.enter_map(len)?;
        let result = f(self, *len as usize)?;
        self.stack.leave(Scope::Map);
        self.formatter.leave_map()?;
        Ok(result)
    }
    /// Visits one map entry. `name` is written on save and filled in on load.
    pub fn map_element<T>(
        &mut self,
        name: &mut String,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        assert_eq!(
            self.stack.current(),
            Some(Scope::Map),
            "map element outside of a map"
        );
        self.formatter.enter_map_element(name)?;
        assert!(!name.is_empty(), "map element without a name");
        if !self.stack.try_claim_name(name) {
            // Saved data with a repeated key is corrupt; code writing one is a bug.
            if self.is_loading() {
                return Err(Error::Other(format!("duplicate map key {name:?}")));
            }
            panic!("duplicate name {name:?} in Map");
        }
        self.stack.push(Scope::MapElement);
        let result = f(self)?;
        self.stack.leave(Scope::MapElement);
        self.formatter.leave_map_element()?;
        Ok(result)
    }

    pub fn attributed_value<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack.enter_value(Scope::AttributedValue);
        self.formatter.enter_attributed_value()?;
        let result = f(self)?;
        self.stack.leave(Scope::AttributedValue);
        self.formatter.leave_attributed_value()?;
        Ok(result)
    }
    pub fn attribute<T>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack
            .enter_named_child(Scope::AttributedValue, Scope::Attribute, name);
        self.formatter.enter_attribute(name)?;
        let result = f(self)?;
        self.stack.leave(Scope::Attribute);
        self.formatter.leave_attribute()?;
        Ok(result)
    }
    pub fn try_attribute<T>(
        &mut self,
        name: &str,
        enter_when_writing: bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        assert_eq!(
            self.stack.current(),
            Some(Scope::AttributedValue),
            "attribute {name:?} outside of an attributed value"
        );
        if !self.formatter.try_enter_attribute(name, enter_when_writing)? {
            return Ok(None);
        }
        self.stack.claim_name(name);
        self.stack.push(Scope::Attribute);
        let result = f(self)?;
        self.stack.leave(Scope::Attribute);
        self.formatter.leave_attribute()?;
        Ok(Some(result))
    }
    /// Visits the primary value of the current attributed value.
    pub fn attributed_value_value<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.stack.enter_named_child(
            Scope::AttributedValue,
            Scope::AttributedValueValue,
            ATTRIBUTED_VALUE_FIELD,
        );
        self.formatter.enter_attributed_value_value()?;
        let result = f(self)?;
        self.stack.leave(Scope::AttributedValueValue);
        self.formatter.leave_attributed_value_value()?;
        Ok(result)
    }

    /// Writes or reads one scalar into the current slot.
    pub fn value<V: ArchiveValue>(&mut self, value: &mut V) -> Result<()> {
        self.stack.serialize();
        self.formatter.serialize(value.as_value())
    }
}
