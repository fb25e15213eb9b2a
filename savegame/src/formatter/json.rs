use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Number, Value as JsonValue};
use tracing::trace;

use super::{Formatter, Value, ATTRIBUTED_VALUE_FIELD};
use crate::Result;

/// One open container of the document being built.
#[derive(Debug)]
enum Node {
    /// Records, maps and attributed values. `field` is the name the next value lands under.
    Object {
        object: Map<String, JsonValue>,
        field: Option<String>,
    },
    /// Arrays and streams.
    Array(Vec<JsonValue>),
}

/// Builds a JSON document from a save traversal. Write only.
///
/// Records, maps and attributed values become objects, arrays and streams become arrays. A
/// finished container is attached to its parent when it is left; assigning a field that already
/// holds a value replaces it, which is how rewritten placeholders end up with their final value.
#[derive(Debug, Default)]
pub struct JsonOutputFormatter {
    stack: Vec<Node>,
    root: Option<JsonValue>,
}

impl JsonOutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished document, `None` until the root container has been left.
    pub fn root(&self) -> Option<&JsonValue> {
        self.root.as_ref()
    }

    /// Takes the finished root object out of the formatter.
    pub fn into_root(self) -> Option<Map<String, JsonValue>> {
        match self.root {
            Some(JsonValue::Object(object)) => Some(object),
            _ => None,
        }
    }

    /// Replaces the contents of the current, still empty, record with a prebuilt subtree.
    pub fn graft(&mut self, subtree: Map<String, JsonValue>) {
        match self.stack.last_mut() {
            Some(Node::Object { object, .. }) => {
                assert!(object.is_empty(), "graft target record already has fields");
                *object = subtree;
            }
            _ => panic!("graft outside of a record"),
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn attach(&mut self, value: JsonValue) {
        match self.stack.last_mut() {
            Some(Node::Object { object, field }) => {
                let field = field.as_ref().expect("value written without a field name");
                object.insert(field.clone(), value);
            }
            Some(Node::Array(values)) => values.push(value),
            None => {
                assert!(self.root.is_none(), "JSON root assigned twice");
                self.root = Some(value);
            }
        }
    }

    fn push_object(&mut self) {
        self.stack.push(Node::Object {
            object: Map::new(),
            field: None,
        });
    }

    fn pop(&mut self) {
        let value = match self.stack.pop().expect("leave without matching enter") {
            Node::Object { object, .. } => JsonValue::Object(object),
            Node::Array(values) => JsonValue::Array(values),
        };
        self.attach(value);
    }

    fn set_field(&mut self, name: &str) {
        match self.stack.last_mut() {
            Some(Node::Object { field, .. }) => *field = Some(name.to_owned()),
            _ => panic!("field {name:?} entered inside a stream"),
        }
    }

    fn clear_field(&mut self) {
        if let Some(Node::Object { field, .. }) = self.stack.last_mut() {
            assert!(field.take().is_some(), "leave field without a field name");
        }
    }

    fn set_number(&mut self, number: impl Into<Number>) {
        self.attach(JsonValue::Number(number.into()));
    }

    fn set_float(&mut self, value: f64) {
        self.attach(Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number));
    }

    fn set_string(&mut self, value: &str) {
        self.attach(JsonValue::String(value.to_owned()));
    }
}

impl Formatter for JsonOutputFormatter {
    fn is_loading(&self) -> bool {
        false
    }
    fn has_document_tree(&self) -> bool {
        true
    }

    fn enter_record(&mut self) -> Result<()> {
        trace!("{:depth$}enter_record", "", depth = self.depth());
        self.push_object();
        Ok(())
    }
    fn leave_record(&mut self) -> Result<()> {
        self.pop();
        trace!("{:depth$}leave_record", "", depth = self.depth());
        Ok(())
    }
    fn enter_field(&mut self, name: &str) -> Result<()> {
        trace!("{:depth$}enter_field: {name}", "", depth = self.depth());
        self.set_field(name);
        Ok(())
    }
    fn leave_field(&mut self) -> Result<()> {
        trace!("{:depth$}leave_field", "", depth = self.depth());
        self.clear_field();
        Ok(())
    }
    fn try_enter_field(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        if enter_when_writing {
            self.enter_field(name)?;
        }
        Ok(enter_when_writing)
    }

    fn enter_array(&mut self, len: &mut u32) -> Result<()> {
        trace!("{:depth$}enter_array: {len}", "", depth = self.depth());
        self.stack.push(Node::Array(Vec::with_capacity(*len as usize)));
        Ok(())
    }
    fn leave_array(&mut self) -> Result<()> {
        self.pop();
        trace!("{:depth$}leave_array", "", depth = self.depth());
        Ok(())
    }
    fn enter_array_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_array_element(&mut self) -> Result<()> {
        Ok(())
    }

    fn enter_stream(&mut self) -> Result<()> {
        trace!("{:depth$}enter_stream", "", depth = self.depth());
        self.stack.push(Node::Array(vec![]));
        Ok(())
    }
    fn leave_stream(&mut self) -> Result<()> {
        self.pop();
        trace!("{:depth$}leave_stream", "", depth = self.depth());
        Ok(())
    }
    fn enter_stream_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_stream_element(&mut self) -> Result<()> {
        Ok(())
    }

    fn enter_map(&mut self, len: &mut u32) -> Result<()> {
        trace!("{:depth$}enter_map: {len}", "", depth = self.depth());
        self.push_object();
        Ok(())
    }
    fn leave_map(&mut self) -> Result<()> {
        self.pop();
        trace!("{:depth$}leave_map", "", depth = self.depth());
        Ok(())
    }
    fn enter_map_element(&mut self, name: &mut String) -> Result<()> {
        trace!("{:depth$}enter_map_element: {name}", "", depth = self.depth());
        self.set_field(name);
        Ok(())
    }
    fn leave_map_element(&mut self) -> Result<()> {
        self.clear_field();
        Ok(())
    }

    fn enter_attributed_value(&mut self) -> Result<()> {
        trace!("{:depth$}enter_attributed_value", "", depth = self.depth());
        self.push_object();
        Ok(())
    }
    fn leave_attributed_value(&mut self) -> Result<()> {
        self.pop();
        trace!("{:depth$}leave_attributed_value", "", depth = self.depth());
        Ok(())
    }
    fn enter_attribute(&mut self, name: &str) -> Result<()> {
        trace!("{:depth$}enter_attribute: {name}", "", depth = self.depth());
        self.set_field(name);
        Ok(())
    }
    fn leave_attribute(&mut self) -> Result<()> {
        self.clear_field();
        Ok(())
    }
    fn try_enter_attribute(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        if enter_when_writing {
            self.enter_attribute(name)?;
        }
        Ok(enter_when_writing)
    }
    fn enter_attributed_value_value(&mut self) -> Result<()> {
        trace!("{:depth$}enter_attributed_value_value", "", depth = self.depth());
        self.set_field(ATTRIBUTED_VALUE_FIELD);
        Ok(())
    }
    fn leave_attributed_value_value(&mut self) -> Result<()> {
        self.clear_field();
        Ok(())
    }
    fn try_enter_attributed_value_value(&mut self) -> Result<bool> {
        self.enter_attributed_value_value()?;
        Ok(true)
    }

    fn serialize(&mut self, value: Value<'_>) -> Result<()> {
        match value {
            Value::U8(v) => self.set_number(*v),
            Value::U16(v) => self.set_number(*v),
            Value::U32(v) => self.set_number(*v),
            Value::U64(v) => self.set_number(*v),
            Value::I8(v) => self.set_number(*v),
            Value::I16(v) => self.set_number(*v),
            Value::I32(v) => self.set_number(*v),
            Value::I64(v) => self.set_number(*v),
            Value::F32(v) => self.set_float(*v as f64),
            Value::F64(v) => self.set_float(*v),
            Value::Bool(v) => self.set_number(*v as u8),
            Value::String(v) => self.set_string(v),
            Value::Bytes(v) => self.attach(JsonValue::String(STANDARD.encode(v.as_slice()))),
            Value::Guid(v) => self.set_string(&v.to_string()),
            Value::Object(v) => match v {
                Some(path) => self.set_string(path.as_str()),
                None => self.attach(JsonValue::Null),
            },
        }
        Ok(())
    }
}
