use super::{Formatter, Value};
use crate::Result;

/// Accepts every call and does nothing. Stands in for a disabled sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFormatter;

impl Formatter for NullFormatter {
    fn is_loading(&self) -> bool {
        false
    }
    fn has_document_tree(&self) -> bool {
        false
    }
    fn enter_record(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_record(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_field(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn leave_field(&mut self) -> Result<()> {
        Ok(())
    }
    fn try_enter_field(&mut self, _name: &str, _enter_when_writing: bool) -> Result<bool> {
        Ok(true)
    }
    fn enter_array(&mut self, _len: &mut u32) -> Result<()> {
        Ok(())
    }
    fn leave_array(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_array_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_array_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_stream(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_stream(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_stream_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_stream_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_map(&mut self, _len: &mut u32) -> Result<()> {
        Ok(())
    }
    fn leave_map(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_map_element(&mut self, _name: &mut String) -> Result<()> {
        Ok(())
    }
    fn leave_map_element(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_attributed_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_attributed_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn enter_attribute(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn leave_attribute(&mut self) -> Result<()> {
        Ok(())
    }
    fn try_enter_attribute(&mut self, _name: &str, _enter_when_writing: bool) -> Result<bool> {
        Ok(true)
    }
    fn enter_attributed_value_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn leave_attributed_value_value(&mut self) -> Result<()> {
        Ok(())
    }
    fn try_enter_attributed_value_value(&mut self) -> Result<bool> {
        Ok(true)
    }
    fn serialize(&mut self, _value: Value<'_>) -> Result<()> {
        Ok(())
    }
}
