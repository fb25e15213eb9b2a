use std::fmt::Display;

use tracing::{enabled, trace, Level};

use super::{Formatter, Value};
use crate::{archive::VersionedArchive, Result};

/// Forwards every call to `primary`, then to `secondary`.
///
/// The primary sink is the authoritative one: it decides loading direction and owns the
/// underlying archive. Values reach the secondary after the primary has handled them, so while
/// loading the secondary observes what the primary read.
#[derive(Debug, Default)]
pub struct ProxyFormatter<P, S> {
    primary: P,
    secondary: S,
    depth: usize,
}

impl<P: Formatter, S: Formatter> ProxyFormatter<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            depth: 0,
        }
    }
    pub fn primary(&self) -> &P {
        &self.primary
    }
    pub fn primary_mut(&mut self) -> &mut P {
        &mut self.primary
    }
    pub fn secondary(&self) -> &S {
        &self.secondary
    }
    pub fn secondary_mut(&mut self) -> &mut S {
        &mut self.secondary
    }
    pub fn into_inner(self) -> (P, S) {
        (self.primary, self.secondary)
    }

    fn log(&mut self, call: impl Display) {
        if !enabled!(Level::TRACE) {
            return;
        }
        let position = self.primary.underlying_archive().map(|ar| ar.tell());
        trace!("[{position:?}] {:depth$}{call}", "", depth = self.depth);
    }
    fn enter(&mut self, call: impl Display) {
        self.log(call);
        self.depth += 1;
    }
    fn leave(&mut self, call: impl Display) {
        self.depth = self.depth.saturating_sub(1);
        self.log(call);
    }
}

/// Calls `$method` on both sinks, primary first.
macro_rules! both {
    ($self:ident.$method:ident($($arg:expr),*)) => {{
        $self.primary.$method($($arg),*)?;
        $self.secondary.$method($($arg),*)
    }};
}

impl<P: Formatter, S: Formatter> Formatter for ProxyFormatter<P, S> {
    fn is_loading(&self) -> bool {
        self.primary.is_loading()
    }
    fn has_document_tree(&self) -> bool {
        self.primary.has_document_tree() || self.secondary.has_document_tree()
    }
    fn underlying_archive(&mut self) -> Option<&mut VersionedArchive> {
        self.primary.underlying_archive()
    }

    fn enter_record(&mut self) -> Result<()> {
        self.enter("enter_record");
        both!(self.enter_record())
    }
    fn leave_record(&mut self) -> Result<()> {
        self.leave("leave_record");
        both!(self.leave_record())
    }
    fn enter_field(&mut self, name: &str) -> Result<()> {
        self.enter(format_args!("enter_field: {name}"));
        both!(self.enter_field(name))
    }
    fn leave_field(&mut self) -> Result<()> {
        self.leave("leave_field");
        both!(self.leave_field())
    }
    fn try_enter_field(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        let primary = self.primary.try_enter_field(name, enter_when_writing)?;
        let secondary = self.secondary.try_enter_field(name, enter_when_writing)?;
        match (primary, secondary) {
            (true, false) => self.primary.leave_field()?,
            (false, true) => self.secondary.leave_field()?,
            _ => {}
        }
        let entered = primary && secondary;
        if entered {
            self.enter(format_args!("try_enter_field: {name}"));
        } else {
            self.log(format_args!("try_enter_field: {name} (absent)"));
        }
        Ok(entered)
    }

    fn enter_array(&mut self, len: &mut u32) -> Result<()> {
        both!(self.enter_array(len))?;
        self.enter(format_args!("enter_array: {len}"));
        Ok(())
    }
    fn leave_array(&mut self) -> Result<()> {
        self.leave("leave_array");
        both!(self.leave_array())
    }
    fn enter_array_element(&mut self) -> Result<()> {
        self.enter("enter_array_element");
        both!(self.enter_array_element())
    }
    fn leave_array_element(&mut self) -> Result<()> {
        self.leave("leave_array_element");
        both!(self.leave_array_element())
    }

    fn enter_stream(&mut self) -> Result<()> {
        self.enter("enter_stream");
        both!(self.enter_stream())
    }
    fn leave_stream(&mut self) -> Result<()> {
        self.leave("leave_stream");
        both!(self.leave_stream())
    }
    fn enter_stream_element(&mut self) -> Result<()> {
        self.enter("enter_stream_element");
        both!(self.enter_stream_element())
    }
    fn leave_stream_element(&mut self) -> Result<()> {
        self.leave("leave_stream_element");
        both!(self.leave_stream_element())
    }

    fn enter_map(&mut self, len: &mut u32) -> Result<()> {
        both!(self.enter_map(len))?;
        self.enter(format_args!("enter_map: {len}"));
        Ok(())
    }
    fn leave_map(&mut self) -> Result<()> {
        self.leave("leave_map");
        both!(self.leave_map())
    }
    fn enter_map_element(&mut self, name: &mut String) -> Result<()> {
        both!(self.enter_map_element(name))?;
        self.enter(format_args!("enter_map_element: {name}"));
        Ok(())
    }
    fn leave_map_element(&mut self) -> Result<()> {
        self.leave("leave_map_element");
        both!(self.leave_map_element())
    }

    fn enter_attributed_value(&mut self) -> Result<()> {
        self.enter("enter_attributed_value");
        both!(self.enter_attributed_value())
    }
    fn leave_attributed_value(&mut self) -> Result<()> {
        self.leave("leave_attributed_value");
        both!(self.leave_attributed_value())
    }
    fn enter_attribute(&mut self, name: &str) -> Result<()> {
        self.enter(format_args!("enter_attribute: {name}"));
        both!(self.enter_attribute(name))
    }
    fn leave_attribute(&mut self) -> Result<()> {
        self.leave("leave_attribute");
        both!(self.leave_attribute())
    }
    fn try_enter_attribute(&mut self, name: &str, enter_when_writing: bool) -> Result<bool> {
        let primary = self.primary.try_enter_attribute(name, enter_when_writing)?;
        let secondary = self.secondary.try_enter_attribute(name, enter_when_writing)?;
        match (primary, secondary) {
            (true, false) => self.primary.leave_attribute()?,
            (false, true) => self.secondary.leave_attribute()?,
            _ => {}
        }
        let entered = primary && secondary;
        if entered {
            self.enter(format_args!("try_enter_attribute: {name}"));
        }
        Ok(entered)
    }
    fn enter_attributed_value_value(&mut self) -> Result<()> {
        self.enter("enter_attributed_value_value");
        both!(self.enter_attributed_value_value())
    }
    fn leave_attributed_value_value(&mut self) -> Result<()> {
        self.leave("leave_attributed_value_value");
        both!(self.leave_attributed_value_value())
    }
    fn try_enter_attributed_value_value(&mut self) -> Result<bool> {
        let primary = self.primary.try_enter_attributed_value_value()?;
        let secondary = self.secondary.try_enter_attributed_value_value()?;
        match (primary, secondary) {
            (true, false) => self.primary.leave_attributed_value_value()?,
            (false, true) => self.secondary.leave_attributed_value_value()?,
            _ => {}
        }
        let entered = primary && secondary;
        if entered {
            self.enter("try_enter_attributed_value_value");
        }
        Ok(entered)
    }

    fn serialize(&mut self, mut value: Value<'_>) -> Result<()> {
        self.primary.serialize(value.reborrow())?;
        self.secondary.serialize(value)?;
        self.log("serialize");
        Ok(())
    }
}
