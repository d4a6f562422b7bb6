//! Pull parser over an AXML stream, in the style of `XmlPullParser`.

use std::io::Read;

use log::debug;

use crate::chunk::{Attribute, Chunk, ChunkType};
use crate::cursor::ByteCursor;
use crate::namespace::NamespaceStack;
use crate::string_pool::StringPool;
use crate::value::ValueType;
use crate::{AxmlError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventType {
    StartDocument,
    EndDocument,
    StartTag,
    EndTag,
    Text,
}

/// Reads the events of an AXML document one at a time.
///
/// The header and string pool, along with any resource map written before the pool, are read on the
/// first call to [`AxmlParser::advance`].
/// Namespace and resource map chunks are consumed silently, updating the parser's state.
/// Any error closes the parser.
pub struct AxmlParser<R: Read> {
    cursor: Option<ByteCursor<R>>,
    operational: bool,

    strings: StringPool,
    resource_ids: Vec<u32>,
    namespaces: NamespaceStack,
    decrease_depth: bool,

    event: Option<EventType>,
    // Tag of the chunk that was read before the fake START_DOCUMENT event was produced.
    pending_tag: Option<u32>,

    line_number: Option<u32>,
    // Kept through errors and `close`, for `position_description`
    last_line: Option<u32>,
    name: i32,
    namespace_uri: i32,
    text: i32,
    attributes: Vec<Attribute>,
    // 0-based, -1 if not present
    id_attribute: i32,
    class_attribute: i32,
    style_attribute: i32,
}

impl<R: Read> AxmlParser<R> {
    pub fn open(data: R) -> Self {
        Self {
            cursor: Some(ByteCursor::le(data)),
            operational: false,
            strings: StringPool::new(false),
            resource_ids: Vec::new(),
            namespaces: NamespaceStack::new(),
            decrease_depth: false,
            event: None,
            pending_tag: None,
            line_number: None,
            last_line: None,
            name: -1,
            namespace_uri: -1,
            text: -1,
            attributes: Vec::new(),
            id_attribute: -1,
            class_attribute: -1,
            style_attribute: -1,
        }
    }

    /// Releases the underlying reader. Further calls to `advance` will fail.
    pub fn close(&mut self) {
        if !self.operational && self.cursor.is_none() {
            return;
        }

        self.cursor = None;
        self.operational = false;
        self.strings = StringPool::new(false);
        self.resource_ids.clear();
        self.namespaces.reset();
        self.decrease_depth = false;
        self.pending_tag = None;
        self.reset_event_info();
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Moves to the next event and returns its type.
    /// Once `EndDocument` is reached it is returned by every subsequent call.
    pub fn advance(&mut self) -> Result<EventType> {
        match self.do_next() {
            Ok(event) => Ok(event),
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    /// Advances, skipping whitespace-only text, and requires that the parser lands on a start or end tag.
    pub fn next_tag(&mut self) -> Result<EventType> {
        let mut event = self.advance()?;
        if event == EventType::Text && self.is_whitespace() {
            event = self.advance()?;
        }

        match event {
            EventType::StartTag | EventType::EndTag => Ok(event),
            other => Err(AxmlError::InvalidFormat(format!(
                "expected a start or end tag, found {other:?}"
            ))),
        }
    }

    /// Reads the text content of the current element.
    /// The parser must be on a start tag, and is left on the matching end tag.
    pub fn next_text(&mut self) -> Result<String> {
        if self.event != Some(EventType::StartTag) {
            return Err(AxmlError::IllegalState(
                "parser must be on a start tag to read text".to_string(),
            ));
        }

        match self.advance()? {
            EventType::Text => {
                let result = self.text().unwrap_or_default().to_string();
                if self.advance()? != EventType::EndTag {
                    return Err(AxmlError::InvalidFormat(
                        "text must be immediately followed by an end tag".to_string(),
                    ));
                }
                Ok(result)
            }
            EventType::EndTag => Ok(String::new()),
            other => Err(AxmlError::InvalidFormat(format!(
                "expected text or an end tag, found {other:?}"
            ))),
        }
    }

    /// Checks that the current event has the given type and, if provided, namespace and name.
    pub fn require(&self, event: EventType, namespace: Option<&str>, name: Option<&str>) -> Result<()> {
        let matches = self.event == Some(event)
            && namespace.map_or(true, |namespace| namespace == self.namespace())
            && name.map_or(true, |name| Some(name) == self.name());

        if matches {
            Ok(())
        } else {
            Err(AxmlError::InvalidFormat(format!(
                "{event:?} is expected, found {:?} at {}",
                self.event,
                self.position_description()
            )))
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.event
    }

    /// The name of the current start or end tag.
    pub fn name(&self) -> Option<&str> {
        match self.event {
            Some(EventType::StartTag | EventType::EndTag) if self.name != -1 => {
                Some(self.strings.get(self.name))
            }
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self.event {
            Some(EventType::Text) if self.text != -1 => Some(self.strings.get(self.text)),
            _ => None,
        }
    }

    pub fn namespace(&self) -> &str {
        self.strings.get(self.namespace_uri)
    }

    pub fn prefix(&self) -> &str {
        self.namespaces
            .find_prefix(self.namespace_uri)
            .map(|prefix| self.strings.get(prefix))
            .unwrap_or_default()
    }

    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Describes the line of the most recent event that had one, even after an error has closed the parser.
    pub fn position_description(&self) -> String {
        match self.last_line {
            Some(line) => format!("XML line #{line}"),
            None => "XML line #-1".to_string(),
        }
    }

    /// Depth of the current element: 0 for the root element, -1 outside of it.
    pub fn depth(&self) -> i32 {
        self.namespaces.depth() as i32 - 2
    }

    /// The number of namespaces declared in the first `depth` frames of the namespace stack.
    pub fn namespace_count(&self, depth: usize) -> usize {
        self.namespaces.accumulated_count(depth)
    }

    pub fn namespace_prefix(&self, position: usize) -> &str {
        self.namespaces
            .prefix_at(position)
            .map(|prefix| self.strings.get(prefix))
            .unwrap_or_default()
    }

    pub fn namespace_uri(&self, position: usize) -> &str {
        self.namespaces
            .uri_at(position)
            .map(|uri| self.strings.get(uri))
            .unwrap_or_default()
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.strings
    }

    pub fn resource_ids(&self) -> &[u32] {
        &self.resource_ids
    }

    // ---- attributes ----

    pub fn attribute_count(&self) -> Result<usize> {
        self.require_start_tag()?;
        Ok(self.attributes.len())
    }

    /// The raw attribute record at `index`.
    pub fn attribute(&self, index: usize) -> Result<&Attribute> {
        self.require_start_tag()?;
        self.attributes.get(index).ok_or_else(|| {
            AxmlError::InvalidArgument(format!(
                "attribute index {index} out of range, element has {} attributes",
                self.attributes.len()
            ))
        })
    }

    pub fn attribute_namespace(&self, index: usize) -> Result<&str> {
        Ok(self.strings.get(self.attribute(index)?.namespace))
    }

    pub fn attribute_prefix(&self, index: usize) -> Result<&str> {
        let uri = self.attribute(index)?.namespace;
        Ok(self
            .namespaces
            .find_prefix(uri)
            .map(|prefix| self.strings.get(prefix))
            .unwrap_or_default())
    }

    pub fn attribute_name(&self, index: usize) -> Result<&str> {
        Ok(self.strings.get(self.attribute(index)?.name))
    }

    /// The resource ID of the attribute's name, or 0 if it has none.
    pub fn attribute_name_resource(&self, index: usize) -> Result<u32> {
        let name = self.attribute(index)?.name;
        if name < 0 {
            return Ok(0);
        }

        Ok(self.resource_ids.get(name as usize).copied().unwrap_or(0))
    }

    pub fn attribute_value_type(&self, index: usize) -> Result<u8> {
        Ok(self.attribute(index)?.value_type.id())
    }

    pub fn attribute_value_data(&self, index: usize) -> Result<i32> {
        Ok(self.attribute(index)?.data)
    }

    /// The attribute's value, formatted as it would appear in a text XML file.
    pub fn attribute_value(&self, index: usize) -> Result<String> {
        Ok(self.attribute(index)?.format_value(&self.strings, None))
    }

    /// The data of an integer typed attribute, or `default` for any other type.
    pub fn attribute_int_value(&self, index: usize, default: i32) -> Result<i32> {
        let attribute = self.attribute(index)?;
        if attribute.value_type.is_int() {
            Ok(attribute.data)
        } else {
            Ok(default)
        }
    }

    pub fn attribute_bool_value(&self, index: usize, default: bool) -> Result<bool> {
        Ok(self.attribute_int_value(index, default as i32)? != 0)
    }

    pub fn attribute_float_value(&self, index: usize, default: f32) -> Result<f32> {
        let attribute = self.attribute(index)?;
        if attribute.value_type == ValueType::Float {
            Ok(f32::from_bits(attribute.data as u32))
        } else {
            Ok(default)
        }
    }

    pub fn attribute_resource_value(&self, index: usize, default: u32) -> Result<u32> {
        let attribute = self.attribute(index)?;
        if attribute.value_type == ValueType::Reference {
            Ok(attribute.data as u32)
        } else {
            Ok(default)
        }
    }

    /// Finds the first attribute of the current start tag with the given name.
    /// If `namespace` is `None`, attributes in any namespace match.
    pub fn find_attribute(&self, namespace: Option<&str>, name: &str) -> Option<usize> {
        if self.event != Some(EventType::StartTag) {
            return None;
        }

        self.attributes.iter().position(|attribute| {
            self.strings.get(attribute.name) == name
                && namespace.map_or(true, |namespace| self.strings.get(attribute.namespace) == namespace)
        })
    }

    pub fn get_attribute_value(&self, namespace: Option<&str>, name: &str) -> Option<String> {
        let index = self.find_attribute(namespace, name)?;
        self.attribute_value(index).ok()
    }

    pub fn get_attribute_int_value(&self, namespace: Option<&str>, name: &str, default: i32) -> i32 {
        self.find_attribute(namespace, name)
            .and_then(|index| self.attribute_int_value(index, default).ok())
            .unwrap_or(default)
    }

    pub fn get_attribute_bool_value(&self, namespace: Option<&str>, name: &str, default: bool) -> bool {
        self.find_attribute(namespace, name)
            .and_then(|index| self.attribute_bool_value(index, default).ok())
            .unwrap_or(default)
    }

    pub fn get_attribute_float_value(&self, namespace: Option<&str>, name: &str, default: f32) -> f32 {
        self.find_attribute(namespace, name)
            .and_then(|index| self.attribute_float_value(index, default).ok())
            .unwrap_or(default)
    }

    pub fn get_attribute_resource_value(&self, namespace: Option<&str>, name: &str, default: u32) -> u32 {
        self.find_attribute(namespace, name)
            .and_then(|index| self.attribute_resource_value(index, default).ok())
            .unwrap_or(default)
    }

    /// The string value of the element's `id` attribute.
    pub fn id_attribute(&self) -> Option<&str> {
        self.special_attribute(self.id_attribute)
            .map(|attribute| self.strings.get(attribute.raw_value))
    }

    pub fn id_attribute_resource_value(&self, default: u32) -> u32 {
        match self.special_attribute(self.id_attribute) {
            Some(attribute) if attribute.value_type == ValueType::Reference => attribute.data as u32,
            _ => default,
        }
    }

    pub fn class_attribute(&self) -> Option<&str> {
        self.special_attribute(self.class_attribute)
            .map(|attribute| self.strings.get(attribute.raw_value))
    }

    /// The data of the element's `style` attribute, or 0 if it has none.
    pub fn style_attribute(&self) -> u32 {
        self.special_attribute(self.style_attribute)
            .map(|attribute| attribute.data as u32)
            .unwrap_or(0)
    }

    fn special_attribute(&self, index: i32) -> Option<&Attribute> {
        if index < 0 || self.event != Some(EventType::StartTag) {
            return None;
        }

        self.attributes.get(index as usize)
    }

    fn require_start_tag(&self) -> Result<()> {
        if self.event == Some(EventType::StartTag) {
            Ok(())
        } else {
            Err(AxmlError::IllegalState(format!(
                "attributes are only available on a start tag, current event is {:?}",
                self.event
            )))
        }
    }

    fn is_whitespace(&self) -> bool {
        self.text().map_or(false, |text| text.trim().is_empty())
    }

    fn reset_event_info(&mut self) {
        self.event = None;
        self.line_number = None;
        self.name = -1;
        self.namespace_uri = -1;
        self.text = -1;
        self.attributes.clear();
        self.id_attribute = -1;
        self.class_attribute = -1;
        self.style_attribute = -1;
    }

    fn do_next(&mut self) -> Result<EventType> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(AxmlError::IllegalState("parser is closed".to_string()));
        };

        // Delayed initialisation
        if !self.operational {
            let tag = cursor.read_u32()?;
            if ChunkType::parse(tag) != Some(ChunkType::Header) {
                return Err(AxmlError::InvalidFormat(format!(
                    "expected AXML header, found tag {tag:#010x}"
                )));
            }
            cursor.skip_u32()?; // Size of the whole file

            // Some tools write the resource map before the string pool
            self.strings = loop {
                let tag = cursor.read_u32()?;
                match Chunk::read_tagged(tag, cursor)? {
                    Chunk::ResourceMap(ids) => self.resource_ids = ids,
                    Chunk::StringPool(strings) => break strings,
                    _ => {
                        return Err(AxmlError::InvalidFormat(format!(
                            "expected string pool chunk, found tag {tag:#010x}"
                        )))
                    }
                }
            };
            self.namespaces.increase_depth();
            self.operational = true;
        }

        if self.event == Some(EventType::EndDocument) {
            return Ok(EventType::EndDocument);
        }

        let previous = self.event;
        // Inlined reset, `cursor` keeps `self.cursor` borrowed
        self.event = None;
        self.line_number = None;
        self.name = -1;
        self.namespace_uri = -1;
        self.text = -1;
        self.attributes.clear();
        self.id_attribute = -1;
        self.class_attribute = -1;
        self.style_attribute = -1;

        let event = loop {
            if self.decrease_depth {
                self.decrease_depth = false;
                self.namespaces.decrease_depth();
            }

            if previous == Some(EventType::EndTag)
                && self.namespaces.depth() == 1
                && self.namespaces.current_count() == 0
            {
                break EventType::EndDocument;
            }

            let tag = match self.pending_tag.take() {
                Some(tag) => tag,
                None => match cursor.try_read_u32()? {
                    Some(tag) => tag,
                    None if previous.is_none() => break EventType::StartDocument,
                    // Tolerate files that end without closing their top level namespaces
                    None if self.namespaces.depth() <= 1 => {
                        debug!("Reached end of AXML stream outside of any element");
                        break EventType::EndDocument;
                    }
                    None => return Err(AxmlError::UnexpectedEndOfInput),
                },
            };

            match ChunkType::parse(tag) {
                Some(ChunkType::ResourceMap) => {}
                Some(ChunkType::StartElement | ChunkType::EndElement | ChunkType::Text)
                    if previous.is_none() =>
                {
                    self.pending_tag = Some(tag);
                    break EventType::StartDocument;
                }
                Some(chunk_type) if chunk_type.is_xml_node() => {}
                _ => {
                    return Err(AxmlError::InvalidFormat(format!(
                        "invalid chunk type {tag:#010x} in document body"
                    )))
                }
            }

            match Chunk::read_tagged(tag, cursor)? {
                Chunk::ResourceMap(ids) => self.resource_ids = ids,
                Chunk::StartNamespace(ns) => self.namespaces.push(ns.prefix, ns.uri),
                Chunk::EndNamespace(ns) => {
                    if !self.namespaces.pop_pair(ns.prefix, ns.uri) {
                        self.namespaces.pop();
                    }
                }
                Chunk::StartElement(element) => {
                    self.line_number = Some(element.line);
                    self.namespace_uri = element.namespace;
                    self.name = element.name;
                    self.id_attribute = i32::from(element.id_index) - 1;
                    self.class_attribute = i32::from(element.class_index) - 1;
                    self.style_attribute = i32::from(element.style_index) - 1;
                    self.attributes = element.attributes;
                    self.namespaces.increase_depth();
                    break EventType::StartTag;
                }
                Chunk::EndElement(element) => {
                    self.line_number = Some(element.line);
                    self.namespace_uri = element.namespace;
                    self.name = element.name;
                    self.decrease_depth = true;
                    break EventType::EndTag;
                }
                Chunk::Text(text) => {
                    self.line_number = Some(text.line);
                    self.text = text.text;
                    break EventType::Text;
                }
                other => {
                    return Err(AxmlError::InvalidFormat(format!(
                        "unexpected {:?} chunk in document body",
                        other.chunk_type()
                    )))
                }
            }
        };

        self.event = Some(event);
        if self.line_number.is_some() {
            self.last_line = self.line_number;
        }
        Ok(event)
    }
}
