//! Reads XML resources compiled by aapt2 into its protobuf format, as found in app bundles.
//!
//! Only the parts of the `XmlNode` message needed to recover the text XML are decoded,
//! all other fields are skipped.

use std::io::{Read, Write};

use log::debug;
use xml::name::OwnedName;

use crate::render::{XmlOptions, XmlRenderer};
use crate::value::{format_dimension, format_fraction};
use crate::{AxmlError, Result};

// Elements nested deeper than this are rejected rather than recursed into.
const MAX_NESTING: usize = 512;

/// Checks whether `header`, the first bytes of a file, looks like a protobuf `XmlNode`
/// rather than binary AXML.
pub fn is_protobuf_format(header: &[u8]) -> bool {
    matches!(header.first(), Some(0x0A | 0x12))
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlElement {
    pub namespace_declarations: Vec<XmlNamespace>,
    pub namespace_uri: String,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlNamespace {
    pub prefix: String,
    pub uri: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlAttribute {
    pub namespace_uri: String,
    pub name: String,
    /// The source text of the value, used when there is no usable compiled item.
    pub value: String,
    pub resource_id: u32,
    pub compiled_item: Option<Item>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Reference { id: u32, name: String },
    Str(String),
    RawStr(String),
    Primitive(Primitive),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Null,
    Empty,
    Float(f32),
    Dimension(u32),
    Fraction(u32),
    IntDecimal(i32),
    IntHex(u32),
    Boolean(bool),
    ColorArgb8(u32),
    ColorRgb8(u32),
    ColorArgb4(u32),
    ColorRgb4(u32),
}

impl XmlAttribute {
    /// The value as it would appear in a text XML file.
    pub fn display_value(&self) -> String {
        match &self.compiled_item {
            Some(Item::Reference { name, .. }) if !name.is_empty() => format!("@{name}"),
            Some(Item::Reference { id, .. }) if *id != 0 => format!("@0x{id:08x}"),
            // A reference to nothing keeps the source text
            Some(Item::Reference { .. }) => self.value.clone(),
            Some(Item::Str(value)) | Some(Item::RawStr(value)) => value.clone(),
            Some(Item::Primitive(prim)) => prim.to_string(),
            None => self.value.clone(),
        }
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null | Self::Empty => Ok(()),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Dimension(value) => f.write_str(&format_dimension(*value as i32)),
            Self::Fraction(value) => f.write_str(&format_fraction(*value as i32)),
            Self::IntDecimal(value) => write!(f, "{value}"),
            Self::IntHex(value) => write!(f, "0x{value:x}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::ColorArgb8(value) => write!(f, "#{value:08x}"),
            Self::ColorRgb8(value) => write!(f, "#{:06x}", value & 0xFFFFFF),
            Self::ColorArgb4(value) => write!(f, "#{:04x}", value & 0xFFFF),
            Self::ColorRgb4(value) => write!(f, "#{:03x}", value & 0xFFF),
        }
    }
}

/// A protobuf XML file, decoded with [ProtobufXmlResource::read].
#[derive(Clone, Debug, Default)]
pub struct ProtobufXmlResource {
    root: Option<XmlElement>,
}

impl ProtobufXmlResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the `XmlNode` message in `from`.
    /// Returns false if the message decoded but did not contain a root element.
    pub fn read<R: Read>(&mut self, mut from: R) -> Result<bool> {
        let mut data = Vec::new();
        from.read_to_end(&mut data)?;

        self.root = match read_node(&data, 0)? {
            Some(XmlNode::Element(element)) => Some(element),
            Some(XmlNode::Text(_)) | None => None,
        };
        Ok(self.root.is_some())
    }

    pub fn root(&self) -> Option<&XmlElement> {
        self.root.as_ref()
    }

    pub fn to_xml(&self) -> Result<String> {
        self.to_xml_with(&XmlOptions::default())
    }

    pub fn to_xml_with(&self, options: &XmlOptions) -> Result<String> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| AxmlError::IllegalState("No protobuf XML has been read".to_string()))?;

        let mut renderer = XmlRenderer::new(Vec::new(), options);
        let mut scopes = Vec::new();
        render_element(&mut renderer, root, &mut scopes)?;

        let bytes = renderer.finish()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// `scopes` holds the (prefix, uri) pairs declared by each open element, innermost last.
fn render_element<W: Write>(
    renderer: &mut XmlRenderer<W>,
    element: &XmlElement,
    scopes: &mut Vec<(String, String)>,
) -> Result<()> {
    let declared_from = scopes.len();
    let mut declared = Vec::with_capacity(element.namespace_declarations.len());
    for ns in &element.namespace_declarations {
        scopes.push((ns.prefix.clone(), ns.uri.clone()));
        let prefix = (!ns.prefix.is_empty()).then(|| ns.prefix.clone());
        declared.push((prefix, ns.uri.clone()));
    }

    let name = qualified_name(&element.namespace_uri, &element.name, scopes);
    let attributes: Vec<_> = element
        .attributes
        .iter()
        .map(|attr| {
            (
                qualified_name(&attr.namespace_uri, &attr.name, scopes),
                attr.display_value(),
            )
        })
        .collect();

    renderer.start_element(&name, &attributes, &declared)?;
    for child in &element.children {
        match child {
            XmlNode::Element(child) => render_element(renderer, child, scopes)?,
            XmlNode::Text(text) => renderer.text(text)?,
        }
    }
    renderer.end_element()?;

    scopes.truncate(declared_from);
    Ok(())
}

fn qualified_name(uri: &str, name: &str, scopes: &[(String, String)]) -> OwnedName {
    if uri.is_empty() {
        return OwnedName::local(name);
    }

    let prefix = scopes
        .iter()
        .rev()
        .find(|(_, scope_uri)| scope_uri == uri)
        .map(|(prefix, _)| prefix.clone())
        .filter(|prefix| !prefix.is_empty());

    OwnedName {
        local_name: name.to_string(),
        namespace: Some(uri.to_string()),
        prefix,
    }
}

enum WireValue<'a> {
    Varint(u64),
    Fixed64,
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// Iterates over the fields of a single protobuf message.
struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = *self.data.get(self.pos).ok_or(AxmlError::UnexpectedEndOfInput)?;
            self.pos += 1;
            if shift == 63 && byte > 1 {
                break;
            }

            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(AxmlError::InvalidFormat("Varint is too long".to_string()))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(AxmlError::UnexpectedEndOfInput)?;

        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn next_field(&mut self) -> Result<Option<(u32, WireValue<'a>)>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let key = self.read_varint()?;
        let field = u32::try_from(key >> 3)
            .ok()
            .filter(|field| *field != 0)
            .ok_or_else(|| AxmlError::InvalidFormat(format!("Invalid field number in key {key}")))?;

        let value = match key & 0x7 {
            0 => WireValue::Varint(self.read_varint()?),
            1 => {
                self.take(8)?;
                WireValue::Fixed64
            }
            2 => {
                let len = usize::try_from(self.read_varint()?).map_err(|_| AxmlError::UnexpectedEndOfInput)?;
                WireValue::Bytes(self.take(len)?)
            }
            5 => {
                let bytes = self.take(4)?;
                let mut word = [0u8; 4];
                word.copy_from_slice(bytes);
                WireValue::Fixed32(u32::from_le_bytes(word))
            }
            wire_type => {
                return Err(AxmlError::InvalidFormat(format!(
                    "Unsupported wire type {wire_type} for field {field}"
                )))
            }
        };

        Ok(Some((field, value)))
    }
}

fn expect_bytes<'a>(field: u32, value: WireValue<'a>) -> Result<&'a [u8]> {
    match value {
        WireValue::Bytes(bytes) => Ok(bytes),
        _ => Err(AxmlError::InvalidFormat(format!("Field {field} should be length delimited"))),
    }
}

fn expect_string(field: u32, value: WireValue) -> Result<String> {
    let bytes = expect_bytes(field, value)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AxmlError::InvalidFormat(format!("Field {field} is not valid UTF-8")))
}

fn expect_varint(field: u32, value: WireValue) -> Result<u64> {
    match value {
        WireValue::Varint(value) => Ok(value),
        _ => Err(AxmlError::InvalidFormat(format!("Field {field} should be a varint"))),
    }
}

fn read_node(data: &[u8], depth: usize) -> Result<Option<XmlNode>> {
    if depth > MAX_NESTING {
        return Err(AxmlError::InvalidFormat("XML elements are nested too deeply".to_string()));
    }

    let mut node = None;
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => node = Some(XmlNode::Element(read_element(expect_bytes(field, value)?, depth)?)),
            2 => node = Some(XmlNode::Text(expect_string(field, value)?)),
            _ => debug!("Skipping XmlNode field {field}"),
        }
    }

    Ok(node)
}

fn read_element(data: &[u8], depth: usize) -> Result<XmlElement> {
    let mut element = XmlElement::default();
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => element.namespace_declarations.push(read_namespace(expect_bytes(field, value)?)?),
            2 => element.namespace_uri = expect_string(field, value)?,
            3 => element.name = expect_string(field, value)?,
            4 => element.attributes.push(read_attribute(expect_bytes(field, value)?)?),
            5 => {
                if let Some(child) = read_node(expect_bytes(field, value)?, depth + 1)? {
                    element.children.push(child);
                }
            }
            _ => {}
        }
    }

    Ok(element)
}

fn read_namespace(data: &[u8]) -> Result<XmlNamespace> {
    let mut namespace = XmlNamespace::default();
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => namespace.prefix = expect_string(field, value)?,
            2 => namespace.uri = expect_string(field, value)?,
            _ => {}
        }
    }

    Ok(namespace)
}

fn read_attribute(data: &[u8]) -> Result<XmlAttribute> {
    let mut attribute = XmlAttribute::default();
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => attribute.namespace_uri = expect_string(field, value)?,
            2 => attribute.name = expect_string(field, value)?,
            3 => attribute.value = expect_string(field, value)?,
            5 => attribute.resource_id = expect_varint(field, value)? as u32,
            6 => attribute.compiled_item = read_item(expect_bytes(field, value)?)?,
            _ => {}
        }
    }

    Ok(attribute)
}

fn read_item(data: &[u8]) -> Result<Option<Item>> {
    let mut item = None;
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => item = Some(read_reference(expect_bytes(field, value)?)?),
            2 => item = Some(Item::Str(read_string_value(expect_bytes(field, value)?)?)),
            3 => item = Some(Item::RawStr(read_string_value(expect_bytes(field, value)?)?)),
            // Primitives of a kind this reader does not know render as nothing
            7 => {
                let prim = read_primitive(expect_bytes(field, value)?)?;
                item = Some(Item::Primitive(prim.unwrap_or(Primitive::Empty)));
            }
            _ => debug!("Skipping unsupported compiled item field {field}"),
        }
    }

    Ok(item)
}

fn read_reference(data: &[u8]) -> Result<Item> {
    let mut id = 0;
    let mut name = String::new();
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        match field {
            2 => id = expect_varint(field, value)? as u32,
            3 => name = expect_string(field, value)?,
            _ => {}
        }
    }

    Ok(Item::Reference { id, name })
}

// Shared by the String and RawString messages, which both keep their text in field 1.
fn read_string_value(data: &[u8]) -> Result<String> {
    let mut text = String::new();
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        if field == 1 {
            text = expect_string(field, value)?;
        }
    }

    Ok(text)
}

fn read_primitive(data: &[u8]) -> Result<Option<Primitive>> {
    let mut prim = None;
    let mut reader = WireReader::new(data);
    while let Some((field, value)) = reader.next_field()? {
        prim = Some(match (field, value) {
            (1, _) => Primitive::Null,
            (2, _) => Primitive::Empty,
            (3, WireValue::Fixed32(bits)) => Primitive::Float(f32::from_bits(bits)),
            (6, WireValue::Varint(value)) => Primitive::IntDecimal(value as i32),
            (7, WireValue::Varint(value)) => Primitive::IntHex(value as u32),
            (8, WireValue::Varint(value)) => Primitive::Boolean(value != 0),
            (9, WireValue::Varint(value)) => Primitive::ColorArgb8(value as u32),
            (10, WireValue::Varint(value)) => Primitive::ColorRgb8(value as u32),
            (11, WireValue::Varint(value)) => Primitive::ColorArgb4(value as u32),
            (12, WireValue::Varint(value)) => Primitive::ColorRgb4(value as u32),
            (13, WireValue::Varint(value)) => Primitive::Dimension(value as u32),
            (14, WireValue::Varint(value)) => Primitive::Fraction(value as u32),
            (field @ (3 | 6..=14), _) => {
                return Err(AxmlError::InvalidFormat(format!(
                    "Primitive field {field} has the wrong wire type"
                )))
            }
            (field, _) => {
                debug!("Skipping primitive field {field}");
                continue;
            }
        });
    }

    Ok(prim)
}
