//! The chunks that make up an AXML file, and their binary encoding.

use std::io::{Read, Write};

use byteorder::{WriteBytesExt, LE};
use log::{debug, warn};

use crate::cursor::ByteCursor;
use crate::string_pool::StringPool;
use crate::value::{format_value, ResourceResolver, ValueType};
use crate::{AxmlError, Result};

const NAMESPACE_CHUNK_SIZE: u32 = 24;
const END_ELEMENT_SIZE: u32 = 24;
const TEXT_SIZE: u32 = 28;
const START_ELEMENT_BASE_SIZE: u32 = 36;
const ATTRIBUTE_SIZE: u32 = 20;

/// Attribute records start 20 bytes into the element body and are 20 bytes each.
pub const DEFAULT_ATTRIBUTE_LAYOUT: u32 = 0x00140014;
/// The low 24 bits of the type word of almost every attribute: the size of the typed value.
pub const DEFAULT_TYPE_METADATA: u32 = 0x000008;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChunkType {
    Header,
    StringPool,
    ResourceMap,
    StartNamespace,
    EndNamespace,
    StartElement,
    EndElement,
    Text,
}

impl ChunkType {
    pub fn parse(from: u32) -> Option<Self> {
        match from {
            0x00080003 => Some(Self::Header),
            0x001C0001 => Some(Self::StringPool),
            0x00080180 => Some(Self::ResourceMap),
            0x00100100 => Some(Self::StartNamespace),
            0x00100101 => Some(Self::EndNamespace),
            0x00100102 => Some(Self::StartElement),
            0x00100103 => Some(Self::EndElement),
            0x00100104 => Some(Self::Text),
            _ => None,
        }
    }

    /// The header size is in the upper 16 bits, the chunk ID in the lower 16.
    pub fn tag(&self) -> u32 {
        let header_size = match self {
            Self::StringPool => 0x001C,
            Self::Header | Self::ResourceMap => 0x0008,
            _ => 0x0010,
        };

        let id = match self {
            Self::Header => 0x0003,
            Self::StringPool => 0x0001,
            Self::ResourceMap => 0x0180,
            Self::StartNamespace => 0x0100,
            Self::EndNamespace => 0x0101,
            Self::StartElement => 0x0102,
            Self::EndElement => 0x0103,
            Self::Text => 0x0104,
        };

        id | header_size << 16
    }

    /// True for the chunk types that make up the body of the document.
    pub fn is_xml_node(&self) -> bool {
        matches!(
            self,
            Self::StartNamespace | Self::EndNamespace | Self::StartElement | Self::EndElement | Self::Text
        )
    }
}

/// The first chunk of the file, which contains every other chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// The size of the whole file, as declared by the header.
    pub file_size: u32,
}

/// A namespace declaration, used for both the start and the end of its scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NamespaceChunk {
    pub line: u32,
    pub comment: i32,
    pub prefix: i32,
    pub uri: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: i32,
    pub name: i32,
    /// Index of the original string value, or -1 if the value is not a string.
    pub raw_value: i32,
    pub value_type: ValueType,
    /// Lower 24 bits of the type word.
    pub type_metadata: u32,
    pub data: i32,
}

/// The value of a new attribute, before it is added to a string pool.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    String(String),
    Boolean(bool),
    Integer(i32),
    Hex(u32),
    Reference(u32), // Reference ID
    Float(f32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartElement {
    pub line: u32,
    pub comment: i32,
    pub namespace: i32,
    pub name: i32,
    pub attribute_layout: u32,
    /// 1-based index of the `id` attribute, 0 if there is none. The same applies to `class` and `style`.
    pub id_index: u16,
    pub class_index: u16,
    pub style_index: u16,
    pub attributes: Vec<Attribute>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EndElement {
    pub line: u32,
    pub comment: i32,
    pub namespace: i32,
    pub name: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    pub line: u32,
    pub comment: i32,
    pub text: i32,
    pub reserved: [u32; 2],
}

#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    Header(Header),
    StringPool(StringPool),
    ResourceMap(Vec<u32>),
    StartNamespace(NamespaceChunk),
    EndNamespace(NamespaceChunk),
    StartElement(StartElement),
    EndElement(EndElement),
    Text(TextChunk),
}

impl Chunk {
    pub fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        let tag = cursor.read_u32()?;
        Self::read_tagged(tag, cursor)
    }

    /// Reads a chunk whose type tag has already been consumed.
    pub fn read_tagged<R: Read>(tag: u32, cursor: &mut ByteCursor<R>) -> Result<Self> {
        let chunk_type = ChunkType::parse(tag)
            .ok_or_else(|| AxmlError::InvalidFormat(format!("unknown chunk type {tag:#010x}")))?;
        let start = cursor.position().saturating_sub(4);
        let size = cursor.read_u32()?;

        let chunk = match chunk_type {
            // The header's size covers the chunks that follow it, so there's nothing to skip.
            ChunkType::Header => return Ok(Self::Header(Header { file_size: size })),
            ChunkType::StringPool => Self::StringPool(StringPool::read_body(cursor, size)?),
            ChunkType::ResourceMap => Self::ResourceMap(read_resource_map(cursor, size)?),
            ChunkType::StartNamespace => Self::StartNamespace(NamespaceChunk::read(cursor)?),
            ChunkType::EndNamespace => Self::EndNamespace(NamespaceChunk::read(cursor)?),
            ChunkType::StartElement => Self::StartElement(StartElement::read(cursor)?),
            ChunkType::EndElement => Self::EndElement(EndElement::read(cursor)?),
            ChunkType::Text => Self::Text(TextChunk::read(cursor)?),
        };

        let consumed = cursor.position() - start;
        if u64::from(size) > consumed {
            warn!(
                "{chunk_type:?} chunk declared {size} bytes but only {consumed} were understood, skipping the rest"
            );
            cursor.skip(u64::from(size) - consumed)?;
        } else if u64::from(size) < consumed {
            debug!("{chunk_type:?} chunk declared {size} bytes, smaller than its contents ({consumed})");
        }

        Ok(chunk)
    }

    pub fn chunk_type(&self) -> ChunkType {
        match self {
            Self::Header(_) => ChunkType::Header,
            Self::StringPool(_) => ChunkType::StringPool,
            Self::ResourceMap(_) => ChunkType::ResourceMap,
            Self::StartNamespace(_) => ChunkType::StartNamespace,
            Self::EndNamespace(_) => ChunkType::EndNamespace,
            Self::StartElement(_) => ChunkType::StartElement,
            Self::EndElement(_) => ChunkType::EndElement,
            Self::Text(_) => ChunkType::Text,
        }
    }

    /// The number of bytes that `write` will produce.
    /// For the header this is only the header itself, not the chunks it contains.
    pub fn size(&self) -> u32 {
        match self {
            Self::Header(_) => 8,
            Self::StringPool(pool) => pool.size(),
            Self::ResourceMap(ids) => 8 + 4 * ids.len() as u32,
            Self::StartNamespace(_) | Self::EndNamespace(_) => NAMESPACE_CHUNK_SIZE,
            Self::StartElement(element) => element.size(),
            Self::EndElement(_) => END_ELEMENT_SIZE,
            Self::Text(_) => TEXT_SIZE,
        }
    }

    pub fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        match self {
            Self::Header(header) => {
                to.write_u32::<LE>(ChunkType::Header.tag())?;
                to.write_u32::<LE>(header.file_size)?;
            }
            Self::StringPool(pool) => pool.write(to)?,
            Self::ResourceMap(ids) => write_resource_map(to, ids)?,
            Self::StartNamespace(ns) => ns.write(to, ChunkType::StartNamespace)?,
            Self::EndNamespace(ns) => ns.write(to, ChunkType::EndNamespace)?,
            Self::StartElement(element) => element.write(to)?,
            Self::EndElement(element) => element.write(to)?,
            Self::Text(text) => text.write(to)?,
        }

        Ok(())
    }

    pub fn line_number(&self) -> Option<u32> {
        match self {
            Self::StartNamespace(ns) | Self::EndNamespace(ns) => Some(ns.line),
            Self::StartElement(element) => Some(element.line),
            Self::EndElement(element) => Some(element.line),
            Self::Text(text) => Some(text.line),
            _ => None,
        }
    }

    /// Calls `f` with every string pool reference held by the chunk, so they can be renumbered.
    pub(crate) fn for_each_string_ref(&mut self, f: &mut dyn FnMut(&mut i32)) {
        match self {
            Self::StartNamespace(ns) | Self::EndNamespace(ns) => {
                f(&mut ns.comment);
                f(&mut ns.prefix);
                f(&mut ns.uri);
            }
            Self::StartElement(element) => {
                f(&mut element.comment);
                f(&mut element.namespace);
                f(&mut element.name);
                for attribute in &mut element.attributes {
                    f(&mut attribute.namespace);
                    f(&mut attribute.name);
                    f(&mut attribute.raw_value);
                    if attribute.value_type == ValueType::String {
                        f(&mut attribute.data);
                    }
                }
            }
            Self::EndElement(element) => {
                f(&mut element.comment);
                f(&mut element.namespace);
                f(&mut element.name);
            }
            Self::Text(text) => {
                f(&mut text.comment);
                f(&mut text.text);
            }
            Self::Header(_) | Self::StringPool(_) | Self::ResourceMap(_) => {}
        }
    }
}

impl NamespaceChunk {
    fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        Ok(Self {
            line: cursor.read_u32()?,
            comment: cursor.read_i32()?,
            prefix: cursor.read_i32()?,
            uri: cursor.read_i32()?,
        })
    }

    fn write<W: Write>(&self, to: &mut W, chunk_type: ChunkType) -> Result<()> {
        write_chunk_header(to, chunk_type, NAMESPACE_CHUNK_SIZE)?;
        to.write_u32::<LE>(self.line)?;
        to.write_i32::<LE>(self.comment)?;
        to.write_i32::<LE>(self.prefix)?;
        to.write_i32::<LE>(self.uri)?;
        Ok(())
    }
}

impl Attribute {
    pub fn new(namespace: i32, name: i32, value_type: ValueType, raw_value: i32, data: i32) -> Self {
        Self {
            namespace,
            name,
            raw_value,
            value_type,
            type_metadata: DEFAULT_TYPE_METADATA,
            data,
        }
    }

    /// Creates an attribute from a value, adding any string it holds to `pool`.
    pub fn from_value(namespace: i32, name: i32, value: &AttributeValue, pool: &mut StringPool) -> Self {
        // The raw value is -1, except for strings where it takes the same value as the data
        let (value_type, raw_value, data) = match value {
            AttributeValue::String(text) => {
                let idx = pool.intern(text);
                (ValueType::String, idx, idx)
            }
            AttributeValue::Boolean(true) => (ValueType::IntBoolean, -1, -1),
            AttributeValue::Boolean(false) => (ValueType::IntBoolean, -1, 0),
            AttributeValue::Integer(i) => (ValueType::IntDec, -1, *i),
            AttributeValue::Hex(h) => (ValueType::IntHex, -1, *h as i32),
            AttributeValue::Reference(id) => (ValueType::Reference, -1, *id as i32),
            AttributeValue::Float(f) => (ValueType::Float, -1, f.to_bits() as i32),
        };

        Self::new(namespace, name, value_type, raw_value, data)
    }

    /// The pool string held by a string attribute.
    pub fn string_value<'p>(&self, pool: &'p StringPool) -> Option<&'p str> {
        if self.value_type != ValueType::String {
            return None;
        }

        let index = if self.raw_value >= 0 { self.raw_value } else { self.data };
        Some(pool.get(index))
    }

    /// Formats the value as it would appear in a text XML file.
    pub fn format_value(&self, pool: &StringPool, resolver: Option<&dyn ResourceResolver>) -> String {
        format_value(
            pool.get(self.name),
            self.value_type,
            self.data,
            self.string_value(pool),
            resolver,
        )
    }

    /// The type in the top byte, metadata in the lower 24 bits.
    pub fn type_word(&self) -> u32 {
        (u32::from(self.value_type.id()) << 24) | (self.type_metadata & 0xFFFFFF)
    }

    fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        let namespace = cursor.read_i32()?;
        let name = cursor.read_i32()?;
        let raw_value = cursor.read_i32()?;
        let type_word = cursor.read_u32()?;
        let data = cursor.read_i32()?;

        Ok(Self {
            namespace,
            name,
            raw_value,
            value_type: ValueType::parse((type_word >> 24) as u8),
            type_metadata: type_word & 0xFFFFFF,
            data,
        })
    }

    fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        to.write_i32::<LE>(self.namespace)?;
        to.write_i32::<LE>(self.name)?;
        to.write_i32::<LE>(self.raw_value)?;
        to.write_u32::<LE>(self.type_word())?;
        to.write_i32::<LE>(self.data)?;
        Ok(())
    }
}

impl StartElement {
    pub fn new(namespace: i32, name: i32, line: u32) -> Self {
        Self {
            line,
            comment: -1,
            namespace,
            name,
            attribute_layout: DEFAULT_ATTRIBUTE_LAYOUT,
            id_index: 0,
            class_index: 0,
            style_index: 0,
            attributes: Vec::new(),
        }
    }

    pub fn size(&self) -> u32 {
        START_ELEMENT_BASE_SIZE + ATTRIBUTE_SIZE * self.attributes.len() as u32
    }

    /// Finds the first attribute with the given namespace and name indices.
    pub fn find_attribute(&self, namespace: i32, name: i32) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.namespace == namespace && attribute.name == name)
    }

    fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        let line = cursor.read_u32()?;
        let comment = cursor.read_i32()?;
        let namespace = cursor.read_i32()?;
        let name = cursor.read_i32()?;
        let attribute_layout = cursor.read_u32()?;
        let count_and_id = cursor.read_u32()?;
        let class_and_style = cursor.read_u32()?;

        let attribute_count = (count_and_id & 0xFFFF) as usize;
        let mut attributes = Vec::with_capacity(attribute_count);
        for _ in 0..attribute_count {
            attributes.push(Attribute::read(cursor)?);
        }

        Ok(Self {
            line,
            comment,
            namespace,
            name,
            attribute_layout,
            id_index: (count_and_id >> 16) as u16,
            class_index: (class_and_style & 0xFFFF) as u16,
            style_index: (class_and_style >> 16) as u16,
            attributes,
        })
    }

    fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        let attribute_count: u16 = self.attributes.len().try_into().map_err(|_| {
            AxmlError::InvalidArgument(format!(
                "element has {} attributes, at most {} can be saved",
                self.attributes.len(),
                u16::MAX
            ))
        })?;

        write_chunk_header(to, ChunkType::StartElement, self.size())?;
        to.write_u32::<LE>(self.line)?;
        to.write_i32::<LE>(self.comment)?;
        to.write_i32::<LE>(self.namespace)?;
        to.write_i32::<LE>(self.name)?;
        to.write_u32::<LE>(self.attribute_layout)?;
        to.write_u16::<LE>(attribute_count)?;
        to.write_u16::<LE>(self.id_index)?;
        to.write_u16::<LE>(self.class_index)?;
        to.write_u16::<LE>(self.style_index)?;

        for attribute in &self.attributes {
            attribute.write(to)?;
        }

        Ok(())
    }
}

impl EndElement {
    fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        Ok(Self {
            line: cursor.read_u32()?,
            comment: cursor.read_i32()?,
            namespace: cursor.read_i32()?,
            name: cursor.read_i32()?,
        })
    }

    fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        write_chunk_header(to, ChunkType::EndElement, END_ELEMENT_SIZE)?;
        to.write_u32::<LE>(self.line)?;
        to.write_i32::<LE>(self.comment)?;
        to.write_i32::<LE>(self.namespace)?;
        to.write_i32::<LE>(self.name)?;
        Ok(())
    }
}

impl TextChunk {
    pub fn new(text: i32, line: u32) -> Self {
        Self {
            line,
            comment: -1,
            text,
            reserved: [0, 0],
        }
    }

    fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        Ok(Self {
            line: cursor.read_u32()?,
            comment: cursor.read_i32()?,
            text: cursor.read_i32()?,
            reserved: [cursor.read_u32()?, cursor.read_u32()?],
        })
    }

    fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        write_chunk_header(to, ChunkType::Text, TEXT_SIZE)?;
        to.write_u32::<LE>(self.line)?;
        to.write_i32::<LE>(self.comment)?;
        to.write_i32::<LE>(self.text)?;
        to.write_u32::<LE>(self.reserved[0])?;
        to.write_u32::<LE>(self.reserved[1])?;
        Ok(())
    }
}

fn read_resource_map<R: Read>(cursor: &mut ByteCursor<R>, size: u32) -> Result<Vec<u32>> {
    if size < 8 || size % 4 != 0 {
        return Err(AxmlError::InvalidFormat(format!(
            "resource map size {size} is not a multiple of 4 of at least 8 bytes"
        )));
    }

    cursor.read_int_array((size / 4 - 2) as usize)
}

pub(crate) fn write_resource_map<W: Write>(to: &mut W, ids: &[u32]) -> Result<()> {
    write_chunk_header(to, ChunkType::ResourceMap, 8 + 4 * ids.len() as u32)?;
    for id in ids {
        to.write_u32::<LE>(*id)?;
    }
    Ok(())
}

// Writes the tag and size of a chunk. `size` includes these 8 bytes.
fn write_chunk_header(to: &mut impl Write, chunk_type: ChunkType, size: u32) -> Result<()> {
    to.write_u32::<LE>(chunk_type.tag())?;
    to.write_u32::<LE>(size)?;
    Ok(())
}
