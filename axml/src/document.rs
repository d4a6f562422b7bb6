//! An AXML file held in memory, so that it can be modified and saved.

use std::io::{Read, Write};

use log::{debug, warn};

use crate::chunk::{Attribute, AttributeValue, Chunk, ChunkType, EndElement, Header, StartElement, TextChunk};
use crate::cursor::ByteCursor;
use crate::render::{chunks_to_xml, XmlOptions};
use crate::string_pool::StringPool;
use crate::{AxmlError, Result};

const APPLICATION_TAG: &str = "application";

/// A complete AXML document: the string pool, the optional resource map, and the chunks of the document body.
///
/// Unmodified documents save to exactly the bytes they were read from, provided that every chunk
/// declared its canonical size.
#[derive(Clone, Debug)]
pub struct AxmlDocument {
    header: Header,
    strings: StringPool,
    resource_map: Option<Vec<u32>>,
    // Whether the resource map came before the string pool in the original file.
    map_before_pool: bool,
    chunks: Vec<Chunk>,
}

// Documents are equal if they save to the same content, the header read from the file is not compared.
impl PartialEq for AxmlDocument {
    fn eq(&self, other: &Self) -> bool {
        self.strings == other.strings
            && self.resource_map == other.resource_map
            && self.map_before_pool == other.map_before_pool
            && self.chunks == other.chunks
    }
}

/// A node in the tree view of a document.
#[derive(Clone, Debug, PartialEq)]
pub enum Node<'d> {
    Element(ElementNode<'d>),
    Text(&'d TextChunk),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementNode<'d> {
    pub start: &'d StartElement,
    /// `None` if the element was never closed.
    pub end: Option<&'d EndElement>,
    pub children: Vec<Node<'d>>,
}

impl AxmlDocument {
    /// Creates a document from its parts. The header is computed when the document is saved.
    pub fn new(strings: StringPool, resource_map: Option<Vec<u32>>, chunks: Vec<Chunk>) -> Self {
        let mut document = Self {
            header: Header { file_size: 0 },
            strings,
            resource_map,
            map_before_pool: false,
            chunks,
        };
        document.header.file_size = document.size();
        document
    }

    /// Reads a document, stopping at the end of the size declared by its header or at the end of the input.
    pub fn read<R: Read>(data: R) -> Result<Self> {
        let mut cursor = ByteCursor::le(data);

        let tag = cursor.read_u32()?;
        if ChunkType::parse(tag) != Some(ChunkType::Header) {
            return Err(AxmlError::InvalidFormat(format!(
                "not an AXML document, initial chunk had tag {tag:#010x}"
            )));
        }
        let header = Header {
            file_size: cursor.read_u32()?,
        };

        let mut strings = None;
        let mut resource_map = None;
        let mut map_before_pool = false;
        let mut chunks = Vec::new();

        while cursor.position() < u64::from(header.file_size) {
            let Some(tag) = cursor.try_read_u32()? else {
                debug!("Input ended before the size declared by the AXML header");
                break;
            };

            match Chunk::read_tagged(tag, &mut cursor)? {
                Chunk::Header(_) => {
                    return Err(AxmlError::InvalidFormat(
                        "AXML header found inside the document".to_string(),
                    ))
                }
                // The pool and resource map are only special if they come before the document body
                Chunk::StringPool(pool) if strings.is_none() && chunks.is_empty() => strings = Some(pool),
                Chunk::ResourceMap(ids) if resource_map.is_none() && chunks.is_empty() => {
                    map_before_pool = strings.is_none();
                    resource_map = Some(ids);
                }
                other => chunks.push(other),
            }
        }

        if cursor.position() >= u64::from(header.file_size) && cursor.read_u8().is_ok() {
            warn!("Ignoring data after the end of the AXML document");
        }

        let strings = strings.ok_or_else(|| {
            AxmlError::InvalidFormat("document does not contain a string pool".to_string())
        })?;

        Ok(Self {
            header,
            strings,
            resource_map,
            map_before_pool,
            chunks,
        })
    }

    /// Saves the document, recomputing the size of the file and of every chunk.
    pub fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        Chunk::Header(Header {
            file_size: self.size(),
        })
        .write(to)?;

        if self.map_before_pool {
            self.write_resource_map(to)?;
            self.strings.write(to)?;
        } else {
            self.strings.write(to)?;
            self.write_resource_map(to)?;
        }

        for chunk in &self.chunks {
            chunk.write(to)?;
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.size() as usize);
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    /// The size of the saved document in bytes.
    pub fn size(&self) -> u32 {
        let map_size = self
            .resource_map
            .as_ref()
            .map(|ids| 8 + 4 * ids.len() as u32)
            .unwrap_or(0);

        8 + self.strings.size() + map_size + self.chunks.iter().map(Chunk::size).sum::<u32>()
    }

    /// The header as it was read. Its size is not kept up to date as the document is modified.
    pub fn header(&self) -> Header {
        self.header
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.strings
    }

    pub fn string_pool_mut(&mut self) -> &mut StringPool {
        &mut self.strings
    }

    /// The resource IDs of the attribute names at the start of the string pool.
    pub fn resource_map(&self) -> &[u32] {
        self.resource_map.as_deref().unwrap_or_default()
    }

    /// The resource ID associated with the string at `name_index`, if any.
    pub fn resource_id(&self, name_index: i32) -> Option<u32> {
        if name_index < 0 {
            return None;
        }

        self.resource_map().get(name_index as usize).copied()
    }

    /// The chunks of the document body, in file order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut Vec<Chunk> {
        &mut self.chunks
    }

    pub fn elements(&self) -> impl Iterator<Item = &StartElement> {
        self.chunks.iter().filter_map(|chunk| match chunk {
            Chunk::StartElement(element) => Some(element),
            _ => None,
        })
    }

    /// The first element named `application`.
    pub fn application_tag(&self) -> Option<&StartElement> {
        self.elements()
            .find(|element| self.strings.get(element.name) == APPLICATION_TAG)
    }

    pub fn application_tag_mut(&mut self) -> Option<&mut StartElement> {
        let strings = &self.strings;
        self.chunks.iter_mut().find_map(|chunk| match chunk {
            Chunk::StartElement(element) if strings.get(element.name) == APPLICATION_TAG => Some(element),
            _ => None,
        })
    }

    /// Appends an attribute to the `application` element.
    pub fn inject_application_attribute(&mut self, attribute: Attribute) -> Result<()> {
        match self.application_tag_mut() {
            Some(application) => {
                application.attributes.push(attribute);
                Ok(())
            }
            None => Err(AxmlError::IllegalState(
                "document has no application element".to_string(),
            )),
        }
    }

    /// Gets the index of an attribute name with the given resource ID.
    ///
    /// Android requires names with resource IDs to share their index with their ID in the resource map,
    /// so if there is no such name yet it is inserted into the pool straight after the last mapped name.
    /// Every string reference in the document that comes after it is renumbered.
    pub fn intern_attribute_name(&mut self, name: &str, resource_id: u32) -> Result<i32> {
        let map = self.resource_map.as_deref().unwrap_or_default();
        if let Some(existing) = map
            .iter()
            .enumerate()
            .position(|(idx, id)| *id == resource_id && self.strings.get(idx as i32) == name)
        {
            return Ok(existing as i32);
        }

        let index = map.len();
        if index > self.strings.len() {
            return Err(AxmlError::InvalidFormat(format!(
                "resource map has {index} entries but the string pool only has {} strings",
                self.strings.len()
            )));
        }

        // The map is only created once the pool has accepted the name
        self.strings.insert(index, name)?;
        self.resource_map.get_or_insert_with(Vec::new).push(resource_id);

        let inserted = index as i32;
        for chunk in &mut self.chunks {
            chunk.for_each_string_ref(&mut |string_ref| {
                if *string_ref >= inserted {
                    *string_ref += 1;
                }
            });
        }

        debug!("Inserted attribute name {name} at index {index} for resource {resource_id:#010x}");
        Ok(inserted)
    }

    /// Creates an attribute, adding its strings to the pool.
    /// If `resource_id` is given, the name is aligned with the resource map.
    pub fn new_attribute(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        resource_id: Option<u32>,
        value: &AttributeValue,
    ) -> Result<Attribute> {
        // The name must come first: aligning it with the resource map may shift other strings.
        let name = match resource_id {
            Some(id) => self.intern_attribute_name(name, id)?,
            None => self.strings.intern(name),
        };
        let namespace = namespace.map(|uri| self.strings.intern(uri)).unwrap_or(-1);

        Ok(Attribute::from_value(namespace, name, value, &mut self.strings))
    }

    /// Builds a tree of the elements and text in the document.
    /// End tags with no open element are ignored, and elements that are never closed have no `end`.
    pub fn forest(&self) -> Vec<Node<'_>> {
        let mut roots = Vec::new();
        let mut open: Vec<ElementNode> = Vec::new();

        for chunk in &self.chunks {
            match chunk {
                Chunk::StartElement(start) => open.push(ElementNode {
                    start,
                    end: None,
                    children: Vec::new(),
                }),
                Chunk::EndElement(end) => match open.pop() {
                    Some(mut element) => {
                        element.end = Some(end);
                        attach(&mut open, &mut roots, Node::Element(element));
                    }
                    None => debug!("Ignoring end tag with no open element"),
                },
                Chunk::Text(text) => attach(&mut open, &mut roots, Node::Text(text)),
                _ => {}
            }
        }

        while let Some(element) = open.pop() {
            attach(&mut open, &mut roots, Node::Element(element));
        }

        roots
    }

    pub fn to_xml(&self) -> Result<String> {
        self.to_xml_with(&XmlOptions::default())
    }

    pub fn to_xml_with(&self, options: &XmlOptions) -> Result<String> {
        chunks_to_xml(&self.chunks, &self.strings, options)
    }

    fn write_resource_map<W: Write>(&self, to: &mut W) -> Result<()> {
        match &self.resource_map {
            Some(ids) => crate::chunk::write_resource_map(to, ids),
            None => Ok(()),
        }
    }
}

fn attach<'d>(open: &mut [ElementNode<'d>], roots: &mut Vec<Node<'d>>, node: Node<'d>) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

impl<'d> ElementNode<'d> {
    pub fn child_elements(&self) -> impl Iterator<Item = &ElementNode<'d>> + '_ {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }
}
