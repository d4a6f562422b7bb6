//! Module to read, edit and save the Android binary XML format (AXML).
//! Used for reading and modifying APK manifests and compiled XML resources.
//!
//! Files can be read as a stream of events with [AxmlParser], or loaded in full into an
//! [AxmlDocument] which can be edited and saved again.

mod chunk;
mod cursor;
mod document;
mod error;
mod namespace;
mod parser;
mod protobuf;
mod render;
mod res_ids;
mod string_pool;
mod value;

pub use chunk::{
    Attribute, AttributeValue, Chunk, ChunkType, EndElement, Header, NamespaceChunk, StartElement, TextChunk,
    DEFAULT_ATTRIBUTE_LAYOUT, DEFAULT_TYPE_METADATA,
};
pub use cursor::{ByteCursor, Endian};
pub use document::{AxmlDocument, ElementNode, Node};
pub use error::{AxmlError, Result};
pub use namespace::NamespaceStack;
pub use parser::{AxmlParser, EventType};
pub use protobuf::{
    is_protobuf_format, Item, Primitive, ProtobufXmlResource, XmlAttribute, XmlElement, XmlNamespace, XmlNode,
};
pub use res_ids::ResourceIds;
pub use string_pool::{PoolEntry, StringPool, StyleEntry, StyleSpan, SORTED_FLAG, UTF8_FLAG};
pub use value::{format_value, ResourceResolver, ValueType};
pub use render::{chunks_to_xml, render_chunks, XmlOptions};

pub const ANDROID_NS_URI: &str = "http://schemas.android.com/apk/res/android";
