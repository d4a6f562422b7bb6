//! Builds small AXML documents with the crate's own encoders.
#![allow(dead_code)]

use axml::{
    Attribute, AxmlDocument, Chunk, EndElement, Header, NamespaceChunk, StartElement, StringPool,
    ValueType, ANDROID_NS_URI,
};

pub const NAME_ID: u32 = 0x01010003;
pub const DEBUGGABLE_ID: u32 = 0x0101000f;

pub fn end(name: i32, line: u32) -> Chunk {
    Chunk::EndElement(EndElement {
        line,
        comment: -1,
        namespace: -1,
        name,
    })
}

pub fn namespace(prefix: i32, uri: i32) -> NamespaceChunk {
    NamespaceChunk {
        line: 1,
        comment: -1,
        prefix,
        uri,
    }
}

/// `<manifest xmlns:android=... package="com.example"><application android:name="test"/></manifest>`
pub fn manifest() -> AxmlDocument {
    let strings = StringPool::from_strings(
        [
            "name",
            "android",
            ANDROID_NS_URI,
            "manifest",
            "application",
            "test",
            "package",
            "com.example",
        ],
        true,
    );
    let ns = namespace(1, 2);

    let mut manifest = StartElement::new(-1, 3, 1);
    manifest
        .attributes
        .push(Attribute::new(-1, 6, ValueType::String, 7, 7));
    let mut application = StartElement::new(-1, 4, 2);
    application
        .attributes
        .push(Attribute::new(2, 0, ValueType::String, 5, 5));

    AxmlDocument::new(
        strings,
        Some(vec![NAME_ID]),
        vec![
            Chunk::StartNamespace(ns),
            Chunk::StartElement(manifest),
            Chunk::StartElement(application),
            end(4, 2),
            end(3, 3),
            Chunk::EndNamespace(ns),
        ],
    )
}

/// A document whose only element is an empty `<application>`.
pub fn bare_application() -> AxmlDocument {
    let strings = StringPool::from_strings(["android", "name", "test", "application"], false);
    AxmlDocument::new(
        strings,
        None,
        vec![Chunk::StartElement(StartElement::new(-1, 3, 1)), end(3, 1)],
    )
}

/// A single element with one attribute of the given type.
pub fn single_attribute(value_type: ValueType, data: i32) -> AxmlDocument {
    let strings = StringPool::from_strings(["root", "value"], false);
    let mut root = StartElement::new(-1, 0, 1);
    root.attributes
        .push(Attribute::new(-1, 1, value_type, -1, data));

    AxmlDocument::new(strings, None, vec![Chunk::StartElement(root), end(0, 1)])
}

/// Encodes the chunks after a header that covers them.
pub fn encode(chunks: &[Chunk]) -> Vec<u8> {
    let size = 8 + chunks.iter().map(Chunk::size).sum::<u32>();
    let mut bytes = Vec::new();
    Chunk::Header(Header { file_size: size })
        .write(&mut bytes)
        .unwrap();
    for chunk in chunks {
        chunk.write(&mut bytes).unwrap();
    }
    bytes
}

/// The bytes of [`manifest`], with the resource map written before the string pool.
pub fn manifest_with_map_first() -> Vec<u8> {
    let document = manifest();
    let mut chunks = vec![
        Chunk::ResourceMap(document.resource_map().to_vec()),
        Chunk::StringPool(document.string_pool().clone()),
    ];
    chunks.extend(document.chunks().iter().cloned());
    encode(&chunks)
}
