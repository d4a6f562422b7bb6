//! Renders decoded documents as text XML through `xml-rs`.

use std::io::Write;

use log::{debug, warn};
use xml::name::OwnedName;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::chunk::{Chunk, StartElement};
use crate::namespace::NamespaceStack;
use crate::string_pool::StringPool;
use crate::value::ResourceResolver;
use crate::Result;

/// Controls how a document is converted to text XML.
#[derive(Clone)]
pub struct XmlOptions<'r> {
    /// String used for each level of indentation. `None` writes the document on a single line.
    pub indent: Option<String>,
    /// Whether to begin the output with `<?xml version="1.0" encoding="utf-8"?>`.
    pub declaration: bool,
    /// Used to name the resources referred to by reference typed attributes.
    pub resolver: Option<&'r dyn ResourceResolver>,
}

impl Default for XmlOptions<'_> {
    fn default() -> Self {
        Self {
            indent: Some("    ".to_string()),
            declaration: true,
            resolver: None,
        }
    }
}

/// Thin wrapper over an `xml-rs` writer that tracks how many elements are open.
pub(crate) struct XmlRenderer<W: Write> {
    writer: EventWriter<W>,
    open_elements: usize,
}

impl<W: Write> XmlRenderer<W> {
    pub(crate) fn new(to: W, options: &XmlOptions) -> Self {
        let config = EmitterConfig::new()
            .perform_indent(options.indent.is_some())
            .indent_string(options.indent.clone().unwrap_or_default())
            .write_document_declaration(options.declaration);

        Self {
            writer: config.create_writer(to),
            open_elements: 0,
        }
    }

    /// Opens an element. `namespaces` are the (prefix, URI) pairs declared by this element,
    /// a `None` prefix declares the default namespace.
    pub(crate) fn start_element(
        &mut self,
        name: &OwnedName,
        attributes: &[(OwnedName, String)],
        namespaces: &[(Option<String>, String)],
    ) -> Result<()> {
        let mut builder = XmlEvent::start_element(name.borrow());
        for (attr_name, value) in attributes {
            builder = builder.attr(attr_name.borrow(), value);
        }
        for (prefix, uri) in namespaces {
            builder = match prefix {
                Some(prefix) => builder.ns(prefix.as_str(), uri.as_str()),
                None => builder.default_ns(uri.as_str()),
            };
        }

        self.writer.write(builder)?;
        self.open_elements += 1;
        Ok(())
    }

    /// Closes the innermost open element. Returns false, writing nothing, if there is none.
    pub(crate) fn end_element(&mut self) -> Result<bool> {
        if self.open_elements == 0 {
            return Ok(false);
        }

        self.writer.write(XmlEvent::end_element())?;
        self.open_elements -= 1;
        Ok(true)
    }

    /// Writes text content. Text outside of the root element is dropped.
    pub(crate) fn text(&mut self, text: &str) -> Result<()> {
        if self.open_elements == 0 {
            debug!("Dropping text outside of the root element");
            return Ok(());
        }

        self.writer.write(XmlEvent::characters(text))?;
        Ok(())
    }

    /// Closes any elements that are still open and returns the underlying writer.
    pub(crate) fn finish(mut self) -> Result<W> {
        if self.open_elements > 0 {
            warn!("{} elements were never closed, closing them", self.open_elements);
        }
        while self.end_element()? {}

        Ok(self.writer.into_inner())
    }
}

/// Converts a sequence of AXML chunks into text XML, resolving strings through `strings`.
pub fn render_chunks<'c, W, I>(to: W, chunks: I, strings: &StringPool, options: &XmlOptions) -> Result<W>
where
    W: Write,
    I: IntoIterator<Item = &'c Chunk>,
{
    let mut renderer = XmlRenderer::new(to, options);
    let mut namespaces = NamespaceStack::new();
    namespaces.increase_depth();

    // AXML declares namespaces in chunks before the element that introduces them.
    // These are held here until that element is written.
    let mut queued_namespaces: Vec<(i32, i32)> = Vec::new();

    for chunk in chunks {
        match chunk {
            Chunk::StartNamespace(ns) => queued_namespaces.push((ns.prefix, ns.uri)),
            Chunk::StartElement(element) => {
                namespaces.increase_depth();
                let mut declared = Vec::with_capacity(queued_namespaces.len());
                for (prefix, uri) in queued_namespaces.drain(..) {
                    namespaces.push(prefix, uri);
                    let prefix = match strings.get(prefix) {
                        "" => None,
                        prefix => Some(prefix.to_string()),
                    };
                    declared.push((prefix, strings.get(uri).to_string()));
                }

                let (name, attributes) = element_names(element, strings, &namespaces, options);
                renderer.start_element(&name, &attributes, &declared)?;
            }
            Chunk::EndElement(_) => {
                if renderer.end_element()? {
                    namespaces.decrease_depth();
                } else {
                    warn!("Dropping end tag that does not match any open element");
                }
            }
            Chunk::Text(text) => renderer.text(strings.get(text.text))?,
            // Scopes close with their element
            Chunk::EndNamespace(_) => {}
            Chunk::Header(_) | Chunk::StringPool(_) | Chunk::ResourceMap(_) => {}
        }
    }

    renderer.finish()
}

/// Converts a sequence of AXML chunks into a string of text XML.
pub fn chunks_to_xml<'c, I>(chunks: I, strings: &StringPool, options: &XmlOptions) -> Result<String>
where
    I: IntoIterator<Item = &'c Chunk>,
{
    let bytes = render_chunks(Vec::new(), chunks, strings, options)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// Gets the qualified name of an element and each of its attributes, along with the attribute values.
fn element_names(
    element: &StartElement,
    strings: &StringPool,
    namespaces: &NamespaceStack,
    options: &XmlOptions,
) -> (OwnedName, Vec<(OwnedName, String)>) {
    let name = qualified_name(element.namespace, element.name, strings, namespaces);
    let attributes = element
        .attributes
        .iter()
        .map(|attr| {
            (
                qualified_name(attr.namespace, attr.name, strings, namespaces),
                attr.format_value(strings, options.resolver),
            )
        })
        .collect();

    (name, attributes)
}

fn qualified_name(namespace: i32, name: i32, strings: &StringPool, namespaces: &NamespaceStack) -> OwnedName {
    let local_name = strings.get(name).to_string();
    if namespace < 0 {
        return OwnedName {
            local_name,
            namespace: None,
            prefix: None,
        };
    }

    OwnedName {
        local_name,
        namespace: Some(strings.get(namespace).to_string()),
        prefix: find_prefix(namespace, strings, namespaces).map(str::to_string),
    }
}

// Matches by index first, then by text in case the pool holds the URI more than once.
fn find_prefix<'s>(uri: i32, strings: &'s StringPool, namespaces: &NamespaceStack) -> Option<&'s str> {
    let prefix = namespaces.find_prefix(uri).or_else(|| {
        let uri_text = strings.get(uri);
        (0..namespaces.total_count())
            .rev()
            .find(|pos| namespaces.uri_at(*pos).map(|uri| strings.get(uri)) == Some(uri_text))
            .and_then(|pos| namespaces.prefix_at(pos))
    })?;

    match strings.get(prefix) {
        "" => None,
        prefix => Some(prefix),
    }
}
