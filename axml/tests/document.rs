mod common;

use axml::{
    AttributeValue, AxmlDocument, AxmlError, ByteCursor, StringPool, ValueType, XmlOptions, ANDROID_NS_URI,
};
use common::{bare_application, manifest, DEBUGGABLE_ID, NAME_ID};

#[test]
fn unmodified_round_trip_is_byte_identical() {
    let bytes = manifest().to_bytes().unwrap();
    let document = AxmlDocument::read(&bytes[..]).unwrap();

    assert_eq!(document, manifest());
    assert_eq!(document.to_bytes().unwrap(), bytes);
}

#[test]
fn modified_round_trip_keeps_structure() {
    let mut document = manifest();
    let attribute = document
        .new_attribute(
            Some(ANDROID_NS_URI),
            "debuggable",
            Some(DEBUGGABLE_ID),
            &AttributeValue::Boolean(true),
        )
        .unwrap();
    document.inject_application_attribute(attribute).unwrap();

    let bytes = document.to_bytes().unwrap();
    let read = AxmlDocument::read(&bytes[..]).unwrap();
    assert_eq!(read, document);
    assert_eq!(read.resource_map(), &[NAME_ID, DEBUGGABLE_ID]);

    let application = read.application_tag().unwrap();
    let strings = read.string_pool();
    assert_eq!(strings.get(application.attributes[0].name), "name");
    assert_eq!(application.attributes[0].format_value(strings, None), "test");
    assert_eq!(strings.get(application.attributes[1].name), "debuggable");
    assert_eq!(read.resource_id(application.attributes[1].name), Some(DEBUGGABLE_ID));
    assert_eq!(application.attributes[1].value_type, ValueType::IntBoolean);
}

#[test]
fn injection_appends_in_order() {
    let mut document = manifest();
    let first = document
        .new_attribute(
            Some(ANDROID_NS_URI),
            "debuggable",
            Some(DEBUGGABLE_ID),
            &AttributeValue::Boolean(true),
        )
        .unwrap();
    let second = document
        .new_attribute(None, "extra", None, &AttributeValue::Integer(42))
        .unwrap();
    document.inject_application_attribute(first).unwrap();
    document.inject_application_attribute(second).unwrap();

    let options = XmlOptions {
        indent: None,
        declaration: false,
        resolver: None,
    };
    let xml = document.to_xml_with(&options).unwrap();
    assert!(xml.contains(r#"<application android:name="test" android:debuggable="true" extra="42" />"#));
}

#[test]
fn injection_requires_application() {
    let strings = StringPool::from_strings(["manifest"], false);
    let mut document = AxmlDocument::new(
        strings,
        None,
        vec![
            axml::Chunk::StartElement(axml::StartElement::new(-1, 0, 1)),
            common::end(0, 1),
        ],
    );
    let attribute = document
        .new_attribute(None, "extra", None, &AttributeValue::Integer(1))
        .unwrap();

    assert!(matches!(
        document.inject_application_attribute(attribute),
        Err(AxmlError::IllegalState(_))
    ));
}

#[test]
fn string_pool_bounds() {
    let document = manifest();
    let strings = document.string_pool();
    let count = strings.len() as i32;

    for index in [-1, -100, i32::MIN, count, count + 1, i32::MAX, 0xFFFFFFFFu32 as i32] {
        assert_eq!(strings.get(index), "");
    }
    assert_eq!(strings.get(count - 1), "com.example");

    let empty = StringPool::new(true);
    assert_eq!(empty.get(0), "");
    assert_eq!(empty.get(-1), "");
}

#[test]
fn out_of_order_pool_offsets_are_tolerated() {
    let mut bytes = StringPool::from_strings(["abc", "de"], true).to_bytes().unwrap();
    // Swap the two entries of the offset table
    let (first, second) = (bytes[28..32].to_vec(), bytes[32..36].to_vec());
    bytes[28..32].copy_from_slice(&second);
    bytes[32..36].copy_from_slice(&first);

    let pool = StringPool::read(&mut ByteCursor::le(&bytes[..])).unwrap();
    assert!(pool.is_suspicious());
    assert_eq!(pool.get(0), "de");
    assert_eq!(pool.get(1), "abc");
}

#[test]
fn resource_map_size_is_checked() {
    let document = manifest();
    let map_start = 8 + document.string_pool().size() as usize;

    for bad_size in [4u32, 10, 13] {
        let mut bytes = document.to_bytes().unwrap();
        bytes[map_start + 4..map_start + 8].copy_from_slice(&bad_size.to_le_bytes());
        assert!(
            matches!(AxmlDocument::read(&bytes[..]), Err(AxmlError::InvalidFormat(_))),
            "size {bad_size} should be rejected"
        );
    }
}

#[test]
fn header_magic_is_checked() {
    let mut bytes = bare_application().to_bytes().unwrap();
    bytes[0] = 0x04;

    assert!(matches!(AxmlDocument::read(&bytes[..]), Err(AxmlError::InvalidFormat(_))));
}

#[test]
fn truncated_attribute_is_an_error() {
    let bytes = common::single_attribute(ValueType::IntDec, 7).to_bytes().unwrap();
    // Drop the end element and part of the attribute record before it
    let truncated = &bytes[..bytes.len() - 24 - 6];

    assert!(matches!(
        AxmlDocument::read(truncated),
        Err(AxmlError::UnexpectedEndOfInput)
    ));
}

#[test]
fn forest_matches_nesting() {
    let document = manifest();
    let forest = document.forest();
    assert_eq!(forest.len(), 1);

    let axml::Node::Element(root) = &forest[0] else {
        panic!("root should be an element");
    };
    let strings = document.string_pool();
    assert_eq!(strings.get(root.start.name), "manifest");
    let children: Vec<_> = root.child_elements().map(|child| strings.get(child.start.name)).collect();
    assert_eq!(children, ["application"]);
}
