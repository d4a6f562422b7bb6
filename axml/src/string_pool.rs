//! The indexed table of strings that every other chunk refers to.

use std::io::{Read, Write};

use byteorder::{WriteBytesExt, LE};
use log::warn;

use crate::chunk::ChunkType;
use crate::cursor::ByteCursor;
use crate::{AxmlError, Result};

pub const SORTED_FLAG: u32 = 1 << 0;
pub const UTF8_FLAG: u32 = 1 << 8;

// Chunk header plus the five pool header fields
const HEADER_SIZE: u32 = 28;
const SPAN_END: u32 = 0xFFFFFFFF;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolEntry {
    /// Offset of the encoded string relative to the start of the string data.
    pub offset: u32,
    pub text: String,
}

/// A styled range of characters within a string. `name` is the index of the tag name in the pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StyleSpan {
    pub name: u32,
    pub first_char: u32,
    pub last_char: u32,
}

/// The style of the string with the same index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleEntry {
    pub offset: u32,
    pub spans: Vec<StyleSpan>,
}

#[derive(Clone, Debug)]
pub struct StringPool {
    entries: Vec<PoolEntry>,
    styles: Vec<StyleEntry>,
    flags: u32,
    suspicious: bool,
    // The chunk exactly as it was read, written back out until the pool is modified.
    raw: Option<Vec<u8>>,
}

impl PartialEq for StringPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.styles == other.styles && self.flags == other.flags
    }
}

impl StringPool {
    pub fn new(utf8: bool) -> Self {
        Self {
            entries: Vec::new(),
            styles: Vec::new(),
            flags: if utf8 { UTF8_FLAG } else { 0 },
            suspicious: false,
            raw: None,
        }
    }

    pub fn from_strings<I, S>(strings: I, utf8: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pool = Self::new(utf8);
        for string in strings {
            pool.entries.push(PoolEntry {
                offset: 0,
                text: string.into(),
            });
        }
        pool.relayout();
        pool
    }

    /// Reads a complete string pool chunk, including its type tag.
    pub fn read<R: Read>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        let tag = cursor.read_u32()?;
        if ChunkType::parse(tag) != Some(ChunkType::StringPool) {
            return Err(AxmlError::InvalidFormat(format!(
                "expected string pool chunk, found tag {tag:#010x}"
            )));
        }

        let size = cursor.read_u32()?;
        Self::read_body(cursor, size)
    }

    /// Reads the remainder of a string pool chunk once its tag and size have been consumed.
    pub(crate) fn read_body<R: Read>(cursor: &mut ByteCursor<R>, size: u32) -> Result<Self> {
        if size < HEADER_SIZE {
            return Err(AxmlError::InvalidFormat(format!(
                "string pool chunk of {size} bytes is smaller than its header"
            )));
        }

        let string_count = cursor.read_u32()?;
        let style_count = cursor.read_u32()?;
        let flags = cursor.read_u32()?;
        let strings_start = cursor.read_u32()?;
        let styles_start = cursor.read_u32()?;

        // The whole body is consumed up front: string offsets are not guaranteed to be in order,
        // so entries are decoded by position within it rather than by skipping forward.
        let body = cursor.read_bytes((size - HEADER_SIZE) as usize)?;

        let mut raw = Vec::with_capacity(size as usize);
        for word in [
            ChunkType::StringPool.tag(),
            size,
            string_count,
            style_count,
            flags,
            strings_start,
            styles_start,
        ] {
            raw.write_u32::<LE>(word)?;
        }
        raw.extend_from_slice(&body);

        let mut table = ByteCursor::le(&body[..]);
        let string_offsets = table.read_int_array(string_count as usize)?;
        let style_offsets = table.read_int_array(style_count as usize)?;

        let utf8 = flags & UTF8_FLAG != 0;
        let mut suspicious = false;

        let mut entries = Vec::with_capacity(string_offsets.len());
        if !string_offsets.is_empty() {
            let base = data_base(strings_start, "strings")?;
            let (texts, overlapping) =
                decode_by_offset(&body, base, &string_offsets, |data| read_string(data, utf8))?;
            suspicious |= overlapping;

            for (offset, text) in string_offsets.iter().zip(texts) {
                entries.push(PoolEntry {
                    offset: *offset,
                    text,
                });
            }
        }

        let mut styles = Vec::with_capacity(style_offsets.len());
        if !style_offsets.is_empty() {
            let base = data_base(styles_start, "styles")?;
            let (span_lists, overlapping) =
                decode_by_offset(&body, base, &style_offsets, read_spans)?;
            suspicious |= overlapping;

            for (offset, spans) in style_offsets.iter().zip(span_lists) {
                styles.push(StyleEntry {
                    offset: *offset,
                    spans,
                });
            }
        }

        if suspicious {
            warn!("String pool offsets are out of order or overlap, this file may have been crafted to confuse parsers");
        }

        Ok(Self {
            entries,
            styles,
            flags,
            suspicious,
            raw: Some(raw),
        })
    }

    /// Gets the string at the given index.
    /// Negative or out of range indices give an empty string.
    pub fn get(&self, index: i32) -> &str {
        if index < 0 {
            return "";
        }

        self.entries
            .get(index as usize)
            .map(|entry| entry.text.as_str())
            .unwrap_or("")
    }

    /// Gets the index of the first string equal to `text`, or -1 if it is not in the pool.
    pub fn find(&self, text: &str) -> i32 {
        self.entries
            .iter()
            .position(|entry| entry.text == text)
            .map(|idx| idx as i32)
            .unwrap_or(-1)
    }

    /// Gets the index of `text`, adding it to the end of the pool if it is not already present.
    pub fn intern(&mut self, text: &str) -> i32 {
        match self.find(text) {
            -1 => self.push(text),
            idx => idx,
        }
    }

    /// Appends a string to the pool (even if an equal string exists) and returns its index.
    pub fn push(&mut self, text: &str) -> i32 {
        self.entries.push(PoolEntry {
            offset: 0,
            text: text.to_string(),
        });
        self.relayout();
        self.entries.len() as i32 - 1
    }

    /// Inserts a string at `index`, shifting every later string up by one.
    /// Style spans within the pool are renumbered, the caller is responsible for renumbering
    /// any other references to the shifted strings.
    pub fn insert(&mut self, index: usize, text: &str) -> Result<()> {
        if index > self.entries.len() {
            return Err(AxmlError::InvalidArgument(format!(
                "cannot insert string at {index}, pool only has {} strings",
                self.entries.len()
            )));
        }
        if index < self.styles.len() {
            return Err(AxmlError::InvalidArgument(format!(
                "inserting at {index} would detach the styles of {} strings",
                self.styles.len() - index
            )));
        }

        self.entries.insert(
            index,
            PoolEntry {
                offset: 0,
                text: text.to_string(),
            },
        );
        for span in self.styles.iter_mut().flat_map(|style| style.spans.iter_mut()) {
            if span.name as usize >= index {
                span.name += 1;
            }
        }
        self.relayout();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & UTF8_FLAG != 0
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn styles(&self) -> &[StyleEntry] {
        &self.styles
    }

    pub fn style(&self, index: i32) -> Option<&StyleEntry> {
        if index < 0 {
            return None;
        }
        self.styles.get(index as usize)
    }

    /// True if the offset table of the decoded chunk was out of order or had overlapping entries.
    pub fn is_suspicious(&self) -> bool {
        self.suspicious
    }

    /// The number of bytes that `write` will produce.
    pub fn size(&self) -> u32 {
        if let Some(raw) = &self.raw {
            return raw.len() as u32;
        }

        let utf8 = self.is_utf8();
        let strings_len: usize = self
            .entries
            .iter()
            .map(|entry| encoded_len(&entry.text, utf8))
            .sum();
        let styles_len = self.styles_len();

        (HEADER_SIZE as usize
            + 4 * (self.entries.len() + self.styles.len())
            + pad4(strings_len)
            + styles_len) as u32
    }

    pub fn write<W: Write>(&self, to: &mut W) -> Result<()> {
        match &self.raw {
            Some(raw) => to.write_all(raw)?,
            None => to.write_all(&self.encode()?)?,
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.size() as usize);
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    // Encodes the pool in the layout produced by aapt: offsets, string data padded to 4 bytes, then styles.
    fn encode(&self) -> Result<Vec<u8>> {
        let utf8 = self.is_utf8();

        let mut string_offsets = Vec::with_capacity(self.entries.len());
        let mut string_data = Vec::new();
        for entry in &self.entries {
            string_offsets.push(string_data.len() as u32);
            write_string(&mut string_data, &entry.text, utf8)?;
        }
        while string_data.len() % 4 != 0 {
            string_data.push(0);
        }

        let mut style_offsets = Vec::with_capacity(self.styles.len());
        let mut style_data = Vec::new();
        for style in &self.styles {
            style_offsets.push(style_data.len() as u32);
            for span in &style.spans {
                style_data.write_u32::<LE>(span.name)?;
                style_data.write_u32::<LE>(span.first_char)?;
                style_data.write_u32::<LE>(span.last_char)?;
            }
            style_data.write_u32::<LE>(SPAN_END)?;
        }
        if !self.styles.is_empty() {
            style_data.write_u32::<LE>(SPAN_END)?;
            style_data.write_u32::<LE>(SPAN_END)?;
        }

        let tables_end = HEADER_SIZE + 4 * (string_offsets.len() + style_offsets.len()) as u32;
        let strings_start = if string_offsets.is_empty() { 0 } else { tables_end };
        let styles_start = if style_offsets.is_empty() {
            0
        } else {
            tables_end + string_data.len() as u32
        };
        let size = tables_end + string_data.len() as u32 + style_data.len() as u32;

        let mut out = Vec::with_capacity(size as usize);
        out.write_u32::<LE>(ChunkType::StringPool.tag())?;
        out.write_u32::<LE>(size)?;
        out.write_u32::<LE>(string_offsets.len() as u32)?;
        out.write_u32::<LE>(style_offsets.len() as u32)?;
        out.write_u32::<LE>(self.flags)?;
        out.write_u32::<LE>(strings_start)?;
        out.write_u32::<LE>(styles_start)?;
        for offset in string_offsets.into_iter().chain(style_offsets) {
            out.write_u32::<LE>(offset)?;
        }
        out.extend_from_slice(&string_data);
        out.extend_from_slice(&style_data);

        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn set_styles(&mut self, styles: Vec<StyleEntry>) {
        self.styles = styles;
        self.relayout();
    }

    // Recomputes the offset of each entry after a modification, and drops the original chunk bytes.
    fn relayout(&mut self) {
        self.raw = None;

        let utf8 = self.is_utf8();
        let mut offset = 0;
        for entry in &mut self.entries {
            entry.offset = offset as u32;
            offset += encoded_len(&entry.text, utf8);
        }

        let mut offset = 0;
        for style in &mut self.styles {
            style.offset = offset as u32;
            offset += 12 * style.spans.len() + 4;
        }
    }

    fn styles_len(&self) -> usize {
        if self.styles.is_empty() {
            return 0;
        }

        let spans: usize = self.styles.iter().map(|style| 12 * style.spans.len() + 4).sum();
        spans + 8
    }
}

// Converts a `stringsStart` or `stylesStart` field into an offset within the chunk body.
fn data_base(start: u32, what: &str) -> Result<usize> {
    match start.checked_sub(HEADER_SIZE) {
        Some(base) => Ok(base as usize),
        None => Err(AxmlError::InvalidFormat(format!(
            "{what} start {start} points inside the string pool header"
        ))),
    }
}

// Decodes one item per offset, visiting the offsets in ascending order.
// Returns the items in their original order, and whether any of the items overlapped.
fn decode_by_offset<T, F>(body: &[u8], base: usize, offsets: &[u32], mut decode: F) -> Result<(Vec<T>, bool)>
where
    F: FnMut(&mut ByteCursor<&[u8]>) -> Result<T>,
{
    let mut order: Vec<usize> = (0..offsets.len()).collect();
    order.sort_by_key(|&idx| offsets[idx]);
    let mut overlapping = order.iter().enumerate().any(|(pos, &idx)| pos != idx);

    let mut decoded: Vec<Option<T>> = (0..offsets.len()).map(|_| None).collect();
    let mut prev_start = None;
    let mut prev_end = 0;
    for idx in order {
        let start = base
            .checked_add(offsets[idx] as usize)
            .filter(|start| *start <= body.len())
            .ok_or(AxmlError::UnexpectedEndOfInput)?;

        // Entries sharing an offset are a legitimate way of de-duplicating strings.
        if start < prev_end && prev_start != Some(start) {
            overlapping = true;
        }

        let mut data = ByteCursor::le(&body[start..]);
        decoded[idx] = Some(decode(&mut data)?);

        prev_start = Some(start);
        prev_end = prev_end.max(start + data.position() as usize);
    }

    Ok((decoded.into_iter().flatten().collect(), overlapping))
}

fn read_string(data: &mut ByteCursor<&[u8]>, utf8: bool) -> Result<String> {
    if utf8 {
        let _utf16_len = read_utf8_len(data)?;
        let byte_len = read_utf8_len(data)?;
        let bytes = data.read_bytes(byte_len as usize)?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        let unit_count = read_utf16_len(data)? as usize;
        let byte_len = unit_count
            .checked_mul(2)
            .ok_or(AxmlError::UnexpectedEndOfInput)?;
        let bytes = data.read_bytes(byte_len)?;

        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }
}

fn read_spans(data: &mut ByteCursor<&[u8]>) -> Result<Vec<StyleSpan>> {
    let mut spans = Vec::new();
    loop {
        let name = data.read_u32()?;
        if name == SPAN_END {
            break Ok(spans);
        }

        spans.push(StyleSpan {
            name,
            first_char: data.read_u32()?,
            last_char: data.read_u32()?,
        });
    }
}

// UTF-8 pools prefix each string with two lengths (UTF-16 units then bytes).
// Each is one byte, or two if the top bit of the first is set, so the maximum is 0x7FFF.
fn read_utf8_len(data: &mut ByteCursor<&[u8]>) -> Result<u32> {
    let first = data.read_int(1)?;
    if first & 0x80 != 0 {
        Ok(((first & 0x7F) << 8) | data.read_int(1)?)
    } else {
        Ok(first)
    }
}

// UTF-16 lengths are one unit, or two if the top bit of the first is set.
fn read_utf16_len(data: &mut ByteCursor<&[u8]>) -> Result<u32> {
    let first = data.read_int(2)?;
    if first & 0x8000 != 0 {
        Ok(((first & 0x7FFF) << 16) | data.read_int(2)?)
    } else {
        Ok(first)
    }
}

fn write_string(to: &mut Vec<u8>, text: &str, utf8: bool) -> Result<()> {
    if utf8 {
        write_utf8_len(to, text.encode_utf16().count())?;
        write_utf8_len(to, text.len())?;
        to.extend_from_slice(text.as_bytes());
        to.write_u8(0)?;
    } else {
        let units: Vec<u16> = text.encode_utf16().collect();
        if units.len() > 0x7FFFFFFF {
            return Err(AxmlError::InvalidArgument(format!(
                "string of {} UTF-16 units is too long to encode",
                units.len()
            )));
        } else if units.len() > 0x7FFF {
            to.write_u16::<LE>(((units.len() >> 16) | 0x8000) as u16)?;
            to.write_u16::<LE>((units.len() & 0xFFFF) as u16)?;
        } else {
            to.write_u16::<LE>(units.len() as u16)?;
        }

        for unit in units {
            to.write_u16::<LE>(unit)?;
        }
        to.write_u16::<LE>(0)?;
    }

    Ok(())
}

fn write_utf8_len(to: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > 0x7FFF {
        return Err(AxmlError::InvalidArgument(format!(
            "string length {len} is too long to save as UTF-8"
        )));
    } else if len > 0x7F {
        to.write_u8(((len >> 8) | 0x80) as u8)?;
        to.write_u8((len & 0xFF) as u8)?;
    } else {
        to.write_u8(len as u8)?;
    }

    Ok(())
}

// The number of bytes `write_string` produces for `text`.
fn encoded_len(text: &str, utf8: bool) -> usize {
    let units = text.encode_utf16().count();
    if utf8 {
        let len_size = |len: usize| if len > 0x7F { 2 } else { 1 };
        len_size(units) + len_size(text.len()) + text.len() + 1
    } else {
        let len_size = if units > 0x7FFF { 4 } else { 2 };
        len_size + 2 * units + 2
    }
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<StringPool> {
        StringPool::read(&mut ByteCursor::le(bytes))
    }

    #[test]
    fn get_out_of_range_is_empty() {
        let pool = StringPool::from_strings(["android", "name"], false);

        assert_eq!(pool.get(0), "android");
        assert_eq!(pool.get(1), "name");
        assert_eq!(pool.get(-1), "");
        assert_eq!(pool.get(2), "");
        assert_eq!(pool.get(i32::MAX), "");
        assert_eq!(StringPool::new(true).get(0), "");
    }

    #[test]
    fn utf16_round_trip() {
        let pool = StringPool::from_strings(["android", "name", "", "ünïcödé ✓"], false);
        let bytes = pool.to_bytes().unwrap();
        assert_eq!(bytes.len() as u32, pool.size());
        assert_eq!(bytes.len() % 4, 0);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, pool);
        assert!(!decoded.is_utf8());
        assert!(!decoded.is_suspicious());
        assert_eq!(decoded.get(3), "ünïcödé ✓");
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn utf8_round_trip_with_long_string() {
        let long = "x".repeat(300);
        let pool = StringPool::from_strings(["package", long.as_str(), "日本語"], true);
        let bytes = pool.to_bytes().unwrap();

        let decoded = decode(&bytes).unwrap();
        assert!(decoded.is_utf8());
        assert_eq!(decoded.get(1), long);
        assert_eq!(decoded.get(2), "日本語");
        assert_eq!(decoded, pool);
    }

    #[test]
    fn header_layout() {
        let pool = StringPool::from_strings(["a"], false);
        let bytes = pool.to_bytes().unwrap();

        // tag, size, count, style count, flags, strings start, styles start, one offset, "a" + NUL
        assert_eq!(&bytes[0..4], &[0x01, 0x00, 0x1C, 0x00]);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 40);
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), 32);
        assert_eq!(&bytes[32..38], &[1, 0, b'a', 0, 0, 0]);
    }

    #[test]
    fn out_of_order_offsets_are_tolerated() {
        let pool = StringPool::from_strings(["first", "second"], false);
        let mut bytes = pool.to_bytes().unwrap();

        // Swap the two entries of the offset table
        let (first, second) = (bytes[28..32].to_vec(), bytes[32..36].to_vec());
        bytes[28..32].copy_from_slice(&second);
        bytes[32..36].copy_from_slice(&first);

        let decoded = decode(&bytes).unwrap();
        assert!(decoded.is_suspicious());
        assert_eq!(decoded.get(0), "second");
        assert_eq!(decoded.get(1), "first");
    }

    #[test]
    fn overlapping_offsets_are_tolerated() {
        // Encodes as [5, 5, a, b, 1, 1, c, 0], which contains a valid encoding of "c" at offset 4
        let pool = StringPool::from_strings(["ab\u{1}\u{1}c", "xyz"], true);
        let mut bytes = pool.to_bytes().unwrap();

        // Point the second entry into the middle of the first
        bytes[32..36].copy_from_slice(&4u32.to_le_bytes());

        let decoded = decode(&bytes).unwrap();
        assert!(decoded.is_suspicious());
        assert_eq!(decoded.get(0), "ab\u{1}\u{1}c");
        assert_eq!(decoded.get(1), "c");
    }

    #[test]
    fn offset_past_end_is_short_read() {
        let pool = StringPool::from_strings(["a"], false);
        let mut bytes = pool.to_bytes().unwrap();
        bytes[28..32].copy_from_slice(&400u32.to_le_bytes());

        assert!(matches!(decode(&bytes), Err(AxmlError::UnexpectedEndOfInput)));
    }

    #[test]
    fn truncated_pool() {
        let pool = StringPool::from_strings(["android", "name"], false);
        let bytes = pool.to_bytes().unwrap();

        assert!(matches!(
            decode(&bytes[..bytes.len() - 3]),
            Err(AxmlError::UnexpectedEndOfInput)
        ));
    }

    #[test]
    fn wrong_tag() {
        let pool = StringPool::from_strings(["a"], false);
        let mut bytes = pool.to_bytes().unwrap();
        bytes[0] = 0x02;

        assert!(matches!(decode(&bytes), Err(AxmlError::InvalidFormat(_))));
    }

    #[test]
    fn find_and_intern() {
        let mut pool = StringPool::from_strings(["android", "name", "name"], false);

        assert_eq!(pool.find("name"), 1);
        assert_eq!(pool.find("missing"), -1);
        assert_eq!(pool.intern("android"), 0);
        assert_eq!(pool.intern("test"), 3);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.get(3), "test");
    }

    #[test]
    fn modification_drops_original_bytes() {
        let pool = StringPool::from_strings(["a", "b"], true);
        let mut decoded = decode(&pool.to_bytes().unwrap()).unwrap();

        decoded.push("c");
        let reencoded = decode(&decoded.to_bytes().unwrap()).unwrap();
        assert_eq!(reencoded, decoded);
        assert_eq!(reencoded.get(2), "c");
        assert_eq!(reencoded.entries()[2].offset, decoded.entries()[2].offset);
    }

    #[test]
    fn styles_round_trip() {
        let mut pool = StringPool::from_strings(["hello world", "b"], false);
        pool.styles = vec![StyleEntry {
            offset: 0,
            spans: vec![StyleSpan {
                name: 1,
                first_char: 0,
                last_char: 4,
            }],
        }];
        pool.relayout();

        let bytes = pool.to_bytes().unwrap();
        assert_eq!(bytes.len() as u32, pool.size());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, pool);
        assert_eq!(decoded.style(0).unwrap().spans[0].last_char, 4);
        assert!(decoded.style(1).is_none());
    }

    #[test]
    fn insert_respects_styles() {
        let mut pool = StringPool::from_strings(["a", "b"], false);
        pool.insert(1, "c").unwrap();
        assert_eq!(pool.get(1), "c");
        assert_eq!(pool.get(2), "b");
        assert!(pool.insert(9, "d").is_err());

        pool.styles = vec![StyleEntry {
            offset: 0,
            spans: Vec::new(),
        }];
        assert!(matches!(pool.insert(0, "d"), Err(AxmlError::InvalidArgument(_))));
        pool.insert(1, "d").unwrap();
    }
}
