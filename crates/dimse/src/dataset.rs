//! In-memory DICOM data sets and their binary encoding
//!
//! A [`Dataset`] maps tags to [`DataElement`]s. It is encoded in ascending
//! tag order in either of the little endian transfer syntaxes supported by
//! [`TransferSyntax`]. Decoding never validates values semantically: dates,
//! times and names are kept as the text found on the wire.
//!
//! Attributes the decoder does not know are retained as opaque elements
//! (`UN` bytes under implicit VR) so higher layers can ignore or expose them.

use std::collections::BTreeMap;

use dicom_core::{Tag, VR};
use tracing::debug;

use crate::dictionary;
use crate::error::{DimseError, Result};
use crate::transfer_syntax::TransferSyntax;

const ITEM: Tag = Tag(0xFFFE, 0xE000);
const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Value of a data element
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Zero-length value; also how absent return keys are represented
    Empty,
    /// Textual values, one entry per value multiplicity item
    Strs(Vec<String>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Attribute tags (`AT`)
    Tags(Vec<Tag>),
    /// Raw bytes for `OB`, `OW`, `UN` and the other binary VRs
    Bytes(Vec<u8>),
    Sequence(Vec<Dataset>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Strs(v) => v.iter().all(|s| s.is_empty()),
            Value::U16(v) => v.is_empty(),
            Value::U32(v) => v.is_empty(),
            Value::I16(v) => v.is_empty(),
            Value::I32(v) => v.is_empty(),
            Value::F32(v) => v.is_empty(),
            Value::F64(v) => v.is_empty(),
            Value::Tags(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Sequence(v) => v.is_empty(),
        }
    }

    /// Render a textual or numeric value as DICOM text, items joined by `\`.
    ///
    /// Binary values and sequences have no textual form and yield `None`.
    pub fn to_text(&self) -> Option<String> {
        fn join<T: ToString>(values: &[T]) -> String {
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\\")
        }

        match self {
            Value::Empty => Some(String::new()),
            Value::Strs(v) => Some(v.join("\\")),
            Value::U16(v) => Some(join(v)),
            Value::U32(v) => Some(join(v)),
            Value::I16(v) => Some(join(v)),
            Value::I32(v) => Some(join(v)),
            Value::F32(v) => Some(join(v)),
            Value::F64(v) => Some(join(v)),
            Value::Tags(v) => Some(join(v)),
            Value::Bytes(_) | Value::Sequence(_) => None,
        }
    }
}

/// A single DICOM attribute
#[derive(Debug, Clone, PartialEq)]
pub struct DataElement {
    pub tag: Tag,
    pub vr: VR,
    pub value: Value,
}

impl DataElement {
    pub fn new(tag: Tag, vr: VR, value: Value) -> Self {
        Self { tag, vr, value }
    }

    /// Element with no value (a universal-match return key in queries)
    pub fn empty(tag: Tag, vr: VR) -> Self {
        Self::new(tag, vr, Value::Empty)
    }

    /// Textual element. Multi-valued VRs are split on `\`.
    pub fn text(tag: Tag, vr: VR, text: &str) -> Self {
        let value = if text.is_empty() {
            Value::Empty
        } else if let ValueKind::Text { multi: true } = value_kind(vr) {
            Value::Strs(text.split('\\').map(str::to_string).collect())
        } else {
            Value::Strs(vec![text.to_string()])
        };
        Self::new(tag, vr, value)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// First textual value, if any
    pub fn first_str(&self) -> Option<&str> {
        match &self.value {
            Value::Strs(v) => v.first().map(String::as_str),
            _ => None,
        }
    }
}

/// A DICOM data set: tag-keyed attributes, kept in ascending tag order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    elements: BTreeMap<Tag, DataElement>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element, replacing any element with the same tag
    pub fn put(&mut self, element: DataElement) -> Option<DataElement> {
        self.elements.insert(element.tag, element)
    }

    /// Insert a textual element with an explicit VR
    pub fn put_str(&mut self, tag: Tag, vr: VR, text: &str) {
        self.put(DataElement::text(tag, vr, text));
    }

    /// Insert a textual element, taking the VR from the built-in dictionary
    pub fn put_text(&mut self, tag: Tag, text: &str) {
        self.put_str(tag, dictionary::vr_of(tag), text);
    }

    /// Insert a zero-length element, taking the VR from the dictionary
    pub fn put_empty(&mut self, tag: Tag) {
        self.put(DataElement::empty(tag, dictionary::vr_of(tag)));
    }

    pub fn put_u16(&mut self, tag: Tag, value: u16) {
        self.put(DataElement::new(tag, VR::US, Value::U16(vec![value])));
    }

    pub fn put_u32(&mut self, tag: Tag, value: u32) {
        self.put(DataElement::new(tag, VR::UL, Value::U32(vec![value])));
    }

    pub fn put_bytes(&mut self, tag: Tag, vr: VR, bytes: Vec<u8>) {
        self.put(DataElement::new(tag, vr, Value::Bytes(bytes)));
    }

    pub fn put_sequence(&mut self, tag: Tag, items: Vec<Dataset>) {
        self.put(DataElement::new(tag, VR::SQ, Value::Sequence(items)));
    }

    /// Builder-style variant of [`Dataset::put_text`]
    pub fn with_text(mut self, tag: Tag, text: &str) -> Self {
        self.put_text(tag, text);
        self
    }

    pub fn get(&self, tag: Tag) -> Option<&DataElement> {
        self.elements.get(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<DataElement> {
        self.elements.remove(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in ascending tag order
    pub fn iter(&self) -> impl Iterator<Item = &DataElement> {
        self.elements.values()
    }

    /// First textual value of `tag`. Absent and zero-length elements both
    /// yield `None`.
    pub fn string(&self, tag: Tag) -> Option<&str> {
        self.get(tag)
            .and_then(DataElement::first_str)
            .filter(|s| !s.is_empty())
    }

    /// All values of `tag` rendered as text, joined by `\`
    pub fn text(&self, tag: Tag) -> Option<String> {
        self.get(tag)
            .and_then(|e| e.value.to_text())
            .filter(|s| !s.is_empty())
    }

    pub fn u16(&self, tag: Tag) -> Option<u16> {
        match self.get(tag).map(|e| &e.value) {
            Some(Value::U16(v)) => v.first().copied(),
            _ => None,
        }
    }

    pub fn encode(&self, ts: TransferSyntax) -> Result<Vec<u8>> {
        encode(self, ts)
    }

    pub fn decode(bytes: &[u8], ts: TransferSyntax) -> Result<Self> {
        decode(bytes, ts)
    }
}

impl FromIterator<DataElement> for Dataset {
    fn from_iter<I: IntoIterator<Item = DataElement>>(iter: I) -> Self {
        let mut dataset = Dataset::new();
        for element in iter {
            dataset.put(element);
        }
        dataset
    }
}

/// Encode a data set in the given transfer syntax
pub fn encode(dataset: &Dataset, ts: TransferSyntax) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(256);
    for element in dataset.iter() {
        write_element(&mut out, element, ts)?;
    }
    Ok(out)
}

/// Decode a data set encoded in the given transfer syntax
pub fn decode(bytes: &[u8], ts: TransferSyntax) -> Result<Dataset> {
    let mut reader = Reader::new(bytes);
    read_dataset(&mut reader, ts, Charset::Default, false, 0)
}

/// Deepest sequence nesting accepted when decoding
pub const MAX_SEQUENCE_DEPTH: usize = 64;

const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);

/// Text encoding declared by Specific Character Set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Default,
    Latin1,
    Utf8,
}

impl Charset {
    fn from_value(value: &Value) -> Self {
        let term = match value {
            Value::Strs(terms) => terms.iter().map(|t| t.trim()).find(|t| !t.is_empty()),
            _ => None,
        };
        match term {
            None | Some("ISO_IR 6") | Some("ISO 2022 IR 6") => Charset::Default,
            Some("ISO_IR 100") | Some("ISO 2022 IR 100") => Charset::Latin1,
            Some("ISO_IR 192") => Charset::Utf8,
            Some(other) => {
                debug!("Character set {:?} is decoded as UTF-8", other);
                Charset::Utf8
            }
        }
    }

    fn decode<'a>(self, bytes: &'a [u8]) -> std::borrow::Cow<'a, str> {
        match self {
            Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect::<String>().into(),
            Charset::Default | Charset::Utf8 => String::from_utf8_lossy(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text { multi: bool },
    U16,
    U32,
    I16,
    I32,
    F32,
    F64,
    Tag,
    Bytes,
    Sequence,
}

fn value_kind(vr: VR) -> ValueKind {
    match vr {
        VR::AE
        | VR::AS
        | VR::CS
        | VR::DA
        | VR::DS
        | VR::DT
        | VR::IS
        | VR::LO
        | VR::PN
        | VR::SH
        | VR::TM
        | VR::UC
        | VR::UI => ValueKind::Text { multi: true },
        VR::LT | VR::ST | VR::UT | VR::UR => ValueKind::Text { multi: false },
        VR::US => ValueKind::U16,
        VR::UL => ValueKind::U32,
        VR::SS => ValueKind::I16,
        VR::SL => ValueKind::I32,
        VR::FL => ValueKind::F32,
        VR::FD => ValueKind::F64,
        VR::AT => ValueKind::Tag,
        VR::SQ => ValueKind::Sequence,
        _ => ValueKind::Bytes,
    }
}

/// VRs encoded with a 2-byte reserved field and a 4-byte length under
/// explicit VR
fn has_long_length(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB
            | VR::OD
            | VR::OF
            | VR::OL
            | VR::OV
            | VR::OW
            | VR::SQ
            | VR::SV
            | VR::UC
            | VR::UN
            | VR::UR
            | VR::UT
            | VR::UV
    )
}

fn padding_byte(vr: VR) -> u8 {
    match value_kind(vr) {
        ValueKind::Text { .. } if vr != VR::UI => b' ',
        _ => 0,
    }
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) {
    out.extend_from_slice(&tag.group().to_le_bytes());
    out.extend_from_slice(&tag.element().to_le_bytes());
}

fn write_element(out: &mut Vec<u8>, element: &DataElement, ts: TransferSyntax) -> Result<()> {
    let value = encode_value(element, ts)?;
    let length = u32::try_from(value.len()).map_err(|_| {
        DimseError::malformed(format!("value of {} is too large to encode", element.tag))
    })?;

    write_tag(out, element.tag);
    if ts.is_explicit_vr() {
        out.extend_from_slice(&element.vr.to_bytes());
        if has_long_length(element.vr) {
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&length.to_le_bytes());
        } else {
            let short = u16::try_from(length).map_err(|_| {
                DimseError::malformed(format!(
                    "value of {} ({} bytes) exceeds the 16-bit length of VR {}",
                    element.tag,
                    length,
                    element.vr.to_string()
                ))
            })?;
            out.extend_from_slice(&short.to_le_bytes());
        }
    } else {
        out.extend_from_slice(&length.to_le_bytes());
    }
    out.extend_from_slice(&value);
    Ok(())
}

fn encode_value(element: &DataElement, ts: TransferSyntax) -> Result<Vec<u8>> {
    let mut bytes = match &element.value {
        Value::Empty => Vec::new(),
        Value::Strs(values) => values.join("\\").into_bytes(),
        Value::U16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Value::U32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Value::I16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Value::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Value::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Value::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Value::Tags(v) => {
            let mut out = Vec::with_capacity(v.len() * 4);
            for tag in v {
                write_tag(&mut out, *tag);
            }
            out
        }
        Value::Bytes(b) => b.clone(),
        Value::Sequence(items) => {
            let mut out = Vec::new();
            for item in items {
                let body = encode(item, ts)?;
                let length = u32::try_from(body.len())
                    .map_err(|_| DimseError::malformed("sequence item too large to encode"))?;
                write_tag(&mut out, ITEM);
                out.extend_from_slice(&length.to_le_bytes());
                out.extend_from_slice(&body);
            }
            out
        }
    };

    if bytes.len() % 2 != 0 {
        bytes.push(padding_byte(element.vr));
    }
    Ok(bytes)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DimseError::malformed(format!(
                "needed {} bytes at offset {} but only {} remain",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn tag(&mut self) -> Result<Tag> {
        let group = self.u16()?;
        let element = self.u16()?;
        Ok(Tag(group, element))
    }
}

fn read_dataset(
    reader: &mut Reader<'_>,
    ts: TransferSyntax,
    mut charset: Charset,
    in_item: bool,
    depth: usize,
) -> Result<Dataset> {
    let mut dataset = Dataset::new();

    while !reader.is_empty() {
        let tag = reader.tag()?;
        if tag == ITEM_DELIMITATION {
            reader.u32()?;
            if in_item {
                return Ok(dataset);
            }
            return Err(DimseError::malformed(
                "item delimiter outside of a sequence item",
            ));
        }
        if tag.group() == 0xFFFE {
            return Err(DimseError::malformed(format!(
                "unexpected delimiter {} after {} elements",
                tag,
                dataset.len()
            )));
        }

        let (mut vr, length) = read_header(reader, tag, ts)?;

        let value = if length == UNDEFINED_LENGTH {
            match vr {
                // UN with undefined length holds an implicit VR sequence
                VR::SQ => Value::Sequence(read_items(reader, ts, charset, true, depth + 1)?),
                VR::UN => {
                    vr = VR::SQ;
                    Value::Sequence(read_items(
                        reader,
                        TransferSyntax::ImplicitVrLittleEndian,
                        charset,
                        true,
                        depth + 1,
                    )?)
                }
                _ => {
                    return Err(DimseError::malformed(format!(
                        "element {} with VR {} has undefined length",
                        tag,
                        vr.to_string()
                    )))
                }
            }
        } else {
            let length = length as usize;
            if length > reader.remaining() {
                return Err(DimseError::malformed(format!(
                    "element {} declares {} bytes but only {} remain (after {} elements)",
                    tag,
                    length,
                    reader.remaining(),
                    dataset.len()
                )));
            }
            let bytes = reader.take(length)?;
            decode_value(tag, vr, bytes, ts, charset, depth)?
        };

        if tag == SPECIFIC_CHARACTER_SET {
            charset = Charset::from_value(&value);
        }
        dataset.put(DataElement::new(tag, vr, value));
    }

    if in_item {
        return Err(DimseError::malformed(
            "sequence item ended without an item delimiter",
        ));
    }
    Ok(dataset)
}

fn read_header(reader: &mut Reader<'_>, tag: Tag, ts: TransferSyntax) -> Result<(VR, u32)> {
    if !ts.is_explicit_vr() {
        let length = reader.u32()?;
        return Ok((dictionary::vr_of(tag), length));
    }

    let raw = reader.take(2)?;
    let vr = VR::from_binary([raw[0], raw[1]]).ok_or_else(|| {
        DimseError::malformed(format!(
            "element {} has unknown VR {:?}",
            tag,
            String::from_utf8_lossy(raw)
        ))
    })?;

    let length = if has_long_length(vr) {
        reader.take(2)?;
        reader.u32()?
    } else {
        u32::from(reader.u16()?)
    };
    Ok((vr, length))
}

fn read_items(
    reader: &mut Reader<'_>,
    ts: TransferSyntax,
    charset: Charset,
    undefined: bool,
    depth: usize,
) -> Result<Vec<Dataset>> {
    if depth > MAX_SEQUENCE_DEPTH {
        return Err(DimseError::malformed(format!(
            "sequence nesting exceeds {} levels",
            MAX_SEQUENCE_DEPTH
        )));
    }
    let mut items = Vec::new();
    loop {
        if !undefined && reader.is_empty() {
            break;
        }
        let tag = reader.tag()?;
        let length = reader.u32()?;
        if tag == SEQUENCE_DELIMITATION {
            if undefined {
                break;
            }
            return Err(DimseError::malformed(
                "sequence delimiter inside a defined-length sequence",
            ));
        }
        if tag != ITEM {
            return Err(DimseError::malformed(format!(
                "expected a sequence item, found {}",
                tag
            )));
        }

        let item = if length == UNDEFINED_LENGTH {
            read_dataset(reader, ts, charset, true, depth)?
        } else {
            let bytes = reader.take(length as usize)?;
            read_dataset(&mut Reader::new(bytes), ts, charset, false, depth)?
        };
        items.push(item);
    }
    Ok(items)
}

fn decode_value(
    tag: Tag,
    vr: VR,
    bytes: &[u8],
    ts: TransferSyntax,
    charset: Charset,
    depth: usize,
) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Empty);
    }

    fn fixed<const N: usize, T>(
        tag: Tag,
        bytes: &[u8],
        convert: impl Fn([u8; N]) -> T,
    ) -> Result<Vec<T>> {
        if bytes.len() % N != 0 {
            return Err(DimseError::malformed(format!(
                "element {} has length {} which is not a multiple of {}",
                tag,
                bytes.len(),
                N
            )));
        }
        Ok(bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                convert(raw)
            })
            .collect())
    }

    let value = match value_kind(vr) {
        ValueKind::Text { multi } => decode_text(charset.decode(bytes), multi),
        ValueKind::U16 => Value::U16(fixed(tag, bytes, u16::from_le_bytes)?),
        ValueKind::U32 => Value::U32(fixed(tag, bytes, u32::from_le_bytes)?),
        ValueKind::I16 => Value::I16(fixed(tag, bytes, i16::from_le_bytes)?),
        ValueKind::I32 => Value::I32(fixed(tag, bytes, i32::from_le_bytes)?),
        ValueKind::F32 => Value::F32(fixed(tag, bytes, f32::from_le_bytes)?),
        ValueKind::F64 => Value::F64(fixed(tag, bytes, f64::from_le_bytes)?),
        ValueKind::Tag => Value::Tags(fixed(tag, bytes, |b: [u8; 4]| {
            Tag(
                u16::from_le_bytes([b[0], b[1]]),
                u16::from_le_bytes([b[2], b[3]]),
            )
        })?),
        ValueKind::Bytes => Value::Bytes(bytes.to_vec()),
        ValueKind::Sequence => Value::Sequence(read_items(&mut Reader::new(bytes), ts, charset, false, depth + 1)?),
    };
    Ok(value)
}

fn decode_text(text: std::borrow::Cow<'_, str>, multi: bool) -> Value {
    let text = text.trim_end_matches(|c: char| c == ' ' || c == '\0');
    if text.is_empty() {
        return Value::Empty;
    }
    if multi {
        Value::Strs(
            text.split('\\')
                .map(|s| s.trim_end_matches(|c: char| c == ' ' || c == '\0').to_string())
                .collect(),
        )
    } else {
        Value::Strs(vec![text.to_string()])
    }
}
