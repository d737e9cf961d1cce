//! The recursive tag tree.
//!
//! A DM file is one tree of tagged nodes. Directories come in two flavors:
//! [`TagGroup`] (named, ordered children; duplicate names are legal) and
//! plain lists (anonymous, ordered children). Leaves are scalars, strings,
//! fixed-arity structs, or bulk arrays.
//!
//! Each decode builds a fresh tree and each encode consumes a caller-owned
//! one; nodes are never shared between calls.

use crate::error::{Error, Result};
use crate::types::TagType;
use num_complex::{Complex32, Complex64};
use smallvec::SmallVec;

/// Field layout of a struct value or struct-array.
///
/// Layouts are almost always two to four fields, hence the inline capacity.
pub type StructLayout = SmallVec<[TagType; 4]>;

/// A single primitive value tagged with its wire type.
///
/// The variant fixes the [`TagType`] exactly; the scalar side of the wire
/// registry is bijective (`Bool` is code 8, `U8` is octet code 10, `I8` is
/// char code 9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagScalar {
    /// Signed 8-bit ("char").
    I8(i8),
    /// Unsigned 8-bit ("octet").
    U8(u8),
    /// Signed 16-bit ("short").
    I16(i16),
    /// Unsigned 16-bit ("ushort").
    U16(u16),
    /// Signed 32-bit ("long").
    I32(i32),
    /// Unsigned 32-bit ("ulong").
    U32(u32),
    /// Signed 64-bit ("longlong").
    I64(i64),
    /// Unsigned 64-bit ("ulonglong").
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Boolean, one byte on the wire.
    Bool(bool),
}

impl TagScalar {
    /// The wire type of this value.
    pub const fn tag_type(&self) -> TagType {
        match self {
            Self::I8(_) => TagType::Char,
            Self::U8(_) => TagType::Octet,
            Self::I16(_) => TagType::Short,
            Self::U16(_) => TagType::UShort,
            Self::I32(_) => TagType::Long,
            Self::U32(_) => TagType::ULong,
            Self::I64(_) => TagType::LongLong,
            Self::U64(_) => TagType::ULongLong,
            Self::F32(_) => TagType::Float,
            Self::F64(_) => TagType::Double,
            Self::Bool(_) => TagType::Boolean,
        }
    }

    /// Encoded width in bytes.
    pub const fn byte_size(&self) -> usize {
        match self.tag_type().byte_size() {
            Some(n) => n,
            // Scalar variants always carry scalar wire types.
            None => unreachable!(),
        }
    }

    /// Numeric value as f64. Booleans map to 0.0 / 1.0. Conversion from
    /// 64-bit integers may round.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::I8(v) => v as f64,
            Self::U8(v) => v as f64,
            Self::I16(v) => v as f64,
            Self::U16(v) => v as f64,
            Self::I32(v) => v as f64,
            Self::U32(v) => v as f64,
            Self::I64(v) => v as f64,
            Self::U64(v) => v as f64,
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
            Self::Bool(v) => v as u8 as f64,
        }
    }

    /// Integer value, if this scalar is an integer or boolean that fits
    /// in i64.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v as i64),
            Self::U8(v) => Some(v as i64),
            Self::I16(v) => Some(v as i64),
            Self::U16(v) => Some(v as i64),
            Self::I32(v) => Some(v as i64),
            Self::U32(v) => Some(v as i64),
            Self::I64(v) => Some(v),
            Self::U64(v) => i64::try_from(v).ok(),
            Self::Bool(v) => Some(v as i64),
            Self::F32(_) | Self::F64(_) => None,
        }
    }
}

/// Fixed-arity tuple of heterogeneous scalar fields.
///
/// Field order is part of the struct's identity and is preserved through
/// encode/decode.
#[derive(Debug, Clone, PartialEq)]
pub struct TagStruct {
    fields: Vec<TagScalar>,
}

impl TagStruct {
    /// Creates a struct value from its ordered fields.
    pub fn new(fields: Vec<TagScalar>) -> Self {
        Self { fields }
    }

    /// Ordered fields.
    pub fn fields(&self) -> &[TagScalar] {
        &self.fields
    }

    /// Field type layout, in field order.
    pub fn layout(&self) -> StructLayout {
        self.fields.iter().map(TagScalar::tag_type).collect()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether this struct has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Bulk array whose elements are fixed-layout structs.
///
/// The payload is a flat concatenation of per-struct field bytes, kept in
/// canonical little-endian order regardless of the stream it came from.
/// Element access partitions the buffer by the fixed per-struct stride;
/// there is no unchecked reinterpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    layout: StructLayout,
    data: Vec<u8>,
}

impl StructArray {
    /// Creates a struct-array from a field layout and flat little-endian
    /// field bytes.
    ///
    /// Fails if the layout contains a non-scalar type or the byte length is
    /// not a multiple of the layout stride.
    pub fn new(layout: StructLayout, data: Vec<u8>) -> Result<Self> {
        let mut stride = 0usize;
        for field in &layout {
            stride += field.byte_size().ok_or_else(|| {
                Error::UnsupportedType(format!("struct field type {field} is not a scalar"))
            })?;
        }
        if stride == 0 {
            if !data.is_empty() {
                return Err(Error::Consistency(
                    "empty struct layout with non-empty data".into(),
                ));
            }
        } else if data.len() % stride != 0 {
            return Err(Error::Consistency(format!(
                "struct-array byte length {} is not a multiple of stride {stride}",
                data.len()
            )));
        }
        Ok(Self { layout, data })
    }

    /// Field type layout shared by every element.
    pub fn layout(&self) -> &[TagType] {
        &self.layout
    }

    /// Bytes per element (sum of field widths).
    pub fn stride(&self) -> usize {
        self.layout
            .iter()
            .map(|t| t.byte_size().unwrap_or(0))
            .sum()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        let stride = self.stride();
        if stride == 0 { 0 } else { self.data.len() / stride }
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat little-endian field bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Interprets the elements as complex64 samples.
    ///
    /// Only a layout of exactly two f32 fields qualifies; any other layout
    /// is a legitimate generic struct-array and returns `None`.
    pub fn as_complex64(&self) -> Option<Vec<Complex32>> {
        if self.layout.as_slice() != [TagType::Float, TagType::Float] {
            return None;
        }
        Some(
            self.data
                .chunks_exact(8)
                .map(|c| {
                    let re = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                    let im = f32::from_le_bytes([c[4], c[5], c[6], c[7]]);
                    Complex32::new(re, im)
                })
                .collect(),
        )
    }

    /// Interprets the elements as complex128 samples (two f64 fields only).
    pub fn as_complex128(&self) -> Option<Vec<Complex64>> {
        if self.layout.as_slice() != [TagType::Double, TagType::Double] {
            return None;
        }
        Some(
            self.data
                .chunks_exact(16)
                .map(|c| {
                    let mut re = [0u8; 8];
                    let mut im = [0u8; 8];
                    re.copy_from_slice(&c[..8]);
                    im.copy_from_slice(&c[8..]);
                    Complex64::new(f64::from_le_bytes(re), f64::from_le_bytes(im))
                })
                .collect(),
        )
    }

    /// Packs complex64 samples as a two-f32-field struct-array.
    pub fn from_complex64(values: &[Complex32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for z in values {
            data.extend_from_slice(&z.re.to_le_bytes());
            data.extend_from_slice(&z.im.to_le_bytes());
        }
        Self {
            layout: [TagType::Float, TagType::Float].into_iter().collect(),
            data,
        }
    }

    /// Packs complex128 samples as a two-f64-field struct-array.
    pub fn from_complex128(values: &[Complex64]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 16);
        for z in values {
            data.extend_from_slice(&z.re.to_le_bytes());
            data.extend_from_slice(&z.im.to_le_bytes());
        }
        Self {
            layout: [TagType::Double, TagType::Double].into_iter().collect(),
            data,
        }
    }
}

/// Homogeneous bulk sequence.
///
/// Scalar-element arrays are typed native vectors (decoded with a single
/// bulk buffer copy); struct-element arrays keep their flat byte payload in
/// a [`StructArray`]. Boolean arrays keep their raw one-byte encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum TagArray {
    /// Signed 8-bit elements.
    I8(Vec<i8>),
    /// Unsigned 8-bit elements.
    U8(Vec<u8>),
    /// Signed 16-bit elements.
    I16(Vec<i16>),
    /// Unsigned 16-bit elements.
    U16(Vec<u16>),
    /// Signed 32-bit elements.
    I32(Vec<i32>),
    /// Unsigned 32-bit elements.
    U32(Vec<u32>),
    /// Signed 64-bit elements.
    I64(Vec<i64>),
    /// Unsigned 64-bit elements.
    U64(Vec<u64>),
    /// 32-bit float elements.
    F32(Vec<f32>),
    /// 64-bit float elements.
    F64(Vec<f64>),
    /// Boolean elements, one raw byte each.
    Bool(Vec<u8>),
    /// Struct-typed elements sharing one field layout.
    Structs(StructArray),
}

impl TagArray {
    /// Wire element type ([`TagType::Struct`] for struct-arrays).
    pub const fn elem_type(&self) -> TagType {
        match self {
            Self::I8(_) => TagType::Char,
            Self::U8(_) => TagType::Octet,
            Self::I16(_) => TagType::Short,
            Self::U16(_) => TagType::UShort,
            Self::I32(_) => TagType::Long,
            Self::U32(_) => TagType::ULong,
            Self::I64(_) => TagType::LongLong,
            Self::U64(_) => TagType::ULongLong,
            Self::F32(_) => TagType::Float,
            Self::F64(_) => TagType::Double,
            Self::Bool(_) => TagType::Boolean,
            Self::Structs(_) => TagType::Struct,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Structs(v) => v.len(),
        }
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per element (stride for struct-arrays).
    pub fn elem_size(&self) -> usize {
        match self {
            Self::Structs(v) => v.stride(),
            other => other.elem_type().byte_size().unwrap_or(0),
        }
    }
}

/// Named, ordered directory of child nodes.
///
/// Names need not be unique across siblings; insertion order is preserved
/// so a decoded tree rewrites faithfully. Lookup returns the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagGroup {
    entries: Vec<(String, TagNode)>,
}

impl TagGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named child, preserving order.
    pub fn insert(&mut self, name: impl Into<String>, node: impl Into<TagNode>) {
        self.entries.push((name.into(), node.into()));
    }

    /// First child with the given name.
    pub fn get(&self, name: &str) -> Option<&TagNode> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    /// Ordered name/child pairs.
    pub fn entries(&self) -> &[(String, TagNode)] {
        &self.entries
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the group has no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, TagNode)> for TagGroup {
    fn from_iter<I: IntoIterator<Item = (String, TagNode)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One node of the tag tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TagNode {
    /// Named, ordered children.
    Group(TagGroup),
    /// Anonymous, ordered children.
    List(Vec<TagNode>),
    /// Single primitive value.
    Scalar(TagScalar),
    /// UTF-16 encoded string.
    String(String),
    /// Fixed-arity tuple of scalars.
    Struct(TagStruct),
    /// Homogeneous bulk sequence.
    Array(TagArray),
}

impl TagNode {
    /// Group view, if this node is a group.
    pub fn as_group(&self) -> Option<&TagGroup> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    /// List view, if this node is a list.
    pub fn as_list(&self) -> Option<&[TagNode]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Scalar view, if this node is a scalar.
    pub fn as_scalar(&self) -> Option<&TagScalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// String view, if this node is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array view, if this node is an array.
    pub fn as_array(&self) -> Option<&TagArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Numeric scalar value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().map(TagScalar::as_f64)
    }

    /// Integer scalar value.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(TagScalar::as_i64)
    }
}

impl From<TagGroup> for TagNode {
    fn from(g: TagGroup) -> Self {
        Self::Group(g)
    }
}

impl From<TagScalar> for TagNode {
    fn from(s: TagScalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<TagStruct> for TagNode {
    fn from(s: TagStruct) -> Self {
        Self::Struct(s)
    }
}

impl From<TagArray> for TagNode {
    fn from(a: TagArray) -> Self {
        Self::Array(a)
    }
}

impl From<i32> for TagNode {
    fn from(v: i32) -> Self {
        Self::Scalar(TagScalar::I32(v))
    }
}

impl From<f64> for TagNode {
    fn from(v: f64) -> Self {
        Self::Scalar(TagScalar::F64(v))
    }
}

impl From<bool> for TagNode {
    fn from(v: bool) -> Self {
        Self::Scalar(TagScalar::Bool(v))
    }
}

impl From<&str> for TagNode {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for TagNode {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
