//! Primitive stream codec.
//!
//! DM files mix two byte orders: all *framing* (version, counts, name
//! lengths, tag definitions) is big-endian, while the tag *data* (scalars,
//! struct fields, array elements) follows a byte-order flag established
//! once in the file header. [`TagReader`] and [`TagWriter`] thread that
//! flag explicitly; there is no global state.
//!
//! Bulk array payloads are transcoded with single buffer copies via
//! `byteorder`'s slice operations rather than per-element dispatch, which
//! is what keeps multi-megapixel images interactive.

use crate::error::{DmError, DmResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use dm_core::{StructArray, StructLayout, TagArray, TagScalar, TagType};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Byte order of tag data within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Little-endian data. The common case for DM files.
    #[default]
    Little,
    /// Big-endian data.
    Big,
}

/// File framing version, selected by the leading version field.
///
/// Version 3 (`.dm3`) uses 32-bit length and count fields; version 4
/// (`.dm4`) widens them to 64 bits and adds a per-entry byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DmVersion {
    /// Version-3 framing, 32-bit size fields.
    #[default]
    V3,
    /// Version-4 framing, 64-bit size fields.
    V4,
}

impl DmVersion {
    /// Width in bytes of a size/count field under this framing.
    pub const fn size_width(&self) -> u64 {
        match self {
            Self::V3 => 4,
            Self::V4 => 8,
        }
    }

    /// The value of the leading version field.
    pub const fn number(&self) -> u32 {
        match self {
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }
}

fn map_read_err(e: io::Error, what: &str) -> DmError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DmError::TruncatedData(format!("stream ended while reading {what}"))
    } else {
        DmError::Io(e)
    }
}

// === Reader ===

/// Stream reader carrying the byte-order flag and framing version.
pub(crate) struct TagReader<R> {
    inner: R,
    len: u64,
    /// Data byte order, set from the header.
    pub endian: Endianness,
    /// Framing version, set from the header.
    pub version: DmVersion,
}

impl<R: Read + Seek> TagReader<R> {
    /// Wraps a stream, recording its total length for sanity checks.
    pub fn new(mut inner: R) -> DmResult<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self {
            inner,
            len,
            endian: Endianness::default(),
            version: DmVersion::default(),
        })
    }

    /// Bytes left between the cursor and the end of the stream.
    pub fn remaining(&mut self) -> DmResult<u64> {
        Ok(self.len.saturating_sub(self.inner.stream_position()?))
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> DmResult<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| map_read_err(e, what))
    }

    // --- framing reads (always big-endian) ---

    pub fn read_u8(&mut self, what: &str) -> DmResult<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf, what)?;
        Ok(buf[0])
    }

    pub fn read_u16_be(&mut self, what: &str) -> DmResult<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf, what)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32_be(&mut self, what: &str) -> DmResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, what)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64_be(&mut self, what: &str) -> DmResult<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, what)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Fixed-length marker bytes (the data block magic).
    pub fn read_magic(&mut self, buf: &mut [u8; 4]) -> DmResult<()> {
        self.fill(buf, "data block magic")
    }

    /// Size/count field, 4 or 8 bytes per the framing version.
    pub fn read_size(&mut self, what: &str) -> DmResult<u64> {
        match self.version {
            DmVersion::V3 => Ok(self.read_u32_be(what)? as u64),
            DmVersion::V4 => self.read_u64_be(what),
        }
    }

    /// Length-prefixed UTF-8 tag name.
    pub fn read_name(&mut self) -> DmResult<String> {
        let len = self.read_u16_be("tag name length")? as usize;
        let mut buf = vec![0u8; len];
        self.fill(&mut buf, "tag name")?;
        // Vendor files occasionally carry latin-1 names; keep them readable
        // rather than failing the whole decode.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    // --- data reads (stream byte order) ---

    fn read_data_u16(&mut self, what: &str) -> DmResult<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf, what)?;
        Ok(match self.endian {
            Endianness::Little => u16::from_le_bytes(buf),
            Endianness::Big => u16::from_be_bytes(buf),
        })
    }

    fn read_data_u32(&mut self, what: &str) -> DmResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, what)?;
        Ok(match self.endian {
            Endianness::Little => u32::from_le_bytes(buf),
            Endianness::Big => u32::from_be_bytes(buf),
        })
    }

    fn read_data_u64(&mut self, what: &str) -> DmResult<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, what)?;
        Ok(match self.endian {
            Endianness::Little => u64::from_le_bytes(buf),
            Endianness::Big => u64::from_be_bytes(buf),
        })
    }

    /// One primitive value of the given scalar type.
    pub fn read_scalar(&mut self, t: TagType) -> DmResult<TagScalar> {
        Ok(match t {
            TagType::Char => TagScalar::I8(self.read_u8("char value")? as i8),
            TagType::Octet => TagScalar::U8(self.read_u8("octet value")?),
            TagType::Boolean => TagScalar::Bool(self.read_u8("boolean value")? != 0),
            TagType::Short => TagScalar::I16(self.read_data_u16("short value")? as i16),
            TagType::UShort => TagScalar::U16(self.read_data_u16("ushort value")?),
            TagType::Long => TagScalar::I32(self.read_data_u32("long value")? as i32),
            TagType::ULong => TagScalar::U32(self.read_data_u32("ulong value")?),
            TagType::LongLong => TagScalar::I64(self.read_data_u64("longlong value")? as i64),
            TagType::ULongLong => TagScalar::U64(self.read_data_u64("ulonglong value")?),
            TagType::Float => TagScalar::F32(f32::from_bits(self.read_data_u32("float value")?)),
            TagType::Double => TagScalar::F64(f64::from_bits(self.read_data_u64("double value")?)),
            other => {
                return Err(DmError::MalformedTag(format!(
                    "{other} is not a scalar type"
                )));
            }
        })
    }

    fn read_bulk(&mut self, count: usize, width: usize, what: &str) -> DmResult<Vec<u8>> {
        let bytes = count.checked_mul(width).ok_or_else(|| {
            DmError::MalformedTag(format!("{what} byte length overflows"))
        })?;
        let mut buf = vec![0u8; bytes];
        self.fill(&mut buf, what)?;
        Ok(buf)
    }

    /// A run of u16 code units in stream byte order.
    pub fn read_utf16_units(&mut self, count: usize) -> DmResult<Vec<u16>> {
        let raw = self.read_bulk(count, 2, "utf-16 code units")?;
        let mut units = vec![0u16; count];
        match self.endian {
            Endianness::Little => LittleEndian::read_u16_into(&raw, &mut units),
            Endianness::Big => BigEndian::read_u16_into(&raw, &mut units),
        }
        Ok(units)
    }

    /// Bulk-decodes a scalar-element array: one contiguous byte read, then
    /// a single endian-aware pass into the typed vector.
    pub fn read_scalar_array(&mut self, elem: TagType, count: usize) -> DmResult<TagArray> {
        let width = elem.byte_size().ok_or_else(|| {
            DmError::MalformedTag(format!("{elem} is not a scalar array element type"))
        })?;
        let raw = self.read_bulk(count, width, "array data")?;
        Ok(match elem {
            TagType::Char => TagArray::I8(raw.iter().map(|&b| b as i8).collect()),
            TagType::Octet => TagArray::U8(raw),
            TagType::Boolean => TagArray::Bool(raw),
            TagType::Short => {
                let mut v = vec![0i16; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_i16_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_i16_into(&raw, &mut v),
                }
                TagArray::I16(v)
            }
            TagType::UShort => {
                let mut v = vec![0u16; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_u16_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_u16_into(&raw, &mut v),
                }
                TagArray::U16(v)
            }
            TagType::Long => {
                let mut v = vec![0i32; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_i32_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_i32_into(&raw, &mut v),
                }
                TagArray::I32(v)
            }
            TagType::ULong => {
                let mut v = vec![0u32; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_u32_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_u32_into(&raw, &mut v),
                }
                TagArray::U32(v)
            }
            TagType::LongLong => {
                let mut v = vec![0i64; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_i64_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_i64_into(&raw, &mut v),
                }
                TagArray::I64(v)
            }
            TagType::ULongLong => {
                let mut v = vec![0u64; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_u64_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_u64_into(&raw, &mut v),
                }
                TagArray::U64(v)
            }
            TagType::Float => {
                let mut v = vec![0f32; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_f32_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_f32_into(&raw, &mut v),
                }
                TagArray::F32(v)
            }
            TagType::Double => {
                let mut v = vec![0f64; count];
                match self.endian {
                    Endianness::Little => LittleEndian::read_f64_into(&raw, &mut v),
                    Endianness::Big => BigEndian::read_f64_into(&raw, &mut v),
                }
                TagArray::F64(v)
            }
            // width lookup above already rejected compound types
            _ => unreachable!(),
        })
    }

    /// Ordered struct fields, one scalar per layout entry.
    pub fn read_struct_fields(&mut self, layout: &[TagType]) -> DmResult<Vec<TagScalar>> {
        layout.iter().map(|&t| self.read_scalar(t)).collect()
    }

    /// Bulk-decodes a struct-element array: the payload is a flat
    /// concatenation of per-struct field bytes with a fixed stride.
    /// Big-endian payloads are normalized field-by-field to the canonical
    /// little-endian representation [`StructArray`] keeps.
    pub fn read_struct_array(&mut self, layout: StructLayout, count: usize) -> DmResult<StructArray> {
        let stride: usize = layout
            .iter()
            .map(|t| t.byte_size().unwrap_or(0))
            .sum();
        let mut raw = self.read_bulk(count, stride, "struct-array data")?;
        if self.endian == Endianness::Big {
            let mut base = 0usize;
            for _ in 0..count {
                let mut offset = base;
                for field in &layout {
                    let width = field.byte_size().unwrap_or(0);
                    raw[offset..offset + width].reverse();
                    offset += width;
                }
                base += stride;
            }
        }
        Ok(StructArray::new(layout, raw)?)
    }
}

// === Writer ===

/// Stream writer carrying the byte-order flag and framing version.
pub(crate) struct TagWriter<W> {
    inner: W,
    /// Data byte order to emit.
    pub endian: Endianness,
    /// Framing version to emit.
    pub version: DmVersion,
}

impl<W: Write> TagWriter<W> {
    pub fn new(inner: W, version: DmVersion, endian: Endianness) -> Self {
        Self {
            inner,
            endian,
            version,
        }
    }

    fn put(&mut self, bytes: &[u8]) -> DmResult<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    // --- framing writes (always big-endian) ---

    pub fn write_u8(&mut self, v: u8) -> DmResult<()> {
        self.put(&[v])
    }

    pub fn write_u16_be(&mut self, v: u16) -> DmResult<()> {
        self.put(&v.to_be_bytes())
    }

    pub fn write_u32_be(&mut self, v: u32) -> DmResult<()> {
        self.put(&v.to_be_bytes())
    }

    pub fn write_u64_be(&mut self, v: u64) -> DmResult<()> {
        self.put(&v.to_be_bytes())
    }

    /// Fixed-length marker bytes (the data block magic).
    pub fn write_magic(&mut self, bytes: &[u8; 4]) -> DmResult<()> {
        self.put(bytes)
    }

    /// Size/count field, 4 or 8 bytes per the framing version.
    pub fn write_size(&mut self, v: u64) -> DmResult<()> {
        match self.version {
            DmVersion::V3 => {
                let narrow = u32::try_from(v).map_err(|_| {
                    DmError::Consistency(format!("size {v} does not fit version-3 framing"))
                })?;
                self.write_u32_be(narrow)
            }
            DmVersion::V4 => self.write_u64_be(v),
        }
    }

    /// Length-prefixed UTF-8 tag name.
    pub fn write_name(&mut self, name: &str) -> DmResult<()> {
        let len = u16::try_from(name.len()).map_err(|_| {
            DmError::Consistency(format!("tag name of {} bytes is too long", name.len()))
        })?;
        self.write_u16_be(len)?;
        self.put(name.as_bytes())
    }

    // --- data writes (stream byte order) ---

    fn write_data_u16(&mut self, v: u16) -> DmResult<()> {
        match self.endian {
            Endianness::Little => self.put(&v.to_le_bytes()),
            Endianness::Big => self.put(&v.to_be_bytes()),
        }
    }

    fn write_data_u32(&mut self, v: u32) -> DmResult<()> {
        match self.endian {
            Endianness::Little => self.put(&v.to_le_bytes()),
            Endianness::Big => self.put(&v.to_be_bytes()),
        }
    }

    fn write_data_u64(&mut self, v: u64) -> DmResult<()> {
        match self.endian {
            Endianness::Little => self.put(&v.to_le_bytes()),
            Endianness::Big => self.put(&v.to_be_bytes()),
        }
    }

    /// One primitive value in stream byte order.
    pub fn write_scalar(&mut self, s: &TagScalar) -> DmResult<()> {
        match *s {
            TagScalar::I8(v) => self.write_u8(v as u8),
            TagScalar::U8(v) => self.write_u8(v),
            TagScalar::Bool(v) => self.write_u8(v as u8),
            TagScalar::I16(v) => self.write_data_u16(v as u16),
            TagScalar::U16(v) => self.write_data_u16(v),
            TagScalar::I32(v) => self.write_data_u32(v as u32),
            TagScalar::U32(v) => self.write_data_u32(v),
            TagScalar::I64(v) => self.write_data_u64(v as u64),
            TagScalar::U64(v) => self.write_data_u64(v),
            TagScalar::F32(v) => self.write_data_u32(v.to_bits()),
            TagScalar::F64(v) => self.write_data_u64(v.to_bits()),
        }
    }

    /// A run of u16 code units in stream byte order.
    pub fn write_utf16_units(&mut self, units: &[u16]) -> DmResult<()> {
        let mut raw = vec![0u8; units.len() * 2];
        match self.endian {
            Endianness::Little => LittleEndian::write_u16_into(units, &mut raw),
            Endianness::Big => BigEndian::write_u16_into(units, &mut raw),
        }
        self.put(&raw)
    }

    /// Bulk-encodes a scalar-element array payload with a single buffer
    /// pass. Struct-element arrays go through [`Self::write_struct_array`].
    pub fn write_scalar_array(&mut self, array: &TagArray) -> DmResult<()> {
        match array {
            TagArray::I8(v) => {
                let raw: Vec<u8> = v.iter().map(|&b| b as u8).collect();
                self.put(&raw)
            }
            TagArray::U8(v) => self.put(v),
            TagArray::Bool(v) => self.put(v),
            TagArray::I16(v) => {
                let mut raw = vec![0u8; v.len() * 2];
                match self.endian {
                    Endianness::Little => LittleEndian::write_i16_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_i16_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::U16(v) => {
                let mut raw = vec![0u8; v.len() * 2];
                match self.endian {
                    Endianness::Little => LittleEndian::write_u16_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_u16_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::I32(v) => {
                let mut raw = vec![0u8; v.len() * 4];
                match self.endian {
                    Endianness::Little => LittleEndian::write_i32_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_i32_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::U32(v) => {
                let mut raw = vec![0u8; v.len() * 4];
                match self.endian {
                    Endianness::Little => LittleEndian::write_u32_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_u32_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::I64(v) => {
                let mut raw = vec![0u8; v.len() * 8];
                match self.endian {
                    Endianness::Little => LittleEndian::write_i64_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_i64_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::U64(v) => {
                let mut raw = vec![0u8; v.len() * 8];
                match self.endian {
                    Endianness::Little => LittleEndian::write_u64_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_u64_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::F32(v) => {
                let mut raw = vec![0u8; v.len() * 4];
                match self.endian {
                    Endianness::Little => LittleEndian::write_f32_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_f32_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::F64(v) => {
                let mut raw = vec![0u8; v.len() * 8];
                match self.endian {
                    Endianness::Little => LittleEndian::write_f64_into(v, &mut raw),
                    Endianness::Big => BigEndian::write_f64_into(v, &mut raw),
                }
                self.put(&raw)
            }
            TagArray::Structs(_) => Err(DmError::MalformedTag(
                "struct-arrays take the struct-array path".into(),
            )),
        }
    }

    /// Bulk-encodes a struct-element array payload, swapping the canonical
    /// little-endian field bytes when the stream is big-endian.
    pub fn write_struct_array(&mut self, array: &StructArray) -> DmResult<()> {
        if self.endian == Endianness::Little {
            return self.put(array.data());
        }
        let mut raw = array.data().to_vec();
        let stride = array.stride();
        let mut base = 0usize;
        while base < raw.len() {
            let mut offset = base;
            for field in array.layout() {
                let width = field.byte_size().unwrap_or(0);
                raw[offset..offset + width].reverse();
                offset += width;
            }
            base += stride;
        }
        self.put(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip_scalar(value: TagScalar, endian: Endianness) -> TagScalar {
        let mut buf = Vec::new();
        let mut w = TagWriter::new(&mut buf, DmVersion::V3, endian);
        w.write_scalar(&value).unwrap();
        let mut r = TagReader::new(Cursor::new(buf)).unwrap();
        r.endian = endian;
        r.read_scalar(value.tag_type()).unwrap()
    }

    #[test]
    fn test_scalar_round_trips() {
        let values = [
            TagScalar::I8(-128),
            TagScalar::U8(255),
            TagScalar::I16(-30000),
            TagScalar::U16(65535),
            TagScalar::I32(45),
            TagScalar::U32(1 << 30),
            TagScalar::I64(i64::MIN),
            TagScalar::U64(u64::MAX),
            TagScalar::F32(-0.0),
            TagScalar::F32(f32::MAX),
            TagScalar::F64(34.56),
            TagScalar::F64(f64::MIN_POSITIVE),
            TagScalar::Bool(true),
            TagScalar::Bool(false),
        ];
        for v in values {
            assert_eq!(round_trip_scalar(v, Endianness::Little), v);
            assert_eq!(round_trip_scalar(v, Endianness::Big), v);
        }
    }

    #[test]
    fn test_zero_round_trips() {
        for v in [
            TagScalar::I16(0),
            TagScalar::U32(0),
            TagScalar::F32(0.0),
            TagScalar::F64(0.0),
        ] {
            assert_eq!(round_trip_scalar(v, Endianness::Little), v);
        }
    }

    #[test]
    fn test_scalar_array_round_trip_both_orders() {
        let array = TagArray::I32(vec![-1, 0, 1, i32::MAX, i32::MIN]);
        for endian in [Endianness::Little, Endianness::Big] {
            let mut buf = Vec::new();
            let mut w = TagWriter::new(&mut buf, DmVersion::V3, endian);
            w.write_scalar_array(&array).unwrap();
            let mut r = TagReader::new(Cursor::new(buf)).unwrap();
            r.endian = endian;
            assert_eq!(r.read_scalar_array(TagType::Long, 5).unwrap(), array);
        }
    }

    #[test]
    fn test_struct_array_big_endian_normalization() {
        let layout: StructLayout = [TagType::Float, TagType::Float].into_iter().collect();
        let source = StructArray::new(
            layout.clone(),
            [1.0f32, -2.0, 0.25, 8.5]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        )
        .unwrap();

        let mut buf = Vec::new();
        let mut w = TagWriter::new(&mut buf, DmVersion::V3, Endianness::Big);
        w.write_struct_array(&source).unwrap();
        let mut r = TagReader::new(Cursor::new(buf)).unwrap();
        r.endian = Endianness::Big;
        let back = r.read_struct_array(layout, 2).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_utf16_units_round_trip() {
        let text = "µm six";
        let units: Vec<u16> = text.encode_utf16().collect();
        let mut buf = Vec::new();
        let mut w = TagWriter::new(&mut buf, DmVersion::V3, Endianness::Little);
        w.write_utf16_units(&units).unwrap();
        let mut r = TagReader::new(Cursor::new(buf)).unwrap();
        let back = r.read_utf16_units(units.len()).unwrap();
        assert_eq!(String::from_utf16(&back).unwrap(), text);
    }

    #[test]
    fn test_truncated_scalar_is_truncated_data() {
        let mut r = TagReader::new(Cursor::new(vec![0u8; 3])).unwrap();
        match r.read_scalar(TagType::Double) {
            Err(DmError::TruncatedData(_)) => {}
            other => panic!("expected TruncatedData, got {other:?}"),
        }
    }
}
