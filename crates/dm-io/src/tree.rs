//! Tag tree codec: the recursive directory/data layer between the file
//! header and the tag values.
//!
//! A directory body is a flavor byte (1 = named group, 0 = anonymous list),
//! a sorted/open byte that is written as zero and ignored on read, a child
//! count, then the entries. Each entry is a kind byte (20 = directory,
//! 21 = data), a length-prefixed name, under version-4 framing a byte length
//! for the rest of the entry, then the child body. A data body is the
//! `%%%%` magic, a definition (a counted list of size-integers describing
//! the value's type), then the payload in the stream's data byte order.
//!
//! Counts are validated against the bytes actually left in the stream
//! before any allocation, so a corrupt count fails cleanly instead of
//! attempting a huge buffer.

use crate::error::{DmError, DmResult};
use crate::stream::{DmVersion, Endianness, TagReader, TagWriter};
use dm_core::{StructLayout, TagArray, TagGroup, TagNode, TagStruct, TagType};
use std::io::{Read, Seek, Write};
use tracing::debug;

const ENTRY_DIR: u8 = 20;
const ENTRY_DATA: u8 = 21;
const DATA_MAGIC: [u8; 4] = *b"%%%%";

// === Decoding ===

/// Decodes a complete DM3/DM4 stream into its root tag node.
///
/// The header's declared root length is informational and not trusted; the
/// tree is parsed from the actual entry structure.
pub fn decode_root<R: Read + Seek>(inner: R) -> DmResult<TagNode> {
    let mut r = TagReader::new(inner)?;

    let version = r.read_u32_be("file version")?;
    r.version = match version {
        3 => DmVersion::V3,
        4 => DmVersion::V4,
        other => {
            return Err(DmError::MalformedTag(format!(
                "unknown file version {other}"
            )));
        }
    };
    let declared_len = r.read_size("root directory length")?;
    let order = r.read_u32_be("byte-order flag")?;
    r.endian = match order {
        0 => Endianness::Big,
        1 => Endianness::Little,
        other => {
            return Err(DmError::MalformedTag(format!(
                "invalid byte-order flag {other}"
            )));
        }
    };
    debug!(
        version,
        declared_len,
        little_endian = (r.endian == Endianness::Little),
        "decoding tag tree"
    );

    read_dir_body(&mut r)
}

/// Rejects a count that cannot possibly be satisfied before anything is
/// allocated for it. A count with the sign bit set is a corrupt negative
/// value; a positive count larger than the remaining stream is truncation.
fn checked_count<R: Read + Seek>(
    r: &mut TagReader<R>,
    count: u64,
    min_item_bytes: u64,
    what: &str,
) -> DmResult<usize> {
    if count > i64::MAX as u64 {
        return Err(DmError::MalformedTag(format!(
            "negative {what} {}",
            count as i64
        )));
    }
    let needed = count.checked_mul(min_item_bytes).ok_or_else(|| {
        DmError::MalformedTag(format!("{what} {count} overflows the stream size"))
    })?;
    if needed > r.remaining()? {
        return Err(DmError::TruncatedData(format!(
            "{what} {count} needs {needed} bytes but the stream has fewer left"
        )));
    }
    usize::try_from(count)
        .map_err(|_| DmError::MalformedTag(format!("{what} {count} exceeds address space")))
}

fn read_dir_body<R: Read + Seek>(r: &mut TagReader<R>) -> DmResult<TagNode> {
    let flavor = r.read_u8("directory flavor")?;
    if flavor > 1 {
        return Err(DmError::MalformedTag(format!(
            "invalid directory flavor byte {flavor}"
        )));
    }
    // Sorted/open flag; producers write 0 and readers ignore it.
    let _open = r.read_u8("directory open flag")?;

    // Every entry takes at least a kind byte plus a name length.
    let min_entry = 3 + if r.version == DmVersion::V4 { 8 } else { 0 };
    let count = r.read_size("directory child count")?;
    let count = checked_count(r, count, min_entry, "directory child count")?;

    if flavor == 1 {
        let mut group = TagGroup::new();
        for _ in 0..count {
            let (name, node) = read_entry(r)?;
            group.insert(name, node);
        }
        Ok(TagNode::Group(group))
    } else {
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            // Anonymous children; any stored name is dropped.
            let (_, node) = read_entry(r)?;
            children.push(node);
        }
        Ok(TagNode::List(children))
    }
}

fn read_entry<R: Read + Seek>(r: &mut TagReader<R>) -> DmResult<(String, TagNode)> {
    let kind = r.read_u8("entry kind")?;
    let name = r.read_name()?;
    if r.version == DmVersion::V4 {
        // Byte length of the rest of the entry. Written accurately but not
        // trusted on read; the body is parsed structurally.
        let _entry_len = r.read_u64_be("entry byte length")?;
    }
    let node = match kind {
        ENTRY_DIR => read_dir_body(r)?,
        ENTRY_DATA => read_data_block(r)?,
        other => {
            return Err(DmError::MalformedTag(format!(
                "invalid entry kind byte {other}"
            )));
        }
    };
    Ok((name, node))
}

fn read_data_block<R: Read + Seek>(r: &mut TagReader<R>) -> DmResult<TagNode> {
    let mut magic = [0u8; 4];
    r.read_magic(&mut magic)?;
    if magic != DATA_MAGIC {
        return Err(DmError::MalformedTag(format!(
            "bad data block magic {magic:02x?}"
        )));
    }

    let size_width = r.version.size_width();
    let def_count = r.read_size("definition length")?;
    let def_count = checked_count(r, def_count, size_width, "definition length")?;
    if def_count == 0 {
        return Err(DmError::MalformedTag("empty tag definition".into()));
    }
    let mut defs = Vec::with_capacity(def_count);
    for _ in 0..def_count {
        defs.push(r.read_size("definition entry")?);
    }

    let head = TagType::from_code(defs[0]).ok_or_else(|| {
        DmError::UnsupportedType(format!("unknown tag type code {}", defs[0]))
    })?;

    match head {
        TagType::String => read_string_value(r, &defs),
        TagType::Struct => {
            let layout = parse_struct_layout(&defs)?;
            let fields = r.read_struct_fields(&layout)?;
            Ok(TagNode::Struct(TagStruct::new(fields)))
        }
        TagType::Array => read_array_value(r, &defs),
        scalar => {
            if defs.len() != 1 {
                return Err(DmError::MalformedTag(format!(
                    "scalar definition with {} entries",
                    defs.len()
                )));
            }
            Ok(TagNode::Scalar(r.read_scalar(scalar)?))
        }
    }
}

fn read_string_value<R: Read + Seek>(r: &mut TagReader<R>, defs: &[u64]) -> DmResult<TagNode> {
    if defs.len() != 2 {
        return Err(DmError::MalformedTag(format!(
            "string definition with {} entries",
            defs.len()
        )));
    }
    let byte_len = defs[1];
    if byte_len % 2 != 0 {
        return Err(DmError::MalformedTag(format!(
            "odd string byte length {byte_len}"
        )));
    }
    let units = checked_count(r, byte_len / 2, 2, "string length")?;
    let units = r.read_utf16_units(units)?;
    let text = String::from_utf16(&units)
        .map_err(|_| DmError::MalformedTag("string value is not valid UTF-16".into()))?;
    Ok(TagNode::String(text))
}

/// Parses a struct definition `[15, name_len, n, (field_name_len, code) x n]`.
/// The name-length slots are always zero in practice and are ignored.
fn parse_struct_layout(defs: &[u64]) -> DmResult<StructLayout> {
    if defs.len() < 3 {
        return Err(DmError::MalformedTag(format!(
            "struct definition with {} entries",
            defs.len()
        )));
    }
    // Derive the field count from the definition length; a corrupt count
    // slot cannot then force an oversized expectation.
    let n = (defs.len() - 3) / 2;
    if (defs.len() - 3) % 2 != 0 || defs[2] != n as u64 {
        return Err(DmError::MalformedTag(format!(
            "struct definition of {} entries declares {} fields",
            defs.len(),
            defs[2]
        )));
    }
    let mut layout = StructLayout::new();
    for i in 0..n {
        let code = defs[4 + 2 * i];
        let field = TagType::from_code(code).ok_or_else(|| {
            DmError::UnsupportedType(format!("unknown struct field type code {code}"))
        })?;
        if !field.is_scalar() {
            return Err(DmError::MalformedTag(format!(
                "struct field type {field} is not a scalar"
            )));
        }
        layout.push(field);
    }
    Ok(layout)
}

fn read_array_value<R: Read + Seek>(r: &mut TagReader<R>, defs: &[u64]) -> DmResult<TagNode> {
    if defs.len() < 3 {
        return Err(DmError::MalformedTag(format!(
            "array definition with {} entries",
            defs.len()
        )));
    }
    let elem = TagType::from_code(defs[1]).ok_or_else(|| {
        DmError::UnsupportedType(format!("unknown array element type code {}", defs[1]))
    })?;

    if elem == TagType::Struct {
        // [20, 15, name_len, n, (field_name_len, code) x n, count]
        let layout = parse_struct_layout(&defs[1..defs.len() - 1])?;
        let stride: u64 = layout
            .iter()
            .map(|t| t.byte_size().unwrap_or(0) as u64)
            .sum();
        let count = checked_count(r, defs[defs.len() - 1], stride, "struct-array count")?;
        let array = r.read_struct_array(layout, count)?;
        return Ok(TagNode::Array(TagArray::Structs(array)));
    }

    // [20, code, count]
    if defs.len() != 3 {
        return Err(DmError::MalformedTag(format!(
            "scalar-array definition with {} entries",
            defs.len()
        )));
    }
    let width = elem.byte_size().ok_or_else(|| {
        DmError::UnsupportedType(format!("array element type {elem} is not supported"))
    })?;
    let count = checked_count(r, defs[2], width as u64, "array count")?;
    let array = r.read_scalar_array(elem, count)?;

    // Text is stored as arrays of unsigned shorts. Decode to a string when
    // the units form valid UTF-16; u16 measurement data with stray surrogate
    // values stays an array.
    if let TagArray::U16(units) = &array {
        if let Ok(text) = String::from_utf16(units) {
            return Ok(TagNode::String(text));
        }
    }
    Ok(TagNode::Array(array))
}

// === Encoding ===

/// Encodes a tag tree to a stream under the given framing version and data
/// byte order. The root must be a group or a list.
pub fn encode_root<W: Write>(
    inner: W,
    root: &TagNode,
    version: DmVersion,
    endian: Endianness,
) -> DmResult<()> {
    if !matches!(root, TagNode::Group(_) | TagNode::List(_)) {
        return Err(DmError::Consistency(
            "root node must be a group or a list".into(),
        ));
    }
    let mut w = TagWriter::new(inner, version, endian);
    w.write_u32_be(version.number())?;
    w.write_size(node_body_size(root, version)?)?;
    w.write_u32_be(match endian {
        Endianness::Little => 1,
        Endianness::Big => 0,
    })?;
    write_node_body(&mut w, root)
}

/// Encoded byte length of a node body (directory body or data block),
/// excluding the entry framing that precedes it. Mirrors the writer
/// exactly; version-4 per-entry lengths come from here.
fn node_body_size(node: &TagNode, version: DmVersion) -> DmResult<u64> {
    let sw = version.size_width();
    let entry_overhead = 1 + 2 + if version == DmVersion::V4 { 8 } else { 0 };
    Ok(match node {
        TagNode::Group(g) => {
            let mut total = 2 + sw;
            for (name, child) in g.entries() {
                total += entry_overhead + name.len() as u64 + node_body_size(child, version)?;
            }
            total
        }
        TagNode::List(children) => {
            let mut total = 2 + sw;
            for child in children {
                total += entry_overhead + node_body_size(child, version)?;
            }
            total
        }
        TagNode::Scalar(s) => 4 + sw * 2 + s.byte_size() as u64,
        TagNode::String(s) => {
            let units = s.encode_utf16().count() as u64;
            4 + sw * 4 + units * 2
        }
        TagNode::Struct(s) => {
            let payload: u64 = s.fields().iter().map(|f| f.byte_size() as u64).sum();
            4 + sw * (1 + 3 + 2 * s.len() as u64) + payload
        }
        TagNode::Array(TagArray::Structs(sa)) => {
            let fields = sa.layout().len() as u64;
            4 + sw * (1 + 5 + 2 * fields) + sa.data().len() as u64
        }
        TagNode::Array(a) => 4 + sw * 4 + (a.len() * a.elem_size()) as u64,
    })
}

fn write_node_body<W: Write>(w: &mut TagWriter<W>, node: &TagNode) -> DmResult<()> {
    match node {
        TagNode::Group(g) => {
            w.write_u8(1)?;
            w.write_u8(0)?;
            w.write_size(g.len() as u64)?;
            for (name, child) in g.entries() {
                write_entry(w, name, child)?;
            }
            Ok(())
        }
        TagNode::List(children) => {
            w.write_u8(0)?;
            w.write_u8(0)?;
            w.write_size(children.len() as u64)?;
            for child in children {
                write_entry(w, "", child)?;
            }
            Ok(())
        }
        data => write_data_block(w, data),
    }
}

fn write_entry<W: Write>(w: &mut TagWriter<W>, name: &str, node: &TagNode) -> DmResult<()> {
    let kind = match node {
        TagNode::Group(_) | TagNode::List(_) => ENTRY_DIR,
        _ => ENTRY_DATA,
    };
    w.write_u8(kind)?;
    w.write_name(name)?;
    if w.version == DmVersion::V4 {
        w.write_u64_be(node_body_size(node, w.version)?)?;
    }
    write_node_body(w, node)
}

fn write_data_block<W: Write>(w: &mut TagWriter<W>, node: &TagNode) -> DmResult<()> {
    w.write_magic(&DATA_MAGIC)?;
    match node {
        TagNode::Scalar(s) => {
            w.write_size(1)?;
            w.write_size(s.tag_type().code())?;
            w.write_scalar(s)
        }
        TagNode::String(s) => {
            // Strings go out as unsigned-short arrays, matching what DM
            // software itself produces. The reader converts them back.
            let units: Vec<u16> = s.encode_utf16().collect();
            w.write_size(3)?;
            w.write_size(TagType::Array.code())?;
            w.write_size(TagType::UShort.code())?;
            w.write_size(units.len() as u64)?;
            w.write_utf16_units(&units)
        }
        TagNode::Struct(s) => {
            w.write_size(3 + 2 * s.len() as u64)?;
            w.write_size(TagType::Struct.code())?;
            w.write_size(0)?;
            w.write_size(s.len() as u64)?;
            for field in s.fields() {
                w.write_size(0)?;
                w.write_size(field.tag_type().code())?;
            }
            for field in s.fields() {
                w.write_scalar(field)?;
            }
            Ok(())
        }
        TagNode::Array(TagArray::Structs(sa)) => {
            let fields = sa.layout().len() as u64;
            w.write_size(5 + 2 * fields)?;
            w.write_size(TagType::Array.code())?;
            w.write_size(TagType::Struct.code())?;
            w.write_size(0)?;
            w.write_size(fields)?;
            for field in sa.layout() {
                w.write_size(0)?;
                w.write_size(field.code())?;
            }
            w.write_size(sa.len() as u64)?;
            w.write_struct_array(sa)
        }
        TagNode::Array(a) => {
            w.write_size(3)?;
            w.write_size(TagType::Array.code())?;
            w.write_size(a.elem_type().code())?;
            w.write_size(a.len() as u64)?;
            w.write_scalar_array(a)
        }
        TagNode::Group(_) | TagNode::List(_) => Err(DmError::Consistency(
            "directory node in a data block position".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_core::{Complex32, StructArray, TagScalar};
    use std::io::Cursor;

    fn round_trip(root: &TagNode, version: DmVersion, endian: Endianness) -> TagNode {
        let mut buf = Vec::new();
        encode_root(&mut buf, root, version, endian).unwrap();
        decode_root(Cursor::new(buf)).unwrap()
    }

    fn sample_tree() -> TagNode {
        let mut data = TagGroup::new();
        data.insert("Counts", TagScalar::U32(12345));
        data.insert("Exposure", 0.125f64);
        data.insert(
            "Offsets",
            TagStruct::new(vec![TagScalar::I32(3), TagScalar::I32(-4)]),
        );
        data.insert("Pixels", TagArray::F32(vec![0.0, -1.5, 2.25, 1e30]));
        data.insert("Label", "beam µm");

        let mut root = TagGroup::new();
        root.insert("Acquisition", data);
        root.insert(
            "Series",
            TagNode::List(vec![TagNode::from(1i32), TagNode::from(2i32)]),
        );
        TagNode::Group(root)
    }

    #[test]
    fn test_tree_round_trip_all_framings() {
        let tree = sample_tree();
        for version in [DmVersion::V3, DmVersion::V4] {
            for endian in [Endianness::Little, Endianness::Big] {
                assert_eq!(round_trip(&tree, version, endian), tree);
            }
        }
    }

    #[test]
    fn test_empty_group_round_trip() {
        let tree = TagNode::Group(TagGroup::new());
        assert_eq!(round_trip(&tree, DmVersion::V3, Endianness::Little), tree);
    }

    #[test]
    fn test_struct_array_round_trip() {
        let values = vec![Complex32::new(1.0, -2.0), Complex32::new(0.5, 3.0)];
        let mut g = TagGroup::new();
        g.insert("Data", TagArray::Structs(StructArray::from_complex64(&values)));
        let tree = TagNode::Group(g);
        assert_eq!(round_trip(&tree, DmVersion::V4, Endianness::Little), tree);
    }

    #[test]
    fn test_empty_and_single_element_array_round_trips() {
        let layout: StructLayout = [TagType::Double, TagType::Double].into_iter().collect();
        let mut g = TagGroup::new();
        g.insert("EmptyFloats", TagArray::F32(Vec::new()));
        g.insert("OneLong", TagArray::I64(vec![-9]));
        g.insert(
            "EmptyPairs",
            TagArray::Structs(StructArray::new(layout, Vec::new()).unwrap()),
        );
        g.insert(
            "OnePair",
            TagArray::Structs(StructArray::from_complex64(&[Complex32::new(1.5, -0.5)])),
        );
        let tree = TagNode::Group(g);
        for version in [DmVersion::V3, DmVersion::V4] {
            assert_eq!(round_trip(&tree, version, Endianness::Little), tree);
        }
    }

    #[test]
    fn test_empty_u16_array_decodes_as_empty_string() {
        // Zero ushort elements are trivially valid UTF-16, so the u16-text
        // rule applies and an empty string comes back.
        let mut g = TagGroup::new();
        g.insert("Units", TagArray::U16(Vec::new()));
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(g),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        let back = decode_root(Cursor::new(buf)).unwrap();
        let group = back.as_group().unwrap();
        assert_eq!(group.get("Units").and_then(TagNode::as_str), Some(""));
    }

    #[test]
    fn test_text_u16_array_decodes_as_string() {
        // A ushort array of valid UTF-16 comes back as a string node.
        let mut g = TagGroup::new();
        g.insert("Units", TagArray::U16("nm".encode_utf16().collect()));
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(g),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        let back = decode_root(Cursor::new(buf)).unwrap();
        let group = back.as_group().unwrap();
        assert_eq!(group.get("Units").and_then(TagNode::as_str), Some("nm"));
    }

    #[test]
    fn test_surrogate_u16_array_stays_an_array() {
        // An unpaired surrogate is not valid UTF-16; the data survives as
        // a plain array instead of failing the decode.
        let units = vec![0xD800u16, 42, 7];
        let mut g = TagGroup::new();
        g.insert("Spectrum", TagArray::U16(units.clone()));
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(g),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        let back = decode_root(Cursor::new(buf)).unwrap();
        let group = back.as_group().unwrap();
        assert_eq!(
            group.get("Spectrum").and_then(TagNode::as_array),
            Some(&TagArray::U16(units))
        );
    }

    #[test]
    fn test_declared_root_length_matches_body() {
        let tree = sample_tree();
        for version in [DmVersion::V3, DmVersion::V4] {
            let mut buf = Vec::new();
            encode_root(&mut buf, &tree, version, Endianness::Little).unwrap();
            let header = 4 + version.size_width() as usize + 4;
            let declared = match version {
                DmVersion::V3 => {
                    u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize
                }
                DmVersion::V4 => {
                    u64::from_be_bytes(buf[4..12].try_into().unwrap()) as usize
                }
            };
            assert_eq!(declared, buf.len() - header);
        }
    }

    #[test]
    fn test_truncation_reports_truncated_data() {
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &sample_tree(),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        // Cutting anywhere inside the body must surface TruncatedData.
        for cut in [13, buf.len() / 2, buf.len() - 1] {
            match decode_root(Cursor::new(buf[..cut].to_vec())) {
                Err(DmError::TruncatedData(_)) => {}
                other => panic!("cut at {cut}: expected TruncatedData, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_version_is_malformed() {
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(TagGroup::new()),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        buf[3] = 7;
        assert!(matches!(
            decode_root(Cursor::new(buf)),
            Err(DmError::MalformedTag(_))
        ));
    }

    #[test]
    fn test_bad_data_magic_is_malformed() {
        let mut g = TagGroup::new();
        g.insert("x", 1i32);
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(g),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        let pos = buf.windows(4).position(|w| w == b"%%%%").unwrap();
        buf[pos] = b'!';
        assert!(matches!(
            decode_root(Cursor::new(buf)),
            Err(DmError::MalformedTag(_))
        ));
    }

    #[test]
    fn test_bad_entry_kind_is_malformed() {
        let mut g = TagGroup::new();
        g.insert("x", 1i32);
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(g),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        // First entry kind byte sits right after the 12-byte header and
        // the 6-byte directory body prefix.
        buf[18] = 99;
        assert!(matches!(
            decode_root(Cursor::new(buf)),
            Err(DmError::MalformedTag(_))
        ));
    }

    #[test]
    fn test_oversized_count_is_truncated_data() {
        // A group declaring far more children than the stream can hold.
        let mut buf = Vec::new();
        encode_root(
            &mut buf,
            &TagNode::Group(TagGroup::new()),
            DmVersion::V3,
            Endianness::Little,
        )
        .unwrap();
        // Child count field of the root directory body.
        let count_at = 12 + 2;
        buf[count_at..count_at + 4].copy_from_slice(&0x00FF_FFFFu32.to_be_bytes());
        assert!(matches!(
            decode_root(Cursor::new(buf)),
            Err(DmError::TruncatedData(_))
        ));
    }

    #[test]
    fn test_scalar_root_is_rejected() {
        let mut buf = Vec::new();
        assert!(matches!(
            encode_root(
                &mut buf,
                &TagNode::from(1i32),
                DmVersion::V3,
                Endianness::Little
            ),
            Err(DmError::Consistency(_))
        ));
    }
}
