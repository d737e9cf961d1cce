//! Image mapping layer: the bridge between the raw tag tree and
//! [`ImageRecord`].
//!
//! A DM document stores its images under `ImageList`; each entry carries an
//! `ImageData` group (`Data`, `DataType`, `PixelDepth`, `Dimensions`,
//! `Calibrations`), an optional display `Name` and an `ImageTags` metadata
//! subtree. Loading takes the last `ImageList` entry, which is the image a
//! multi-image document presents as current. Saving wraps one record in the
//! minimal document skeleton DM software accepts (`ImageSourceList`,
//! `DocumentObjectList`, display behavior tags).
//!
//! # Example
//!
//! ```rust,ignore
//! use dm_io::{load_image, save_image};
//!
//! let image = load_image("scan.dm3")?;
//! println!("{:?} {:?}", image.data_type, image.shape);
//! save_image("copy.dm3", &image)?;
//! ```

use crate::error::{DmError, DmResult};
use crate::stream::{DmVersion, Endianness};
use crate::tree::{decode_root, encode_root};
use dm_core::{
    Calibration, DataType, ImageRecord, SampleBuffer, TagArray, TagGroup, TagNode, TagScalar,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::warn;

// === Reader Options ===

/// Options for reading DM files.
#[derive(Debug, Clone, Default)]
pub struct DmReaderOptions {
    /// Reserved for future use.
    _reserved: (),
}

// === Writer Options ===

/// Options for writing DM files.
#[derive(Debug, Clone, Default)]
pub struct DmWriterOptions {
    /// Framing version. Default: version 3 (`.dm3`).
    pub version: DmVersion,
    /// Data byte order. Default: little-endian, which is what DM software
    /// itself produces.
    pub endianness: Endianness,
}

// === DmReader ===

/// DM3/DM4 file reader.
///
/// Reads the current image (the last `ImageList` entry) of a DM document
/// into an [`ImageRecord`]. Both framing versions are detected from the
/// header; no option is needed to pick one.
#[derive(Debug, Clone, Default)]
pub struct DmReader {
    #[allow(dead_code)]
    options: DmReaderOptions,
}

impl DmReader {
    /// Creates a new reader with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader with the given options.
    pub fn with_options(options: DmReaderOptions) -> Self {
        Self { options }
    }

    /// Whether the given header bytes look like a DM3/DM4 file.
    pub fn can_read(&self, header: &[u8]) -> bool {
        if header.len() < 4 {
            return false;
        }
        let version = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        version == 3 || version == 4
    }

    /// Internal read implementation from any Read+Seek source.
    fn read_from<R: Read + Seek>(&self, reader: R) -> DmResult<ImageRecord> {
        let root = decode_root(reader)?;
        image_record_from_tree(&root)
    }

    /// Reads the image from a file path.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> DmResult<ImageRecord> {
        let file = File::open(path.as_ref())?;
        self.read_from(BufReader::new(file))
    }

    /// Reads the image from an in-memory byte slice.
    pub fn read_from_memory(&self, bytes: &[u8]) -> DmResult<ImageRecord> {
        self.read_from(Cursor::new(bytes))
    }
}

// === DmWriter ===

/// DM3/DM4 file writer.
///
/// Wraps one [`ImageRecord`] in a minimal single-image document and encodes
/// it under the configured framing version and byte order.
#[derive(Debug, Clone, Default)]
pub struct DmWriter {
    options: DmWriterOptions,
}

impl DmWriter {
    /// Creates a new writer with default options (version 3,
    /// little-endian).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with the given options.
    pub fn with_options(options: DmWriterOptions) -> Self {
        Self { options }
    }

    /// Internal write implementation to any Write sink.
    fn write_to<W: Write>(&self, writer: W, image: &ImageRecord) -> DmResult<()> {
        let root = tree_from_image(image)?;
        encode_root(writer, &root, self.options.version, self.options.endianness)
    }

    /// Writes the image to a file path.
    pub fn write<P: AsRef<Path>>(&self, path: P, image: &ImageRecord) -> DmResult<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, image)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the image to an in-memory byte buffer.
    pub fn write_to_memory(&self, image: &ImageRecord) -> DmResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, image)?;
        Ok(buf)
    }
}

// === Convenience Functions ===

/// Loads the current image from a DM3/DM4 file.
///
/// Uses default options. For more control, use [`DmReader`] directly.
pub fn load_image<P: AsRef<Path>>(path: P) -> DmResult<ImageRecord> {
    DmReader::new().read(path)
}

/// Saves an image to a DM3 file (version-3 framing, little-endian).
///
/// For version-4 framing or big-endian output, use [`DmWriter`] with
/// [`DmWriterOptions`].
pub fn save_image<P: AsRef<Path>>(path: P, image: &ImageRecord) -> DmResult<()> {
    DmWriter::new().write(path, image)
}

// === Tree -> Record ===

fn missing(what: &str) -> DmError {
    DmError::Consistency(format!("image document has no {what}"))
}

/// Extracts the current image from a decoded document tree.
///
/// Takes the last `ImageList` entry; a multi-image document presents that
/// one as current.
pub fn image_record_from_tree(root: &TagNode) -> DmResult<ImageRecord> {
    let root = root
        .as_group()
        .ok_or_else(|| missing("root tag group"))?;
    let images = root
        .get("ImageList")
        .and_then(TagNode::as_list)
        .ok_or_else(|| missing("ImageList"))?;
    let image = images
        .last()
        .and_then(TagNode::as_group)
        .ok_or_else(|| missing("image entry in ImageList"))?;
    let image_data = image
        .get("ImageData")
        .and_then(TagNode::as_group)
        .ok_or_else(|| missing("ImageData group"))?;

    let code = image_data
        .get("DataType")
        .and_then(TagNode::as_i64)
        .ok_or_else(|| missing("DataType"))?;
    let data_type = DataType::from_code(code)
        .ok_or_else(|| DmError::UnsupportedType(format!("unknown image data type code {code}")))?;

    let depth = image_data
        .get("PixelDepth")
        .and_then(TagNode::as_i64)
        .ok_or_else(|| missing("PixelDepth"))?;
    if depth != data_type.byte_size() as i64 {
        return Err(DmError::Consistency(format!(
            "PixelDepth {depth} disagrees with {data_type} samples of {} bytes",
            data_type.byte_size()
        )));
    }

    // The tree codec turns a ushort array of valid UTF-16 into a string
    // node, which is exactly what u16 pixel data often looks like. Undo
    // that here; the code units are preserved bit-for-bit.
    let data_node = image_data.get("Data").ok_or_else(|| missing("Data"))?;
    let recovered;
    let array = match data_node {
        TagNode::Array(a) => a,
        TagNode::String(s) => {
            recovered = TagArray::U16(s.encode_utf16().collect());
            &recovered
        }
        _ => {
            return Err(DmError::Consistency(
                "image Data tag is not an array".into(),
            ));
        }
    };
    let data = SampleBuffer::from_tag_array(array, data_type)?;

    let dims = image_data
        .get("Dimensions")
        .and_then(TagNode::as_list)
        .ok_or_else(|| missing("Dimensions"))?;
    let mut shape = Vec::with_capacity(dims.len());
    for dim in dims {
        let extent = dim.as_i64().filter(|v| *v >= 0).ok_or_else(|| {
            DmError::Consistency("Dimensions entry is not a non-negative integer".into())
        })?;
        shape.push(extent as usize);
    }
    // Stored minor-to-major; the record keeps row-major.
    shape.reverse();

    let expected: usize = shape.iter().product();
    if data.len() != expected {
        return Err(DmError::Consistency(format!(
            "data of {} samples does not fill dimensions {shape:?}",
            data.len()
        )));
    }

    let mut dimensional_calibrations = Vec::new();
    let mut intensity_calibration = None;
    if let Some(cals) = image_data.get("Calibrations").and_then(TagNode::as_group) {
        if let Some(entries) = cals.get("Dimension").and_then(TagNode::as_list) {
            for entry in entries {
                dimensional_calibrations.push(calibration_from_node(entry));
            }
            dimensional_calibrations.reverse();
        }
        if let Some(brightness) = cals.get("Brightness") {
            intensity_calibration = Some(calibration_from_node(brightness));
        }
    }
    // Missing or surplus per-dimension entries: pad with identity, drop
    // extras, so the record always calibrates every axis.
    dimensional_calibrations.resize(shape.len(), Calibration::identity());

    let title = image
        .get("Name")
        .and_then(TagNode::as_str)
        .map(str::to_string);

    let mut metadata = TagGroup::new();
    if let Some(tags) = image.get("ImageTags") {
        metadata.insert("imported_properties", tags.clone());
        let voltage = tags
            .as_group()
            .and_then(|g| g.get("ImageScanned"))
            .and_then(TagNode::as_group)
            .and_then(|g| g.get("EHT"))
            .and_then(TagNode::as_f64);
        if let Some(v) = voltage {
            if v != 0.0 {
                let mut autostem = TagGroup::new();
                autostem.insert("high_tension_v", v);
                metadata.insert("autostem", autostem);
                metadata.insert("extra_high_tension", v);
            }
        }
    }

    Ok(ImageRecord {
        data,
        shape,
        data_type,
        dimensional_calibrations,
        intensity_calibration,
        title,
        metadata,
    })
}

fn calibration_from_node(node: &TagNode) -> Calibration {
    let Some(group) = node.as_group() else {
        return Calibration::identity();
    };
    let origin = group.get("Origin").and_then(TagNode::as_f64).unwrap_or(0.0);
    let scale = group.get("Scale").and_then(TagNode::as_f64).unwrap_or(1.0);
    let units = group
        .get("Units")
        .and_then(TagNode::as_str)
        .unwrap_or("")
        .to_string();
    if scale == 0.0 {
        warn!(origin, %units, "calibration scale of 0 normalized to 1");
    }
    Calibration::new(origin, scale, units).normalized()
}

// === Record -> Tree ===

/// Builds a minimal single-image document tree around a record.
pub fn tree_from_image(image: &ImageRecord) -> DmResult<TagNode> {
    let rank = image.rank();
    if rank < 2 {
        return Err(DmError::Consistency(format!(
            "images of rank {rank} cannot be written, rank 2 or higher required"
        )));
    }
    if image.data_type.sample_format() != image.data.sample_format() {
        return Err(DmError::Consistency(format!(
            "data type {} disagrees with {:?} sample storage",
            image.data_type,
            image.data.sample_format()
        )));
    }
    if image.data.len() != image.sample_count() {
        return Err(DmError::Consistency(format!(
            "data of {} samples does not fill shape {:?}",
            image.data.len(),
            image.shape
        )));
    }
    for &extent in &image.shape {
        if extent > i32::MAX as usize {
            return Err(DmError::Consistency(format!(
                "dimension extent {extent} does not fit the stored dimension field"
            )));
        }
    }
    let calibrations = if image.dimensional_calibrations.is_empty() {
        vec![Calibration::identity(); rank]
    } else if image.dimensional_calibrations.len() == rank {
        image.dimensional_calibrations.clone()
    } else {
        return Err(DmError::Consistency(format!(
            "{} dimensional calibrations for an image of rank {rank}",
            image.dimensional_calibrations.len()
        )));
    };

    let mut image_data = TagGroup::new();
    image_data.insert("Data", image.data.to_tag_array());
    image_data.insert("DataType", TagScalar::I32(image.data_type.code() as i32));
    image_data.insert(
        "PixelDepth",
        TagScalar::I32(image.data_type.byte_size() as i32),
    );
    image_data.insert(
        "Dimensions",
        TagNode::List(
            image
                .shape
                .iter()
                .rev()
                .map(|&d| TagNode::from(d as i32))
                .collect(),
        ),
    );

    let mut cal_group = TagGroup::new();
    if let Some(intensity) = &image.intensity_calibration {
        cal_group.insert("Brightness", calibration_to_node(intensity));
    }
    cal_group.insert(
        "Dimension",
        TagNode::List(calibrations.iter().rev().map(calibration_to_node).collect()),
    );
    image_data.insert("Calibrations", cal_group);

    let mut entry = TagGroup::new();
    entry.insert("ImageData", image_data);
    if let Some(title) = &image.title {
        entry.insert("Name", title.as_str());
    }
    // A loaded record keeps the source's ImageTags verbatim under
    // `imported_properties`; write that subtree back so a load/save cycle
    // preserves it. A freshly built record's metadata becomes the subtree.
    let image_tags = match image.metadata.get("imported_properties") {
        Some(TagNode::Group(g)) => g.clone(),
        _ => image.metadata.clone(),
    };
    entry.insert("ImageTags", image_tags);

    let mut source = TagGroup::new();
    source.insert("ClassName", "ImageSource:Simple");
    source.insert("Id", TagNode::List(vec![TagNode::from(0i32)]));
    source.insert("ImageRef", 0i32);

    let mut object = TagGroup::new();
    object.insert("ImageSource", 0i32);
    object.insert("AnnotationType", 20i32);

    let mut behavior = TagGroup::new();
    behavior.insert("ViewDisplayID", 8i32);

    let mut root = TagGroup::new();
    root.insert("ImageList", TagNode::List(vec![TagNode::Group(entry)]));
    root.insert(
        "ImageSourceList",
        TagNode::List(vec![TagNode::Group(source)]),
    );
    root.insert(
        "DocumentObjectList",
        TagNode::List(vec![TagNode::Group(object)]),
    );
    root.insert("Image Behavior", behavior);
    root.insert("InImageMode", 1i32);
    Ok(TagNode::Group(root))
}

fn calibration_to_node(calibration: &Calibration) -> TagNode {
    let mut group = TagGroup::new();
    group.insert("Origin", calibration.origin);
    group.insert("Scale", calibration.scale);
    group.insert("Units", calibration.units.as_str());
    TagNode::Group(group)
}
