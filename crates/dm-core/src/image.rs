//! The image record: a typed pixel buffer plus its calibrations, title and
//! instrument metadata.
//!
//! This is the domain view that the mapping layer in `dm-io` extracts from
//! (and rebuilds into) a tag tree. The pixel buffer is a typed native
//! vector; conversion to and from the bulk [`TagArray`] representation is
//! bit-preserving across same-width integer storage, so a `uint16` image
//! whose bulk data happens to be stored as a signed-short array still loads.

use crate::calibration::Calibration;
use crate::error::{Error, Result};
use crate::tag::{StructArray, TagArray, TagGroup};
use crate::types::{DataType, SampleFormat};
use num_complex::{Complex32, Complex64};

/// Typed N-dimensional sample buffer, flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    /// Signed 8-bit samples.
    I8(Vec<i8>),
    /// Unsigned 8-bit samples (also boolean storage).
    U8(Vec<u8>),
    /// Signed 16-bit samples.
    I16(Vec<i16>),
    /// Unsigned 16-bit samples.
    U16(Vec<u16>),
    /// Signed 32-bit samples.
    I32(Vec<i32>),
    /// Unsigned 32-bit samples (also packed RGB storage).
    U32(Vec<u32>),
    /// 32-bit float samples.
    F32(Vec<f32>),
    /// 64-bit float samples.
    F64(Vec<f64>),
    /// Complex64 samples.
    C64(Vec<Complex32>),
    /// Complex128 samples.
    C128(Vec<Complex64>),
}

impl SampleBuffer {
    /// Native storage format of the samples.
    pub const fn sample_format(&self) -> SampleFormat {
        match self {
            Self::I8(_) => SampleFormat::I8,
            Self::U8(_) => SampleFormat::U8,
            Self::I16(_) => SampleFormat::I16,
            Self::U16(_) => SampleFormat::U16,
            Self::I32(_) => SampleFormat::I32,
            Self::U32(_) => SampleFormat::U32,
            Self::F32(_) => SampleFormat::F32,
            Self::F64(_) => SampleFormat::F64,
            Self::C64(_) => SampleFormat::C64,
            Self::C128(_) => SampleFormat::C128,
        }
    }

    /// Canonical [`DataType`] code for writing this buffer.
    pub const fn data_type(&self) -> DataType {
        self.sample_format().data_type()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::C64(v) => v.len(),
            Self::C128(v) => v.len(),
        }
    }

    /// Whether the buffer has no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a typed buffer from a bulk tag array under a declared data
    /// type.
    ///
    /// Same-width integer storage is reinterpreted bit-for-bit (a signed
    /// array under an unsigned data type and vice versa); complex data
    /// types require a struct-array of exactly two identical float fields.
    /// Anything else fails with [`Error::Consistency`].
    pub fn from_tag_array(array: &TagArray, data_type: DataType) -> Result<Self> {
        use SampleFormat as Sf;
        let buf = match (data_type.sample_format(), array) {
            (Sf::C64, TagArray::Structs(sa)) => Self::C64(sa.as_complex64().ok_or_else(|| {
                Error::Consistency(format!(
                    "struct layout {:?} cannot hold {data_type} samples",
                    sa.layout()
                ))
            })?),
            (Sf::C128, TagArray::Structs(sa)) => Self::C128(sa.as_complex128().ok_or_else(
                || {
                    Error::Consistency(format!(
                        "struct layout {:?} cannot hold {data_type} samples",
                        sa.layout()
                    ))
                },
            )?),
            (Sf::I8, TagArray::I8(v)) => Self::I8(v.clone()),
            (Sf::I8, TagArray::U8(v)) | (Sf::I8, TagArray::Bool(v)) => {
                Self::I8(v.iter().map(|&b| b as i8).collect())
            }
            (Sf::U8, TagArray::U8(v)) | (Sf::U8, TagArray::Bool(v)) => Self::U8(v.clone()),
            (Sf::U8, TagArray::I8(v)) => Self::U8(v.iter().map(|&b| b as u8).collect()),
            (Sf::I16, TagArray::I16(v)) => Self::I16(v.clone()),
            (Sf::I16, TagArray::U16(v)) => Self::I16(v.iter().map(|&x| x as i16).collect()),
            (Sf::U16, TagArray::U16(v)) => Self::U16(v.clone()),
            (Sf::U16, TagArray::I16(v)) => Self::U16(v.iter().map(|&x| x as u16).collect()),
            (Sf::I32, TagArray::I32(v)) => Self::I32(v.clone()),
            (Sf::I32, TagArray::U32(v)) => Self::I32(v.iter().map(|&x| x as i32).collect()),
            (Sf::U32, TagArray::U32(v)) => Self::U32(v.clone()),
            (Sf::U32, TagArray::I32(v)) => Self::U32(v.iter().map(|&x| x as u32).collect()),
            (Sf::F32, TagArray::F32(v)) => Self::F32(v.clone()),
            (Sf::F64, TagArray::F64(v)) => Self::F64(v.clone()),
            _ => {
                return Err(Error::Consistency(format!(
                    "bulk array of {} cannot hold {data_type} samples",
                    array.elem_type()
                )));
            }
        };
        Ok(buf)
    }

    /// Converts the buffer into its bulk tag-array representation.
    ///
    /// Complex buffers become struct-arrays of paired float fields.
    pub fn to_tag_array(&self) -> TagArray {
        match self {
            Self::I8(v) => TagArray::I8(v.clone()),
            Self::U8(v) => TagArray::U8(v.clone()),
            Self::I16(v) => TagArray::I16(v.clone()),
            Self::U16(v) => TagArray::U16(v.clone()),
            Self::I32(v) => TagArray::I32(v.clone()),
            Self::U32(v) => TagArray::U32(v.clone()),
            Self::F32(v) => TagArray::F32(v.clone()),
            Self::F64(v) => TagArray::F64(v.clone()),
            Self::C64(v) => TagArray::Structs(StructArray::from_complex64(v)),
            Self::C128(v) => TagArray::Structs(StructArray::from_complex128(v)),
        }
    }
}

/// An image extracted from (or destined for) a DM file.
///
/// `shape` is row-major; the stored `Dimensions` tag holds the reverse
/// (minor-to-major) order, and the codec swaps between the two.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Flattened sample buffer, row-major under `shape`.
    pub data: SampleBuffer,
    /// Row-major dimension extents; rank 2 or higher for writing.
    pub shape: Vec<usize>,
    /// The stored sample type code. Usually the canonical code for the
    /// buffer, but a loaded boolean or RGB image keeps its original code
    /// even though the storage collapses.
    pub data_type: DataType,
    /// One calibration per dimension, ordered like `shape`.
    pub dimensional_calibrations: Vec<Calibration>,
    /// Calibration of the sample values themselves, if present.
    pub intensity_calibration: Option<Calibration>,
    /// Display name, if present.
    pub title: Option<String>,
    /// Free-form instrument metadata. Loaded files carry the verbatim
    /// `ImageTags` subtree under the `imported_properties` key.
    pub metadata: TagGroup,
}

impl ImageRecord {
    /// Creates a record with identity calibrations, no title and empty
    /// metadata. The data type is the canonical code for the buffer.
    pub fn new(data: SampleBuffer, shape: Vec<usize>) -> Self {
        let data_type = data.data_type();
        let rank = shape.len();
        Self {
            data,
            shape,
            data_type,
            dimensional_calibrations: vec![Calibration::identity(); rank],
            intensity_calibration: None,
            title: None,
            metadata: TagGroup::new(),
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Product of the dimension extents.
    pub fn sample_count(&self) -> usize {
        self.shape.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::StructLayout;
    use crate::types::TagType;

    #[test]
    fn test_buffer_from_same_width_integers() {
        // A uint16 image whose bulk data was stored as signed shorts.
        let arr = TagArray::I16(vec![-1, 0, 257]);
        let buf = SampleBuffer::from_tag_array(&arr, DataType::UInt16).unwrap();
        assert_eq!(buf, SampleBuffer::U16(vec![0xFFFF, 0, 257]));
    }

    #[test]
    fn test_buffer_width_mismatch_is_rejected() {
        let arr = TagArray::I16(vec![1, 2]);
        assert!(SampleBuffer::from_tag_array(&arr, DataType::Float32).is_err());
        assert!(SampleBuffer::from_tag_array(&arr, DataType::UInt8).is_err());
    }

    #[test]
    fn test_complex_buffer_requires_paired_floats() {
        let values = vec![Complex32::new(1.0, 2.0), Complex32::new(-3.0, 4.0)];
        let arr = TagArray::Structs(StructArray::from_complex64(&values));
        let buf = SampleBuffer::from_tag_array(&arr, DataType::Complex64).unwrap();
        assert_eq!(buf, SampleBuffer::C64(values));

        // A two-field struct-array of shorts is generic, not complex.
        let layout: StructLayout = [TagType::Short, TagType::Short].into_iter().collect();
        let generic = TagArray::Structs(StructArray::new(layout, vec![0u8; 8]).unwrap());
        assert!(SampleBuffer::from_tag_array(&generic, DataType::Complex64).is_err());
    }

    #[test]
    fn test_bool_storage_collapse() {
        let arr = TagArray::Bool(vec![0, 1, 1]);
        let buf = SampleBuffer::from_tag_array(&arr, DataType::Bool).unwrap();
        assert_eq!(buf.sample_format(), SampleFormat::U8);
        // The canonical reverse code differs from the stored one.
        assert_eq!(buf.data_type(), DataType::UInt8);
    }

    #[test]
    fn test_round_trip_through_tag_array() {
        let buf = SampleBuffer::F64(vec![0.0, -1.5, f64::MAX]);
        let back = SampleBuffer::from_tag_array(&buf.to_tag_array(), buf.data_type()).unwrap();
        assert_eq!(back, buf);

        let buf = SampleBuffer::C128(vec![Complex64::new(1.0, -2.0)]);
        let back = SampleBuffer::from_tag_array(&buf.to_tag_array(), buf.data_type()).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn test_record_shape() {
        let record = ImageRecord::new(SampleBuffer::F32(vec![0.0; 24]), vec![6, 4]);
        assert_eq!(record.rank(), 2);
        assert_eq!(record.sample_count(), 24);
        assert_eq!(record.data_type, DataType::Float32);
        assert_eq!(record.dimensional_calibrations.len(), 2);
    }
}
