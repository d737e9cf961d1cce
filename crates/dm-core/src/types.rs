//! Type registries for the DM tag format.
//!
//! DM files carry two distinct type-code namespaces, and both registries
//! here are immutable, process-wide constants:
//!
//! - [`TagType`] - wire codes used inside tag definitions. Scalar codes map
//!   bijectively onto native Rust types.
//! - [`DataType`] - the image `DataType` field namespace, which describes
//!   the sample type of a pixel buffer. This map is *not* injective: the
//!   unsigned-8-bit, signed-8-bit and boolean codes collapse onto 8-bit
//!   native storage, and packed RGB shares storage with `uint32`.
//!   [`SampleFormat::data_type`] picks the canonical code for the reverse
//!   direction.
//!
//! Callers that need to discriminate at the domain level (boolean vs raw
//! byte, RGB vs plain `uint32`) must consult the stored `DataType` code
//! directly rather than the resolved [`SampleFormat`].

/// Wire type code used inside tag definitions.
///
/// Scalar codes occupy 1, 2, 4 or 8 bytes in the stream, in the stream's
/// data byte order. `Struct`, `String` and `Array` are compound markers
/// whose payload layout is described by the rest of the definition.
///
/// | code | name      | native | width |
/// |------|-----------|--------|-------|
/// | 2    | short     | i16    | 2     |
/// | 3    | long      | i32    | 4     |
/// | 4    | ushort    | u16    | 2     |
/// | 5    | ulong     | u32    | 4     |
/// | 6    | float     | f32    | 4     |
/// | 7    | double    | f64    | 8     |
/// | 8    | boolean   | u8     | 1     |
/// | 9    | char      | i8     | 1     |
/// | 10   | octet     | u8     | 1     |
/// | 11   | longlong  | i64    | 8     |
/// | 12   | ulonglong | u64    | 8     |
/// | 15   | struct    | -      | -     |
/// | 18   | string    | -      | -     |
/// | 20   | array     | -      | -     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    /// Signed 16-bit integer ("short").
    Short,
    /// Signed 32-bit integer ("long").
    Long,
    /// Unsigned 16-bit integer.
    UShort,
    /// Unsigned 32-bit integer.
    ULong,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Boolean stored as one byte (0 or 1).
    Boolean,
    /// Signed 8-bit integer ("char").
    Char,
    /// Unsigned 8-bit integer ("octet").
    Octet,
    /// Signed 64-bit integer.
    LongLong,
    /// Unsigned 64-bit integer.
    ULongLong,
    /// Fixed-arity tuple of heterogeneous scalars.
    Struct,
    /// Length-prefixed UTF-16 string.
    String,
    /// Homogeneous bulk sequence of scalars or of one struct layout.
    Array,
}

impl TagType {
    /// Resolves a wire code to a tag type. Returns `None` for codes the
    /// format does not define.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            2 => Some(Self::Short),
            3 => Some(Self::Long),
            4 => Some(Self::UShort),
            5 => Some(Self::ULong),
            6 => Some(Self::Float),
            7 => Some(Self::Double),
            8 => Some(Self::Boolean),
            9 => Some(Self::Char),
            10 => Some(Self::Octet),
            11 => Some(Self::LongLong),
            12 => Some(Self::ULongLong),
            15 => Some(Self::Struct),
            18 => Some(Self::String),
            20 => Some(Self::Array),
            _ => None,
        }
    }

    /// The wire code for this tag type.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Short => 2,
            Self::Long => 3,
            Self::UShort => 4,
            Self::ULong => 5,
            Self::Float => 6,
            Self::Double => 7,
            Self::Boolean => 8,
            Self::Char => 9,
            Self::Octet => 10,
            Self::LongLong => 11,
            Self::ULongLong => 12,
            Self::Struct => 15,
            Self::String => 18,
            Self::Array => 20,
        }
    }

    /// Whether this code names a fixed-width scalar.
    pub const fn is_scalar(&self) -> bool {
        self.byte_size().is_some()
    }

    /// Encoded width in bytes for scalar codes, `None` for compound codes.
    pub const fn byte_size(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Char | Self::Octet => Some(1),
            Self::Short | Self::UShort => Some(2),
            Self::Long | Self::ULong | Self::Float => Some(4),
            Self::Double | Self::LongLong | Self::ULongLong => Some(8),
            Self::Struct | Self::String | Self::Array => None,
        }
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::UShort => "ushort",
            Self::ULong => "ulong",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Octet => "octet",
            Self::LongLong => "longlong",
            Self::ULongLong => "ulonglong",
            Self::Struct => "struct",
            Self::String => "string",
            Self::Array => "array",
        }
    }
}

impl std::fmt::Display for TagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Image sample type as stored in the `DataType` tag of an image record.
///
/// This namespace is separate from [`TagType`]; the same file carries both.
///
/// | code | name       | storage | bytes |
/// |------|------------|---------|-------|
/// | 1    | int16      | i16     | 2     |
/// | 2    | float32    | f32     | 4     |
/// | 3    | complex64  | 2 x f32 | 8     |
/// | 6    | uint8      | u8      | 1     |
/// | 7    | int32      | i32     | 4     |
/// | 9    | int8       | i8      | 1     |
/// | 10   | uint16     | u16     | 2     |
/// | 11   | uint32     | u32     | 4     |
/// | 12   | float64    | f64     | 8     |
/// | 13   | complex128 | 2 x f64 | 16    |
/// | 14   | bool       | u8      | 1     |
/// | 23   | rgb        | u32     | 4     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Signed 16-bit samples.
    Int16,
    /// 32-bit float samples.
    Float32,
    /// Complex samples packed as adjacent f32 real/imaginary pairs.
    Complex64,
    /// Unsigned 8-bit samples.
    UInt8,
    /// Signed 32-bit samples.
    Int32,
    /// Signed 8-bit samples.
    Int8,
    /// Unsigned 16-bit samples.
    UInt16,
    /// Unsigned 32-bit samples.
    UInt32,
    /// 64-bit float samples.
    Float64,
    /// Complex samples packed as adjacent f64 real/imaginary pairs.
    Complex128,
    /// Boolean samples, one byte each.
    Bool,
    /// Packed RGB samples, four bytes each.
    Rgb,
}

impl DataType {
    /// Resolves a stored `DataType` code. Returns `None` for codes the
    /// format does not define.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Int16),
            2 => Some(Self::Float32),
            3 => Some(Self::Complex64),
            6 => Some(Self::UInt8),
            7 => Some(Self::Int32),
            9 => Some(Self::Int8),
            10 => Some(Self::UInt16),
            11 => Some(Self::UInt32),
            12 => Some(Self::Float64),
            13 => Some(Self::Complex128),
            14 => Some(Self::Bool),
            23 => Some(Self::Rgb),
            _ => None,
        }
    }

    /// The stored code for this data type.
    pub const fn code(&self) -> i64 {
        match self {
            Self::Int16 => 1,
            Self::Float32 => 2,
            Self::Complex64 => 3,
            Self::UInt8 => 6,
            Self::Int32 => 7,
            Self::Int8 => 9,
            Self::UInt16 => 10,
            Self::UInt32 => 11,
            Self::Float64 => 12,
            Self::Complex128 => 13,
            Self::Bool => 14,
            Self::Rgb => 23,
        }
    }

    /// Native storage format for samples of this type.
    ///
    /// Non-injective: `Bool` resolves to `U8` storage and `Rgb` to `U32`.
    pub const fn sample_format(&self) -> SampleFormat {
        match self {
            Self::Int16 => SampleFormat::I16,
            Self::Float32 => SampleFormat::F32,
            Self::Complex64 => SampleFormat::C64,
            Self::UInt8 | Self::Bool => SampleFormat::U8,
            Self::Int32 => SampleFormat::I32,
            Self::Int8 => SampleFormat::I8,
            Self::UInt16 => SampleFormat::U16,
            Self::UInt32 | Self::Rgb => SampleFormat::U32,
            Self::Float64 => SampleFormat::F64,
            Self::Complex128 => SampleFormat::C128,
        }
    }

    /// Declared byte width of one sample (the `PixelDepth` value).
    pub const fn byte_size(&self) -> usize {
        self.sample_format().byte_size()
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Float32 => "float32",
            Self::Complex64 => "complex64",
            Self::UInt8 => "uint8",
            Self::Int32 => "int32",
            Self::Int8 => "int8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::Float64 => "float64",
            Self::Complex128 => "complex128",
            Self::Bool => "bool",
            Self::Rgb => "rgb",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Native storage format of an image sample buffer.
///
/// Unlike [`DataType`], this only names byte-aligned native types; several
/// data-type codes can resolve to the same sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Complex of two f32 components.
    C64,
    /// Complex of two f64 components.
    C128,
}

impl SampleFormat {
    /// Bytes per sample.
    pub const fn byte_size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 | Self::C64 => 8,
            Self::C128 => 16,
        }
    }

    /// Whether this is a complex format.
    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::C64 | Self::C128)
    }

    /// Canonical [`DataType`] code for this storage format.
    ///
    /// This is the deterministic choice used when writing: 8-bit unsigned
    /// storage becomes `uint8` (never `bool`), 32-bit unsigned storage
    /// becomes `uint32` (never `rgb`).
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::I8 => DataType::Int8,
            Self::U8 => DataType::UInt8,
            Self::I16 => DataType::Int16,
            Self::U16 => DataType::UInt16,
            Self::I32 => DataType::Int32,
            Self::U32 => DataType::UInt32,
            Self::F32 => DataType::Float32,
            Self::F64 => DataType::Float64,
            Self::C64 => DataType::Complex64,
            Self::C128 => DataType::Complex128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_type_codes_round_trip() {
        for code in 0..32u64 {
            if let Some(t) = TagType::from_code(code) {
                assert_eq!(t.code(), code);
            }
        }
        assert_eq!(TagType::from_code(13), None);
        assert_eq!(TagType::from_code(19), None);
    }

    #[test]
    fn test_tag_type_widths() {
        assert_eq!(TagType::Short.byte_size(), Some(2));
        assert_eq!(TagType::ULong.byte_size(), Some(4));
        assert_eq!(TagType::Double.byte_size(), Some(8));
        assert_eq!(TagType::Boolean.byte_size(), Some(1));
        assert_eq!(TagType::Struct.byte_size(), None);
        assert!(!TagType::Array.is_scalar());
        assert!(TagType::Octet.is_scalar());
    }

    #[test]
    fn test_data_type_codes_round_trip() {
        for code in 0..32i64 {
            if let Some(t) = DataType::from_code(code) {
                assert_eq!(t.code(), code);
            }
        }
        assert_eq!(DataType::from_code(8), None);
        assert_eq!(DataType::from_code(4), None);
    }

    #[test]
    fn test_non_injective_collapse() {
        // Bool and UInt8 share 8-bit storage; Rgb and UInt32 share 32-bit.
        assert_eq!(DataType::Bool.sample_format(), SampleFormat::U8);
        assert_eq!(DataType::UInt8.sample_format(), SampleFormat::U8);
        assert_eq!(DataType::Rgb.sample_format(), SampleFormat::U32);
        assert_eq!(DataType::UInt32.sample_format(), SampleFormat::U32);

        // The reverse direction picks one canonical code.
        assert_eq!(SampleFormat::U8.data_type(), DataType::UInt8);
        assert_eq!(SampleFormat::U32.data_type(), DataType::UInt32);
        assert_eq!(SampleFormat::I8.data_type(), DataType::Int8);
    }

    #[test]
    fn test_pixel_depths() {
        assert_eq!(DataType::Int16.byte_size(), 2);
        assert_eq!(DataType::Complex64.byte_size(), 8);
        assert_eq!(DataType::Complex128.byte_size(), 16);
        assert_eq!(DataType::Bool.byte_size(), 1);
        assert_eq!(DataType::Rgb.byte_size(), 4);
    }
}
