//! # dm-io
//!
//! Reader and writer for Gatan DigitalMicrograph DM3/DM4 files.
//!
//! DM files store a recursive tree of typed tags; one well-known subtree
//! carries the image data, its per-dimension calibrations and the
//! instrument metadata. This crate decodes and encodes both layers:
//!
//! - [`tree`] - the raw tag tree codec ([`decode_root`](tree::decode_root),
//!   [`encode_root`](tree::encode_root))
//! - [`image`] - the image mapping layer ([`DmReader`], [`DmWriter`],
//!   [`load_image`], [`save_image`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dm_io::{load_image, save_image};
//!
//! let image = load_image("scan.dm3")?;
//! println!("{} {:?}", image.data_type, image.shape);
//! save_image("copy.dm3", &image)?;
//! ```
//!
//! # Version-4 Output
//!
//! ```rust,ignore
//! use dm_io::{DmWriter, DmWriterOptions, DmVersion};
//!
//! let writer = DmWriter::with_options(DmWriterOptions {
//!     version: DmVersion::V4,
//!     ..Default::default()
//! });
//! writer.write("output.dm4", &image)?;
//! ```
//!
//! # Format Support
//!
//! | Version | Read | Write | Size fields | Notes |
//! |---------|------|-------|-------------|-------|
//! | DM3 | Yes | Yes | 32-bit | default output |
//! | DM4 | Yes | Yes | 64-bit | per-entry byte lengths |
//!
//! Both data byte orders are read; output defaults to little-endian, which
//! is what DM software itself produces.
//!
//! # Dependencies
//!
//! - [`dm-core`](dm_core) - tag tree, type registries, image record
//! - [`byteorder`] - bulk array transcoding

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod image;
mod stream;
pub mod tree;

// Re-exports for convenience
pub use error::{DmError, DmResult};
pub use image::{
    load_image, save_image, DmReader, DmReaderOptions, DmWriter, DmWriterOptions,
};
pub use stream::{DmVersion, Endianness};

// The core data model, so callers need only one import.
pub use dm_core::{
    Calibration, Complex32, Complex64, DataType, ImageRecord, SampleBuffer, SampleFormat,
    StructArray, StructLayout, TagArray, TagGroup, TagNode, TagScalar, TagStruct, TagType,
};
