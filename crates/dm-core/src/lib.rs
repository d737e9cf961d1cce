//! # dm-core
//!
//! Core types for Gatan DigitalMicrograph (DM3/DM4) files.
//!
//! This crate provides the data model shared by the DM codec; it performs
//! no I/O itself:
//!
//! - [`TagNode`], [`TagGroup`], [`TagArray`], [`StructArray`] - the
//!   recursive tag tree the format encodes
//! - [`TagType`], [`DataType`], [`SampleFormat`] - the immutable type
//!   registries (wire codes and image sample codes)
//! - [`Calibration`] - affine index-to-physical mapping per dimension
//! - [`ImageRecord`], [`SampleBuffer`] - the image view over a tag tree
//!
//! ## Crate Structure
//!
//! `dm-core` is the foundation; `dm-io` builds the stream codec and the
//! image mapping layer on top of it:
//!
//! ```text
//! dm-core (this crate)
//!    ^
//!    |
//!    +-- dm-io (DM3/DM4 reader and writer)
//! ```
//!
//! Everything here is plain owned data: trees are built fresh per decode,
//! consumed per encode, and never shared across calls. The registries are
//! `const` tables fixed at compile time.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod calibration;
pub mod error;
pub mod image;
pub mod tag;
pub mod types;

// Re-exports for convenience
pub use calibration::Calibration;
pub use error::{Error, Result};
pub use image::{ImageRecord, SampleBuffer};
pub use tag::{StructArray, StructLayout, TagArray, TagGroup, TagNode, TagScalar, TagStruct};
pub use types::{DataType, SampleFormat, TagType};

// Complex sample types come from num-complex; re-exported so downstream
// crates agree on the exact version.
pub use num_complex::{Complex32, Complex64};
