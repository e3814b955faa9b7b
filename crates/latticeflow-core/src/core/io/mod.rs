//! Provides trajectory file import for particle simulation data.
//!
//! Every supported format implements the [`traits::FormatParser`] trait: a cheap
//! format check, a frame-discovery scan that records where each frame starts,
//! and a frame parser that seeks to one of those markers and produces a
//! self-contained [`FrameData`](crate::core::models::frame::FrameData). Text
//! access goes through [`reader::TextReader`], which memory-maps plain files
//! and transparently decodes zstd-compressed ones.

pub mod column_reader;
pub mod columns;
pub(crate) mod coordinates;
pub mod error;
pub mod lammps_dump;
pub mod reader;
pub mod traits;
pub mod xyz;
