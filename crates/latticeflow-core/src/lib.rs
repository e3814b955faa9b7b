//! # latticeflow Core Library
//!
//! A streaming importer for particle simulation trajectories and a common
//! neighbor analysis engine for identifying local crystal structure.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture to keep concerns separated.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`SimulationCell`, `FrameData`,
//!   `DataCollection`), file format parsers for LAMMPS text dumps and (extended) XYZ files,
//!   and periodic-aware neighbor finders.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer: configuration builders, the
//!   cooperative task harness with progress and cancellation, data-parallel helpers, and the
//!   fixed, adaptive, and bond-based common neighbor analysis strategies.
//!
//! - **[`workflows`]: The Public API.** High-level entry points that tie `core` and `engine`
//!   together: detecting a file's format, discovering its frames, loading a frame into a
//!   collection, generating bonds, and running structure identification.

pub mod core;
pub mod engine;
pub mod workflows;
