//! # Core Module
//!
//! This module provides the fundamental data structures and algorithms of
//! latticeflow: particle data models, trajectory file import, and spatial
//! neighbor queries.
//!
//! ## Overview
//!
//! The core module is stateless. A parsed frame is a plain owned value
//! ([`models::frame::FrameData`]) that is moved into a long-lived
//! [`models::collection::DataCollection`], where type catalogs are reconciled
//! so that numeric type ids stay stable across the frames of a trajectory.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Simulation cell, typed property arrays, type catalogs, frames, bond maps
//! - **File I/O** ([`io`]) - Streaming reader, column mapping, LAMMPS dump and (extended) XYZ parsers
//! - **Neighbor Queries** ([`neighbors`]) - Cutoff and k-nearest finders under periodic boundary conditions
//!
//! ## Key Capabilities
//!
//! - **Random access to trajectory frames** through byte-offset frame markers
//! - **Zero-copy parsing** of memory-mapped files, with a line-by-line fallback for compressed input
//! - **Triclinic cells** with per-axis periodicity and minimum-image displacements
//! - **Automatic detection** of column meanings and reduced coordinates

pub mod io;
pub mod models;
pub mod neighbors;
