//! # Engine Module
//!
//! This module implements the stateful analysis layer of latticeflow: the
//! configuration surface, the cooperative task harness that long-running work
//! reports progress through, data-parallel helpers, and the common neighbor
//! analysis engine.
//!
//! ## Overview
//!
//! Everything in here runs on top of the stateless models in [`crate::core`].
//! A unit of work (a frame parse, a structure-identification run) is handed a
//! [`task::Task`], polls it for cancellation at chunk boundaries, and reports
//! its progress through it. The [`task::TaskHarness`] runs such work on a
//! background thread and exposes a pollable future to the caller.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Builders for import options and CNA parameters
//! - **Progress Monitoring** ([`progress`]) - Progress events and the reporter callback
//! - **Task Harness** ([`task`]) - Cancellation flags, progress counters, background execution
//! - **Parallelism** ([`parallel`]) - Chunked, cancellable data-parallel loops over rayon
//! - **Structure Identification** ([`cna`]) - Fixed, adaptive, and bond-based CNA
//! - **Error Handling** ([`error`]) - Engine-specific error types and error propagation
//!
//! ## Key Capabilities
//!
//! - **Cooperative cancellation** that is reported distinctly from failure
//! - **Parallel classification** with disjoint output slices and no locking in the hot loop
//! - **Explicit run lifecycle** for the analysis engine, with validated state transitions

pub mod cna;
pub mod config;
pub mod error;
pub mod parallel;
pub mod progress;
pub mod task;
