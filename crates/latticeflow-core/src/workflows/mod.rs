//! # Workflows Module
//!
//! High-level entry points that tie [`crate::core`] and [`crate::engine`]
//! together into complete procedures.
//!
//! ## Overview
//!
//! Workflows are what front ends call. Each one validates its inputs, reports
//! progress through a [`crate::engine::task::Task`], logs its milestones, and
//! returns a typed [`crate::engine::error::EngineError`] on failure.
//!
//! ## Architecture
//!
//! - **Import Workflow** ([`import`]) - Format detection, frame discovery, random-access
//!   frame loading, and hand-over into a long-lived collection
//! - **Analysis Workflow** ([`analyze`]) - Cutoff-based bond generation and common
//!   neighbor analysis
//!
//! ## Key Capabilities
//!
//! - **Multi-frame import** with type ids kept stable across frames
//! - **Background loading** through the task harness, with distinct cancellation
//! - **Structure identification** in fixed, adaptive, and bond-based modes

pub mod analyze;
pub mod import;
