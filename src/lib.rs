//! Host-side control and reference-emulation stack for a fixed-point audio
//! DSP accelerator.
//!
//! The crate compiles a declarative effect description into the
//! byte-serial command stream that configures the accelerator (§6), and it
//! emulates the accelerator's dual-pipeline, sample-by-sample behaviour in
//! software so output can be validated against the hardware RTL.
//!
//! Module map, leaves first:
//! - [`fixed`] — saturating fixed-point kernels
//! - [`instruction`] — the 32-bit instruction codec
//! - [`expr`] — the derived-quantity expression language
//! - [`effect`] — effect description builder
//! - [`wire`] — shared wire-protocol opcode bytes
//! - [`batch`] — transfer-batch (command stream) builder
//! - [`linker`] — resource-aware address relocation
//! - [`delay`] — the delay-line circular buffer
//! - [`pipeline`] — per-sample instruction evaluator
//! - [`decoder`] — device-side command stream decoder
//! - [`engine`] — dual-pipeline orchestrator with cross-fade

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![deny(unused_crate_dependencies)]

pub mod batch;
pub mod config;
pub mod decoder;
pub mod delay;
pub mod effect;
pub mod engine;
pub mod error;
pub mod expr;
pub mod fixed;
pub mod instruction;
pub mod linker;
pub mod pipeline;
pub mod wire;

pub use config::HostConfig;
pub use engine::Engine;
pub use error::{Error, Result};
