//! Facial landmark model evaluation.
//!
//! This crate measures how well a pretrained landmark regression network (a PFLD-style ONNX
//! checkpoint) localizes facial landmarks, using the standard benchmark metrics:
//!
//! - per-sample **normalized mean error** (NME), normalized by the dataset's interocular
//!   reference distance,
//! - the **area under the cumulative error distribution curve** (AUC),
//! - the **failure rate** at a fixed error threshold.
//!
//! Frames come either from a labeled test list ([`dataset`]) or a live webcam ([`webcam`]);
//! the [`eval`] module ties source, network, and metrics together. Inference runs on the CPU via
//! `tract-onnx` and is strictly sequential: this is an offline measurement tool, and keeping the
//! loop synchronous keeps the latency numbers honest.

use log::LevelFilter;

pub mod dataset;
pub mod eval;
pub mod gui;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod metrics;
pub mod nn;
pub mod pfld;
pub mod resolution;
pub mod source;
pub mod timer;
pub mod webcam;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this library will log at *debug* level, `wgpu` at *warn* level; the
/// `RUST_LOG` environment variable overrides both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
