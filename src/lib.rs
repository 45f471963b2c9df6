//! Fixtape - HTTP interaction recorder and replayer
//!
//! Intercepts outgoing HTTP requests, stores each request/response pair as a
//! JSON fixture, and serves later identical requests from disk.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod body;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod network;
pub mod normalize;
pub mod proxy;
pub mod storage;

pub use config::{Config, Mode};
pub use error::{RecorderError, Result};
pub use identity::Identification;
pub use normalize::NormalizedRequest;
pub use proxy::{install, installed, Interceptor, Recorder, RecorderBuilder};
