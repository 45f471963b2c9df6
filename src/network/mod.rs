//! Network layer for Fixtape
//!
//! Captures outgoing bodies and performs real HTTP(S) calls.

mod capture;
mod client;

pub use capture::{read_chunks, validate_request, CapturedRequest, CapturedResponse};
pub use client::{chunk_body, ChunkBody, PassthroughClient};

/// Connection setup timeout
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
