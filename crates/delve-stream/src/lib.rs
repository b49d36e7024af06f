//! Research stream ingestion.
//!
//! The streaming half of the client: [`client`] opens the SSE stream and
//! parses records at the boundary, [`ingest`] reduces parsed events into
//! research state with identity filtering and deduplication, and [`runner`]
//! drives a run end to end with heartbeats, cancellation, and a polling
//! fallback when the stream breaks.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod ingest;
pub mod runner;

pub use client::{EventStream, ResearchStreamClient};
pub use errors::{Result, StreamError};
pub use ingest::{Applied, Ingestor};
pub use runner::{RunOptions, StreamRunner};
