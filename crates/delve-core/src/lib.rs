//! # delve-core
//!
//! Foundation types for the delve deep-research client engine.
//!
//! This crate provides the shared vocabulary the other delve crates depend on:
//!
//! - **Branded IDs**: [`ids::SessionId`], [`ids::ResearchId`], [`ids::ClientId`] as newtypes
//! - **Research state**: [`state::ResearchState`] with append-only sources/findings
//!   and a monotonically growing reasoning path
//! - **Syntheses**: [`synthesis::Synthesis`] keyed by node id, [`synthesis::SynthesisSet`]
//! - **Stream events**: [`events::ResearchEvent`] — the tagged union parsed at the
//!   wire boundary, plus [`events::EventScope`] identity filtering
//! - **User models**: [`user_model::UserModel`] research personas
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other delve crates.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod state;
pub mod synthesis;
pub mod user_model;
