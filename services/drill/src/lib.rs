//! Obsédé Drill Service Library Crate
//!
//! The outward-facing half of the daily drill: environment configuration, the Gemini
//! client, audio encoding, audio publishing and the RSS feed. The scheduling logic lives
//! in `obsede-core`; the `drill` binary wires the two together.

pub mod audio_utils;
pub mod config;
pub mod feed;
pub mod gemini;
pub mod storage;
