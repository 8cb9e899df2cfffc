//! Core scheduling logic for the daily French drill.
//!
//! The crate owns the curriculum catalog, the learner's progress and level state, the
//! topic selector and the daily orchestrator. Everything that talks to the outside world
//! (text and speech generation, uploads, feed serialization, audio encoding) is reached
//! through the traits in [`llm_client`], [`brainstorm`], [`storage`] and [`episode`], so the
//! service crate can plug real clients in and tests can plug fakes in.

pub mod brainstorm;
pub mod curriculum;
pub mod drill;
pub mod episode;
pub mod error;
pub mod lesson;
pub mod llm_client;
pub mod progress;
pub mod prompts;
pub mod selector;
pub mod state;
pub mod storage;
mod store;

pub use error::CoreError;
