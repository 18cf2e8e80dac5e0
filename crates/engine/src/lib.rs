//! Parley Engine library.
//!
//! This crate contains all server-side code for the Parley conversation
//! engine.
//!
//! ## Structure
//!
//! - `session/` - Session state, registry, words, and rate limiting
//! - `scenarios` - Preset scenario catalog
//! - `prompts` - Prompt assembly from session state
//! - `use_cases/` - Chat orchestration and auxiliary evaluators
//! - `infrastructure/` - Completion provider port and adapter
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod prompts;
pub mod scenarios;
pub mod session;
pub mod use_cases;

pub use app::App;
