//! Dripmail: multi-step email outreach orchestration.

pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod llm;
pub mod mail;
pub mod model;
pub mod queue;
pub mod store;
pub mod upload;

pub use error::{Error, Result};
