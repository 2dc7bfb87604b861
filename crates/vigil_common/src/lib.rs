//! Vigil Common - shared model, configuration and text-generation client.
//!
//! Used by the vigild daemon and its tests.

pub mod config;
pub mod decode;
pub mod llm_client;
pub mod model;

pub use config::*;
pub use decode::{decode_reply, scrape_bug, truncate_chars, Decoded, Recovery, ScrapedBug};
pub use llm_client::*;
pub use model::*;
