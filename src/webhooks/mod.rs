//! Webhook handling for GitHub events.
//!
//! This module provides:
//! - Classification of deliveries by the `X-GitHub-Event` header
//! - Validation of `push` payloads into typed events

pub mod events;
pub mod parser;

pub use events::{EventKind, HEADER_EVENT, PushCommit, PushEvent};
pub use parser::{ParseError, parse_push};
