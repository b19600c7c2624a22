//! Domain model for articles and auth sessions.
//!
//! # Responsibility
//! - Define the records exchanged with the hosted backend.
//! - Define the display projection derived from session state.
//!
//! # Invariants
//! - Every article is identified by a server-assigned `ArticleId`.
//! - An article's owning `user_id` never changes after creation.

pub mod article;
pub mod session;
