//! Reactive client-side stores.
//!
//! Stores own shared state behind `tokio::sync::watch` channels and are
//! handed to consumers through `AppContext`.

pub mod article_store;
pub mod session_store;
