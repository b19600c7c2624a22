//! Resource gateways: typed domain operations over backend protocols.
//!
//! # Responsibility
//! - Keep stores decoupled from query/storage details.
//! - Hold no state between calls.

pub mod article_gateway;
