//! Route metadata and access control for screen transitions.

pub mod guard;
pub mod routes;
