//! Validation layer
//!
//! Three pieces with one shared policy: pure predicates over entities
//! ([`rules`]), the two-phase image acceptor ([`image`]), and the
//! sanitizing pipeline ([`sanitize`]) that applies both to a whole
//! [`crate::model::StorageData`] blob. The same predicates back two
//! different failure policies: drop-and-log when reading stored data,
//! block-and-report when admitting new data (see [`crate::library`]).

pub mod image;

pub mod rules;

pub mod sanitize;
