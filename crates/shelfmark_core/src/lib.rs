//! `shelfmark_core`
//!
//! Core library for the platform-independent logic of Shelfmark, a personal
//! book tracker. The crate owns the versioned per-user data store, the
//! validation and sanitization layer that guards it, the in-memory library
//! aggregate with its consistency bookkeeping, and the reading-analytics
//! engine. Rendering, routing and form handling live in the UI shells and
//! only ever talk to the types exposed here.

pub mod analytics;

pub mod auth;

pub mod backup;

pub mod library;

pub mod model;

pub mod store;

pub mod validate;
