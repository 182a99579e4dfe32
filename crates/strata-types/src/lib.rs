//! Shared types, the setting store tree, and the persistence adapter trait for Strata.
//!
//! This crate contains the foundational types that are shared between the
//! engine crate and all adapter implementations. Adapters only need this
//! crate to implement `ConfigAdapter`, so they build independently of the
//! engine.

#![forbid(unsafe_code)]

pub mod config_adapter;
pub mod error;
pub mod prelude;
pub mod store;
pub mod types;
pub mod value;

// vim: ts=4
