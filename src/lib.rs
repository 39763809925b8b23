//! DrainScope library
//!
//! This module exposes the core functionality for use in tests
//! and as a library.

pub mod core;
pub mod engine;
pub mod i18n;
pub mod labels;
pub mod policy;
pub mod service;
pub mod source;
pub mod store;
