//! Shop Next Door Core - Shared domain types.
//!
//! This crate provides the types used across all Shop Next Door components:
//! - `marketplace` - The web application (customers, vendors, admins)
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Status lifecycles live here so that every caller
//! validates transitions the same way.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, phone numbers, money, and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
