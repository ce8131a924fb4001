//! Shop Next Door marketplace library.
//!
//! The web application is built as a library so the binary, the CLI and the
//! integration tests all share the same router, repositories and services.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod mpesa;
pub mod routes;
pub mod services;
pub mod state;
