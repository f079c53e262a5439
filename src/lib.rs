//! Collaborative shopping lists.
//!
//! Owners share lists by link or by email invitation with an editor or
//! viewer role. Every open view follows a change feed so edits by other
//! members show up without reloading. Rendered text can be machine
//! translated through a cached overlay.

pub mod access;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod feed;
pub mod models;
pub mod server;
pub mod translate;
pub mod views;
