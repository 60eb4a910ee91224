//! Lab Inventory Library
//!
//! Core functionality for the lab inventory tool: a CSV codec, the typed
//! inventory tables, a client for the content repository that stores them, a
//! read-side fallback chain, and the data manager that ties reads, name
//! resolution and conflict-checked writes together.

pub mod cli;
pub mod config;
pub mod csv_handler;
pub mod entities;
pub mod error;
pub mod manager;
pub mod remote;
pub mod sources;
pub mod util;
