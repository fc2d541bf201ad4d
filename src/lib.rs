//! Offline-first notes client with best-effort whole-collection cloud sync.
//!
//! The local store is authoritative for reads. Every mutation is persisted
//! locally first and pushed to the API afterwards when connectivity allows;
//! the server's answer then replaces the local copy.

pub mod api;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod editor;
pub mod models;
pub mod session;
pub mod store;
