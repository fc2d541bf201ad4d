//! Domain models for memoize.
//!
//! # Core Concepts
//!
//! - [`User`]: The signed-in account. The whole document (profile plus notes) is
//!   persisted locally as one JSON blob and exchanged wholesale with `/user/sync`.
//! - [`Note`]: A client-owned note. Deletion is a soft flag; tombstones stay in
//!   the collection and are sent to the server like any other note.
//! - [`NoteDraft`]: What an editor session produces when the user leaves it.
//!
//! Wire envelopes for the REST API live in [`api`].

pub mod api;
mod note;
mod user;

pub use note::*;
pub use user::*;
