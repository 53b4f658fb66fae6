//! Wiki page storage with slug-consistent renames.
//!
//! Pages live in regions and are identified by a slug derived from their
//! name. Renaming a page re-creates it under the new slug, leaves a redirect
//! at the old one, and carries its attachments, redirects, and tags along.
//! Everything is stored in one SQLite database.

pub mod content;
pub mod db;
pub mod history;
pub mod models;
pub mod output;
pub mod related;
pub mod rename;
pub mod repo;
pub mod slug;

pub use db::WikiError;
