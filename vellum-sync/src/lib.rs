//! # vellum-sync
//!
//! Diff-based synchronization of staged deposits into preserved objects.
//!
//! [`Engine::generate_diff`] inspects a staged location and diffs it against
//! the current tree; [`Engine::execute`] applies the resulting changeset in
//! one repository transaction and stamps the new version.

pub mod browse;
pub mod checksum;
pub mod differ;
pub mod error;
pub mod executor;
pub mod export;
pub mod fedora;
pub mod graph;
pub mod inspect;
pub mod loader;
pub mod memory;
pub mod pipeline;
pub mod repository;
pub mod store;
pub mod structure;
pub mod transaction;
pub mod versions;

pub use browse::ResourceView;
pub use error::SyncError;
pub use export::ExportedFile;
pub use pipeline::Engine;
pub use repository::{Repository, RequestOptions};
pub use store::{FsObjectStore, Location, ObjectStore};
pub use structure::Target;
pub use versions::{OcflStorage, StorageLayer};
