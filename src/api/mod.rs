//! Purpose: Define the public record-level API for VistA store exploration.
//! Exports: Resolvers, aggregation types and the core types callers need with them.
//! Role: Additive-only surface used by the CLI; hides helper plumbing.
//! Invariants: Every operation here is read-only.
//! Invariants: Missing entries are NotFound; unreadable optional fields degrade to placeholders.

pub mod aggregate;
pub mod catalog;
pub mod domains;
pub mod entity;
pub mod patient;
pub mod rpc;
pub mod staff;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::path::GlobalPath;
pub use crate::core::snapshot::SnapshotStore;
pub use crate::core::store::{Store, StoreSource};
pub use crate::core::traverse::{DisplayOptions, Listing, NodeView, Policy, SafeReader};
pub use aggregate::{AggregateOptions, Aggregator, PatientRecord, SearchOutcome};
pub use catalog::{FileEntry, FileListing, FileRef, GlobalEntry, GlobalListing, list_files, list_globals};
pub use entity::Page;
pub use patient::{Candidate, PatientIdentity, PatientResolver};
pub use rpc::{RpcDefinition, RpcParameter, RpcResolver};
pub use staff::{StaffMember, StaffResolver};
