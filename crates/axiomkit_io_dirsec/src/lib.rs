//! `axiomkit_io_dirsec` v1:
//! Rust-side directory security and replication engine.
//!
//! Modules:
//! - `principal`  : security principals (SID form) and lookup seam
//! - `rights`     : right bit flags and the abstract right catalog
//! - `descriptor` : access rules and security descriptors
//! - `store`      : descriptor backends and the read/commit adapter
//! - `engine`     : rule edits, inheritance blocking, grants
//! - `owner`      : ownership transfer
//! - `replicate`  : clone/copy/move of directory trees, tree size
//! - `report`     : run-time report and step journal
//! - `events`     : event-log collaborator
//! - `spec`       : enums/options/errors
//! - `util`       : shared helper functions

pub mod descriptor;
pub mod engine;
pub mod events;
pub mod owner;
pub mod principal;
pub mod replicate;
pub mod report;
pub mod rights;
pub mod spec;
pub mod store;
mod util;

pub use descriptor::{SpecAccessRule, SpecSecurityDescriptor};
pub use engine::{AccessRuleEngine, plan_grant};
pub use events::{EnumEventSeverity, EventLog, MemoryEventLog, SpecEvent, SpecEventFilter};
pub use owner::OwnershipManager;
pub use principal::{Principal, PrincipalSource, resolve_principal};
pub use replicate::{DirectoryReplicator, size_in_bytes};
pub use report::{EnumReplicateStep, ReportReplicate, ReportReplicateBuilder};
pub use rights::{EnumAbstractRight, EnumFileSystemRight, RightFlags};
pub use spec::{
    DirSecurityError, EnumAccessEffect, EnumCopyPatternMode, EnumErrorKind, EnumInheritance,
    EnumInheritedRuleMode, EnumPropagation, SpecReplicateOptions,
};
pub use store::{
    C_XATTR_DESCRIPTOR_NAME, DescriptorStore, MemoryDescriptorStore, SecurityAdapter,
    SpecStoredDescriptor, XattrDescriptorStore,
};
