//! Rule enums, replication options and the crate error type.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::SpecSecurityDescriptor;
use crate::report::ReportReplicate;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Object kinds that inherit an access rule from a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumInheritance {
    /// Rule applies to the object itself only.
    None,
    /// Rule flows to subdirectories.
    ContainerInherit,
    /// Rule flows to files.
    ObjectInherit,
    /// Rule flows to subdirectories and files.
    ContainerAndObjectInherit,
}

impl EnumInheritance {
    pub fn from_flags(if_container: bool, if_object: bool) -> Self {
        match (if_container, if_object) {
            (false, false) => Self::None,
            (true, false) => Self::ContainerInherit,
            (false, true) => Self::ObjectInherit,
            (true, true) => Self::ContainerAndObjectInherit,
        }
    }

    pub fn is_container_inherit(self) -> bool {
        matches!(self, Self::ContainerInherit | Self::ContainerAndObjectInherit)
    }

    pub fn is_object_inherit(self) -> bool {
        matches!(self, Self::ObjectInherit | Self::ContainerAndObjectInherit)
    }
}

/// Modifiers controlling how far an inheritable rule travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumPropagation {
    /// Inherited by all descendants, and applies to the object itself.
    None,
    /// Inherited by immediate children only.
    NoPropagateInherit,
    /// Does not apply to the object itself, only to descendants.
    InheritOnly,
    /// Immediate children only, and not the object itself.
    NoPropagateInheritOnly,
}

impl EnumPropagation {
    pub fn from_flags(if_no_propagate: bool, if_inherit_only: bool) -> Self {
        match (if_no_propagate, if_inherit_only) {
            (false, false) => Self::None,
            (true, false) => Self::NoPropagateInherit,
            (false, true) => Self::InheritOnly,
            (true, true) => Self::NoPropagateInheritOnly,
        }
    }

    pub fn is_no_propagate(self) -> bool {
        matches!(self, Self::NoPropagateInherit | Self::NoPropagateInheritOnly)
    }

    pub fn is_inherit_only(self) -> bool {
        matches!(self, Self::InheritOnly | Self::NoPropagateInheritOnly)
    }
}

/// Whether a rule grants or withholds its rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumAccessEffect {
    Allow,
    Deny,
}

/// How a cloned directory treats the rules its source inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumInheritedRuleMode {
    /// Copy explicit rules and keep inheritance live when the new parent
    /// hands down the same rules as the source's parent. Otherwise fall
    /// back to [`Self::Materialize`].
    #[default]
    Rederive,
    /// Write the source's inherited rules as explicit rules, deny before
    /// allow, and block inheritance.
    Materialize,
}

/// Pattern matching mode for exclude lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumCopyPatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    #[default]
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

/// Failure cause, independent of the path or payload attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumErrorKind {
    InvalidArgument,
    NotFound,
    AccessDenied,
    PlatformUnsupported,
    NonCanonicalState,
    PartialFailure,
    AlreadyExists,
    MalformedDescriptor,
    Io,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Input options for [`crate::DirectoryReplicator`].
#[derive(Debug, Clone)]
pub struct SpecReplicateOptions {
    /// Treatment of the source's inherited rules when cloning a directory.
    pub rule_inherited: EnumInheritedRuleMode,
    /// Exclude patterns applied to file basenames during copy.
    pub patterns_exclude_files: Option<Vec<String>>,
    /// Exclude patterns applied to directory basenames during copy.
    pub patterns_exclude_dirs: Option<Vec<String>>,
    /// Pattern interpretation mode.
    pub rule_pattern: EnumCopyPatternMode,
    /// Carry permissions, timestamps and user xattrs onto copied files.
    pub if_preserve_file_metadata: bool,
}

impl Default for SpecReplicateOptions {
    fn default() -> Self {
        Self {
            rule_inherited: EnumInheritedRuleMode::Rederive,
            patterns_exclude_files: None,
            patterns_exclude_dirs: None,
            rule_pattern: EnumCopyPatternMode::Glob,
            if_preserve_file_metadata: true,
        }
    }
}

/// Errors raised by descriptor, rule, ownership and replication operations.
#[derive(Debug, Error)]
pub enum DirSecurityError {
    /// Empty path, empty rights, malformed principal, bad pattern.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Target path does not exist.
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Insufficient privilege on the target.
    #[error("Access denied: {} ({message})", .path.display())]
    AccessDenied { path: PathBuf, message: String },
    /// Security state cannot be stored or queried here.
    #[error("Security descriptors unsupported at {} ({message})", .path.display())]
    PlatformUnsupported { path: PathBuf, message: String },
    /// Rule list is out of canonical order; inheritance cannot be stripped safely.
    #[error("Access rules are not in canonical order: {}", .0.display())]
    NonCanonicalState(PathBuf),
    /// Destination entry already exists and overwriting was not requested.
    #[error("Destination exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    /// Stored security state could not be decoded.
    #[error("Malformed security descriptor at {}: {message}", .path.display())]
    MalformedDescriptor { path: PathBuf, message: String },
    /// Any other I/O failure.
    #[error("I/O failure at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A grant applied some of its rules before failing.
    #[error("Grant stopped after {n_rules_applied} rule(s): {source}")]
    PartialGrant {
        /// Descriptor as of the last rule that was applied.
        descriptor: Box<SpecSecurityDescriptor>,
        n_rules_applied: usize,
        #[source]
        source: Box<DirSecurityError>,
    },
    /// A replication completed some steps before failing.
    #[error("Replication stopped after {} step(s): {source}", .report.l_steps.len())]
    PartialReplicate {
        /// Journal of the steps that completed.
        report: Box<ReportReplicate>,
        #[source]
        source: Box<DirSecurityError>,
    },
}

impl DirSecurityError {
    pub fn kind(&self) -> EnumErrorKind {
        match self {
            Self::InvalidArgument(_) => EnumErrorKind::InvalidArgument,
            Self::NotFound(_) => EnumErrorKind::NotFound,
            Self::AccessDenied { .. } => EnumErrorKind::AccessDenied,
            Self::PlatformUnsupported { .. } => EnumErrorKind::PlatformUnsupported,
            Self::NonCanonicalState(_) => EnumErrorKind::NonCanonicalState,
            Self::AlreadyExists(_) => EnumErrorKind::AlreadyExists,
            Self::MalformedDescriptor { .. } => EnumErrorKind::MalformedDescriptor,
            Self::Io { .. } => EnumErrorKind::Io,
            Self::PartialGrant { .. } | Self::PartialReplicate { .. } => {
                EnumErrorKind::PartialFailure
            }
        }
    }

    /// Cause of the failure, looking through partial-progress wrappers.
    pub fn root_kind(&self) -> EnumErrorKind {
        match self {
            Self::PartialGrant { source, .. } | Self::PartialReplicate { source, .. } => {
                source.root_kind()
            }
            _ => self.kind(),
        }
    }

    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        if is_unsupported_io(&err) {
            return Self::PlatformUnsupported {
                path: path.to_path_buf(),
                message: err.to_string(),
            };
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

fn is_unsupported_io(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if let Some(code) = err.raw_os_error() {
            return code == libc::ENOTSUP || code == libc::EOPNOTSUPP || code == libc::ENOSYS;
        }
    }
    err.kind() == io::ErrorKind::Unsupported
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
