//! Security-descriptor adapter and its storage backends.
//!
//! A backend persists only the explicit state of an object: owner, explicit
//! rules and the inheritance-blocked flag. Inherited rules are derived on
//! every read from the ancestors' inheritable rules, so they never go stale.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::descriptor::{SpecAccessRule, SpecSecurityDescriptor};
use crate::principal::Principal;
use crate::spec::{DirSecurityError, EnumErrorKind};
use crate::util::{absolutize_path, ensure_exists, validate_path_arg};

/// Default extended attribute holding the stored descriptor.
pub const C_XATTR_DESCRIPTOR_NAME: &str = "user.axiomkit.dirsec";

/// Persisted part of a security descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecStoredDescriptor {
    pub owner: Principal,
    pub rules: Vec<SpecAccessRule>,
    #[serde(default)]
    pub if_inheritance_blocked: bool,
}

/// Storage backend for per-object security state.
pub trait DescriptorStore {
    /// Stored state of `path`, `None` when nothing was ever committed.
    fn load(&self, path: &Path) -> Result<Option<SpecStoredDescriptor>, DirSecurityError>;

    /// Replace the stored state of `path` in one write.
    fn save(&self, path: &Path, stored: &SpecStoredDescriptor) -> Result<(), DirSecurityError>;

    /// Follow an entry that was renamed on disk.
    fn relocate(&self, _path_from: &Path, _path_to: &Path) {}

    /// Forget every entry at or below a deleted directory.
    fn discard_tree(&self, _path_root: &Path) {}

    /// Extended attribute owned by this backend; file copies must not carry it.
    fn reserved_attribute(&self) -> Option<&str> {
        None
    }
}

impl<S: DescriptorStore + ?Sized> DescriptorStore for &S {
    fn load(&self, path: &Path) -> Result<Option<SpecStoredDescriptor>, DirSecurityError> {
        (**self).load(path)
    }

    fn save(&self, path: &Path, stored: &SpecStoredDescriptor) -> Result<(), DirSecurityError> {
        (**self).save(path, stored)
    }

    fn relocate(&self, path_from: &Path, path_to: &Path) {
        (**self).relocate(path_from, path_to);
    }

    fn discard_tree(&self, path_root: &Path) {
        (**self).discard_tree(path_root);
    }

    fn reserved_attribute(&self) -> Option<&str> {
        (**self).reserved_attribute()
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region XattrBackend

/// Stores the descriptor as JSON in an extended attribute of the object.
/// Rename keeps it attached; `setxattr` makes each commit a single write.
#[derive(Debug, Clone)]
pub struct XattrDescriptorStore {
    name_attribute: String,
}

impl Default for XattrDescriptorStore {
    fn default() -> Self {
        Self {
            name_attribute: C_XATTR_DESCRIPTOR_NAME.to_string(),
        }
    }
}

impl XattrDescriptorStore {
    pub fn with_attribute_name(name_attribute: impl Into<String>) -> Self {
        Self {
            name_attribute: name_attribute.into(),
        }
    }

    pub fn attribute_name(&self) -> &str {
        &self.name_attribute
    }
}

#[cfg(unix)]
impl DescriptorStore for XattrDescriptorStore {
    fn load(&self, path: &Path) -> Result<Option<SpecStoredDescriptor>, DirSecurityError> {
        let raw_value = xattr::get(path, &self.name_attribute)
            .map_err(|e| DirSecurityError::from_io(path, e))?;
        let Some(raw_value) = raw_value else {
            return Ok(None);
        };
        serde_json::from_slice(&raw_value)
            .map(Some)
            .map_err(|e| DirSecurityError::MalformedDescriptor {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    fn save(&self, path: &Path, stored: &SpecStoredDescriptor) -> Result<(), DirSecurityError> {
        let raw_value =
            serde_json::to_vec(stored).map_err(|e| DirSecurityError::MalformedDescriptor {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        xattr::set(path, &self.name_attribute, &raw_value)
            .map_err(|e| DirSecurityError::from_io(path, e))
    }

    fn reserved_attribute(&self) -> Option<&str> {
        Some(&self.name_attribute)
    }
}

#[cfg(not(unix))]
impl DescriptorStore for XattrDescriptorStore {
    fn load(&self, path: &Path) -> Result<Option<SpecStoredDescriptor>, DirSecurityError> {
        Err(DirSecurityError::PlatformUnsupported {
            path: path.to_path_buf(),
            message: "Extended attributes are unsupported on this platform".to_string(),
        })
    }

    fn save(&self, path: &Path, _stored: &SpecStoredDescriptor) -> Result<(), DirSecurityError> {
        Err(DirSecurityError::PlatformUnsupported {
            path: path.to_path_buf(),
            message: "Extended attributes are unsupported on this platform".to_string(),
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MemoryBackend

/// Process-local backend keyed by absolute path. Targets must still exist on
/// disk.
#[derive(Debug, Default)]
pub struct MemoryDescriptorStore {
    dict_stored: RwLock<HashMap<PathBuf, SpecStoredDescriptor>>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dict_stored.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_stored.read().is_empty()
    }
}

impl DescriptorStore for MemoryDescriptorStore {
    fn load(&self, path: &Path) -> Result<Option<SpecStoredDescriptor>, DirSecurityError> {
        fs::symlink_metadata(path).map_err(|e| DirSecurityError::from_io(path, e))?;
        let path_key = absolutize_path(path).map_err(|e| DirSecurityError::from_io(path, e))?;
        Ok(self.dict_stored.read().get(&path_key).cloned())
    }

    fn save(&self, path: &Path, stored: &SpecStoredDescriptor) -> Result<(), DirSecurityError> {
        fs::symlink_metadata(path).map_err(|e| DirSecurityError::from_io(path, e))?;
        let path_key = absolutize_path(path).map_err(|e| DirSecurityError::from_io(path, e))?;
        self.dict_stored.write().insert(path_key, stored.clone());
        Ok(())
    }

    fn relocate(&self, path_from: &Path, path_to: &Path) {
        let (Ok(path_key_from), Ok(path_key_to)) =
            (absolutize_path(path_from), absolutize_path(path_to))
        else {
            warn!(
                source = %path_from.display(),
                destination = %path_to.display(),
                "working directory unavailable, stored descriptor not relocated"
            );
            return;
        };
        let mut dict_stored = self.dict_stored.write();
        if let Some(stored) = dict_stored.remove(&path_key_from) {
            dict_stored.insert(path_key_to, stored);
        }
    }

    fn discard_tree(&self, path_root: &Path) {
        let path_root_abs = match absolutize_path(path_root) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path_root.display(), error = %e, "stored descriptors not discarded");
                return;
            }
        };
        self.dict_stored
            .write()
            .retain(|k, _| !k.starts_with(&path_root_abs));
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Adapter

/// Reads and commits [`SpecSecurityDescriptor`]s through a backend.
#[derive(Debug)]
pub struct SecurityAdapter<S> {
    store: S,
}

impl<S: DescriptorStore> SecurityAdapter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current descriptor of `path`: stored explicit state plus rules
    /// inherited from its ancestors.
    pub fn read(&self, path: &Path) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        validate_path_arg(path)?;
        let meta = fs::metadata(path).map_err(|e| DirSecurityError::from_io(path, e))?;
        let stored = match self.store.load(path)? {
            Some(v) => v,
            None => default_stored(&meta),
        };

        let mut l_rules: Vec<SpecAccessRule> =
            stored.rules.iter().map(SpecAccessRule::as_explicit).collect();
        if !stored.if_inheritance_blocked {
            l_rules.extend(self.derive_inherited(path, meta.is_dir())?);
        }
        Ok(SpecSecurityDescriptor::from_parts(
            stored.owner,
            l_rules,
            stored.if_inheritance_blocked,
        ))
    }

    /// Overwrite the stored state of `path` with `descriptor`. Inherited
    /// rules are not written. Concurrent writers between read and commit are
    /// not detected.
    pub fn commit(
        &self,
        path: &Path,
        descriptor: &SpecSecurityDescriptor,
    ) -> Result<(), DirSecurityError> {
        validate_path_arg(path)?;
        ensure_exists(path)?;
        let stored = SpecStoredDescriptor {
            owner: descriptor.owner().clone(),
            rules: descriptor.explicit_rules().cloned().collect(),
            if_inheritance_blocked: descriptor.is_inheritance_blocked(),
        };
        self.store.save(path, &stored)?;
        debug!(path = %path.display(), n_rules = stored.rules.len(), "descriptor committed");
        Ok(())
    }

    fn derive_inherited(
        &self,
        path: &Path,
        if_is_dir: bool,
    ) -> Result<Vec<SpecAccessRule>, DirSecurityError> {
        let path_abs = absolutize_path(path).map_err(|e| DirSecurityError::from_io(path, e))?;

        // Nearest ancestor first; stop at a blocked or unreadable ancestor.
        let mut l_chain: Vec<SpecStoredDescriptor> = Vec::new();
        let mut path_cursor = path_abs.parent();
        while let Some(path_ancestor) = path_cursor {
            let stored = match self.store.load(path_ancestor) {
                Ok(v) => v,
                Err(e)
                    if matches!(
                        e.kind(),
                        EnumErrorKind::AccessDenied
                            | EnumErrorKind::PlatformUnsupported
                            | EnumErrorKind::NotFound
                    ) =>
                {
                    debug!(path = %path_ancestor.display(), error = %e, "inheritance chain cut");
                    break;
                }
                Err(e) => return Err(e),
            };
            let b_blocked = stored.as_ref().is_some_and(|s| s.if_inheritance_blocked);
            if let Some(stored) = stored {
                l_chain.push(stored);
            } else {
                l_chain.push(SpecStoredDescriptor {
                    owner: Principal::nobody(),
                    rules: Vec::new(),
                    if_inheritance_blocked: false,
                });
            }
            if b_blocked {
                break;
            }
            path_cursor = path_ancestor.parent();
        }

        let mut l_inherited: Vec<SpecAccessRule> = Vec::new();
        let n_chain = l_chain.len();
        for (n_idx, stored) in l_chain.into_iter().rev().enumerate() {
            let b_is_parent = n_idx + 1 == n_chain;
            let b_child_is_dir = !b_is_parent || if_is_dir;
            l_inherited = stored
                .rules
                .iter()
                .chain(l_inherited.iter())
                .filter_map(|r| r.inherited_by(b_child_is_dir))
                .collect();
        }
        Ok(l_inherited)
    }
}

fn default_stored(meta: &fs::Metadata) -> SpecStoredDescriptor {
    #[cfg(unix)]
    let owner = {
        use std::os::unix::fs::MetadataExt;
        Principal::from_unix_uid(meta.uid())
    };
    #[cfg(not(unix))]
    let owner = {
        let _ = meta;
        Principal::nobody()
    };
    SpecStoredDescriptor {
        owner,
        rules: Vec::new(),
        if_inheritance_blocked: false,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
