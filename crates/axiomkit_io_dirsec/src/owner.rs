//! Ownership transfer.

use std::path::Path;

use tracing::debug;

use crate::descriptor::SpecSecurityDescriptor;
use crate::principal::Principal;
use crate::spec::DirSecurityError;
use crate::store::{DescriptorStore, SecurityAdapter};
use crate::util::{ensure_exists, validate_path_arg};

#[derive(Debug)]
pub struct OwnershipManager<'a, S> {
    adapter: &'a SecurityAdapter<S>,
}

impl<'a, S: DescriptorStore> OwnershipManager<'a, S> {
    pub fn new(adapter: &'a SecurityAdapter<S>) -> Self {
        Self { adapter }
    }

    /// Make `principal` the owner of `path`, committing when `if_commit`.
    pub fn set_owner(
        &self,
        path: &Path,
        mut descriptor: SpecSecurityDescriptor,
        principal: Principal,
        if_commit: bool,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        validate_path_arg(path)?;
        ensure_exists(path)?;
        debug!(path = %path.display(), from = %descriptor.owner(), to = %principal, "set owner");
        descriptor.set_owner(principal);
        if if_commit {
            self.adapter.commit(path, &descriptor)?;
        }
        Ok(descriptor)
    }
}
