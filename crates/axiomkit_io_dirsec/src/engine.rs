//! Access-rule management on security descriptors.
//!
//! Every operation takes the descriptor by value and hands back the updated
//! one. With `if_commit` the result is also written through the adapter;
//! otherwise only the returned value reflects the change.

use std::path::Path;

use tracing::debug;

use crate::descriptor::{SpecAccessRule, SpecSecurityDescriptor};
use crate::principal::Principal;
use crate::rights::{EnumAbstractRight, RightFlags};
use crate::spec::{DirSecurityError, EnumInheritance};
use crate::store::{DescriptorStore, SecurityAdapter};
use crate::util::{ensure_exists, validate_path_arg};

/// Rule operations bound to one adapter.
#[derive(Debug)]
pub struct AccessRuleEngine<'a, S> {
    adapter: &'a SecurityAdapter<S>,
}

/// Rules a grant would add, in application order: for each named right of
/// the catalog entry, a container-inherit rule then an object-inherit rule.
pub fn plan_grant(
    right: EnumAbstractRight,
    principal: &Principal,
    if_apply_containers: bool,
    if_apply_objects: bool,
) -> Vec<SpecAccessRule> {
    let mut l_rules = Vec::new();
    for named in right.underlying_rights() {
        if if_apply_containers {
            l_rules.push(SpecAccessRule::allow(
                principal.clone(),
                named.flags(),
                EnumInheritance::ContainerInherit,
            ));
        }
        if if_apply_objects {
            l_rules.push(SpecAccessRule::allow(
                principal.clone(),
                named.flags(),
                EnumInheritance::ObjectInherit,
            ));
        }
    }
    l_rules
}

impl<'a, S: DescriptorStore> AccessRuleEngine<'a, S> {
    pub fn new(adapter: &'a SecurityAdapter<S>) -> Self {
        Self { adapter }
    }

    /// Append `rule` to the explicit rules. Identical rules are not merged.
    pub fn add_rule(
        &self,
        path: &Path,
        mut descriptor: SpecSecurityDescriptor,
        rule: SpecAccessRule,
        if_commit: bool,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        validate_path_arg(path)?;
        if rule.rights.is_empty() {
            return Err(DirSecurityError::InvalidArgument(
                "Access rule grants no rights".to_string(),
            ));
        }
        ensure_exists(path)?;

        debug!(
            path = %path.display(),
            principal = %rule.principal,
            rights = ?rule.rights,
            inheritance = ?rule.rule_inheritance,
            "add rule"
        );
        descriptor.push_explicit(rule);
        self.commit_if(path, &descriptor, if_commit)?;
        Ok(descriptor)
    }

    /// Detach the descriptor from its parent's rules. With
    /// `if_preserve_inherited` the inherited rules are first copied down as
    /// explicit rules, leaving effective access unchanged.
    pub fn block_inheritance(
        &self,
        path: &Path,
        mut descriptor: SpecSecurityDescriptor,
        if_preserve_inherited: bool,
        if_commit: bool,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        validate_path_arg(path)?;
        ensure_exists(path)?;
        if !descriptor.is_canonical() {
            return Err(DirSecurityError::NonCanonicalState(path.to_path_buf()));
        }

        if if_preserve_inherited {
            descriptor.materialize_inherited();
        } else {
            descriptor.drop_inherited();
        }
        descriptor.set_inheritance_blocked(true);
        debug!(path = %path.display(), preserve = if_preserve_inherited, "inheritance blocked");
        self.commit_if(path, &descriptor, if_commit)?;
        Ok(descriptor)
    }

    /// Drop every rule, explicit and inherited. Inherited rules come back on
    /// the next read unless inheritance is blocked.
    pub fn remove_all_rules(
        &self,
        path: &Path,
        mut descriptor: SpecSecurityDescriptor,
        if_commit: bool,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        validate_path_arg(path)?;
        ensure_exists(path)?;
        let n_removed = descriptor.rules().len();
        descriptor.clear_rules();
        debug!(path = %path.display(), n_removed, "all rules removed");
        self.commit_if(path, &descriptor, if_commit)?;
        Ok(descriptor)
    }

    /// Re-read `path` and strip its explicit rules, keeping inherited ones.
    /// Uncommitted changes in `descriptor` are discarded.
    pub fn remove_all_explicit_rules(
        &self,
        path: &Path,
        descriptor: SpecSecurityDescriptor,
        if_commit: bool,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        let mut desc_fresh = self.adapter.read(path)?;
        if desc_fresh != descriptor {
            debug!(path = %path.display(), "discarding uncommitted descriptor state");
        }
        desc_fresh.drop_explicit();
        self.commit_if(path, &desc_fresh, if_commit)?;
        Ok(desc_fresh)
    }

    /// Grant `right` to `principal` as one allow rule per named right and
    /// per enabled target kind.
    ///
    /// Rules are applied one by one. When a later rule fails after earlier
    /// ones were applied (and committed, with `if_commit`), the error is
    /// [`DirSecurityError::PartialGrant`] carrying the descriptor as of the
    /// last applied rule; the remaining rules of [`plan_grant`] can be
    /// retried from there.
    #[allow(clippy::too_many_arguments)]
    pub fn grant_rights(
        &self,
        right: EnumAbstractRight,
        principal: &Principal,
        path: &Path,
        descriptor: SpecSecurityDescriptor,
        if_apply_containers: bool,
        if_apply_objects: bool,
        if_commit: bool,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        let l_rules = plan_grant(right, principal, if_apply_containers, if_apply_objects);
        if l_rules.is_empty() {
            debug!(path = %path.display(), %right, "grant targets nothing");
            return Ok(descriptor);
        }

        let mut desc_current = descriptor;
        for (n_idx, rule) in l_rules.into_iter().enumerate() {
            let desc_before = desc_current.clone();
            match self.add_rule(path, desc_current, rule, if_commit) {
                Ok(v) => desc_current = v,
                Err(e) if n_idx == 0 => return Err(e),
                Err(e) => {
                    return Err(DirSecurityError::PartialGrant {
                        descriptor: Box::new(desc_before),
                        n_rules_applied: n_idx,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(desc_current)
    }

    /// Rules of `descriptor`, filtered by origin.
    pub fn rules<'d>(
        &self,
        descriptor: &'d SpecSecurityDescriptor,
        if_include_explicit: bool,
        if_include_inherited: bool,
    ) -> Vec<&'d SpecAccessRule> {
        descriptor
            .rules()
            .iter()
            .filter(|r| {
                if r.if_inherited {
                    if_include_inherited
                } else {
                    if_include_explicit
                }
            })
            .collect()
    }

    pub fn effective_rights(
        &self,
        descriptor: &SpecSecurityDescriptor,
        principal: &Principal,
    ) -> RightFlags {
        descriptor.effective_rights(principal)
    }

    fn commit_if(
        &self,
        path: &Path,
        descriptor: &SpecSecurityDescriptor,
        if_commit: bool,
    ) -> Result<(), DirSecurityError> {
        if if_commit {
            self.adapter.commit(path, descriptor)?;
        }
        Ok(())
    }
}
