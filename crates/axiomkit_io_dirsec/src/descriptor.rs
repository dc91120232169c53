//! In-memory access rules and security descriptors.

use serde::{Deserialize, Serialize};

use crate::principal::Principal;
use crate::rights::RightFlags;
use crate::spec::{EnumAccessEffect, EnumInheritance, EnumPropagation};

/// One access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecAccessRule {
    pub principal: Principal,
    pub rights: RightFlags,
    pub rule_inheritance: EnumInheritance,
    pub rule_propagation: EnumPropagation,
    pub rule_effect: EnumAccessEffect,
    /// Set on rules derived from an ancestor; never persisted.
    #[serde(skip)]
    pub if_inherited: bool,
}

impl SpecAccessRule {
    pub fn allow(principal: Principal, rights: RightFlags, rule_inheritance: EnumInheritance) -> Self {
        Self {
            principal,
            rights,
            rule_inheritance,
            rule_propagation: EnumPropagation::None,
            rule_effect: EnumAccessEffect::Allow,
            if_inherited: false,
        }
    }

    pub fn deny(principal: Principal, rights: RightFlags, rule_inheritance: EnumInheritance) -> Self {
        Self {
            rule_effect: EnumAccessEffect::Deny,
            ..Self::allow(principal, rights, rule_inheritance)
        }
    }

    pub fn with_propagation(mut self, rule_propagation: EnumPropagation) -> Self {
        self.rule_propagation = rule_propagation;
        self
    }

    /// Same grant, marked explicit.
    pub fn as_explicit(&self) -> Self {
        Self {
            if_inherited: false,
            ..self.clone()
        }
    }

    /// Whether the rule takes part in access checks on the object carrying it.
    pub fn applies_to_object(&self) -> bool {
        !self.rule_propagation.is_inherit_only()
    }

    /// Copy of this rule as seen by a child of the directory carrying it,
    /// or `None` when the child does not inherit it.
    pub fn inherited_by(&self, if_child_is_dir: bool) -> Option<Self> {
        let b_no_propagate = self.rule_propagation.is_no_propagate();
        let (rule_inheritance, rule_propagation) = if if_child_is_dir {
            if self.rule_inheritance.is_container_inherit() {
                if b_no_propagate {
                    (EnumInheritance::None, EnumPropagation::None)
                } else {
                    (self.rule_inheritance, EnumPropagation::None)
                }
            } else if self.rule_inheritance.is_object_inherit() && !b_no_propagate {
                // Passes through the subdirectory to reach its files.
                (EnumInheritance::ObjectInherit, EnumPropagation::InheritOnly)
            } else {
                return None;
            }
        } else if self.rule_inheritance.is_object_inherit() {
            (EnumInheritance::None, EnumPropagation::None)
        } else {
            return None;
        };

        Some(Self {
            principal: self.principal.clone(),
            rights: self.rights,
            rule_inheritance,
            rule_propagation,
            rule_effect: self.rule_effect,
            if_inherited: true,
        })
    }
}

/// Owner, ordered rules (explicit first, then inherited) and the
/// inheritance-blocked flag of one filesystem object.
///
/// Obtained from [`crate::SecurityAdapter::read`] and changed only through
/// the rule engine and ownership manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSecurityDescriptor {
    owner: Principal,
    l_rules: Vec<SpecAccessRule>,
    if_inheritance_blocked: bool,
}

impl SpecSecurityDescriptor {
    pub(crate) fn from_parts(
        owner: Principal,
        l_rules: Vec<SpecAccessRule>,
        if_inheritance_blocked: bool,
    ) -> Self {
        Self {
            owner,
            l_rules,
            if_inheritance_blocked,
        }
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn rules(&self) -> &[SpecAccessRule] {
        &self.l_rules
    }

    pub fn explicit_rules(&self) -> impl Iterator<Item = &SpecAccessRule> {
        self.l_rules.iter().filter(|r| !r.if_inherited)
    }

    pub fn inherited_rules(&self) -> impl Iterator<Item = &SpecAccessRule> {
        self.l_rules.iter().filter(|r| r.if_inherited)
    }

    pub fn is_inheritance_blocked(&self) -> bool {
        self.if_inheritance_blocked
    }

    /// Explicit rules precede inherited ones, and within each section deny
    /// rules precede allow rules.
    pub fn is_canonical(&self) -> bool {
        let rank = |r: &SpecAccessRule| {
            let n_section = u8::from(r.if_inherited) * 2;
            match r.rule_effect {
                EnumAccessEffect::Deny => n_section,
                EnumAccessEffect::Allow => n_section + 1,
            }
        };
        self.l_rules.windows(2).all(|w| rank(&w[0]) <= rank(&w[1]))
    }

    /// Rights `principal` effectively holds on this object: allowed bits of
    /// applicable rules minus denied bits.
    pub fn effective_rights(&self, principal: &Principal) -> RightFlags {
        let mut rights_allow = RightFlags::empty();
        let mut rights_deny = RightFlags::empty();
        for rule in self
            .l_rules
            .iter()
            .filter(|r| &r.principal == principal && r.applies_to_object())
        {
            match rule.rule_effect {
                EnumAccessEffect::Allow => rights_allow |= rule.rights,
                EnumAccessEffect::Deny => rights_deny |= rule.rights,
            }
        }
        rights_allow.difference(rights_deny)
    }

    pub(crate) fn set_owner(&mut self, owner: Principal) {
        self.owner = owner;
    }

    pub(crate) fn set_inheritance_blocked(&mut self, if_blocked: bool) {
        self.if_inheritance_blocked = if_blocked;
    }

    /// Append at the end of the explicit section.
    pub(crate) fn push_explicit(&mut self, rule: SpecAccessRule) {
        let n_idx = self
            .l_rules
            .iter()
            .position(|r| r.if_inherited)
            .unwrap_or(self.l_rules.len());
        self.l_rules.insert(n_idx, rule.as_explicit());
    }

    /// Turn inherited rules into explicit ones, keeping deny-before-allow.
    pub(crate) fn materialize_inherited(&mut self) {
        for rule in &mut self.l_rules {
            rule.if_inherited = false;
        }
        self.l_rules
            .sort_by_key(|r| matches!(r.rule_effect, EnumAccessEffect::Allow));
    }

    pub(crate) fn drop_inherited(&mut self) {
        self.l_rules.retain(|r| !r.if_inherited);
    }

    pub(crate) fn drop_explicit(&mut self) {
        self.l_rules.retain(|r| r.if_inherited);
    }

    pub(crate) fn clear_rules(&mut self) {
        self.l_rules.clear();
    }
}
