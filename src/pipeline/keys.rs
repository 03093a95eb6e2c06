//! Key naming for one namespace.
//!
//! ```text
//! index   {namespace}_{ownerHex}_set
//! counter {namespace}_{ownerHex}_idx
//! value   {namespace}_{sequence}              (Shared)
//!         {namespace}_{ownerHex}_{sequence}   (OwnerScoped)
//! ```
//!
//! Index members are the value keys themselves.

use crate::config::ValueKeyLayout;
use crate::domain::ports::{OwnerId, SequenceKey};
use crate::error::{Error, Result};

/// Generates and parses the keys of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
    layout: ValueKeyLayout,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>, layout: ValueKeyLayout) -> Self {
        Self {
            namespace: namespace.into(),
            layout,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn owner_prefix(&self, owner: OwnerId) -> String {
        format!("{}_{:x}", self.namespace, owner)
    }

    /// Sorted index of an owner's value keys.
    pub fn index_key(&self, owner: OwnerId) -> String {
        format!("{}_set", self.owner_prefix(owner))
    }

    /// Atomic sequence counter of an owner.
    pub fn counter_key(&self, owner: OwnerId) -> String {
        format!("{}_idx", self.owner_prefix(owner))
    }

    /// Key of one value blob; also the member stored in the owner's index.
    pub fn value_key(&self, owner: OwnerId, key: SequenceKey) -> String {
        match self.layout {
            ValueKeyLayout::Shared => format!("{}_{}", self.namespace, key),
            ValueKeyLayout::OwnerScoped => format!("{}_{}", self.owner_prefix(owner), key),
        }
    }

    /// Recover the sequence key embedded in an index member.
    pub fn parse_member(&self, owner: OwnerId, member: &str) -> Result<SequenceKey> {
        let prefix = match self.layout {
            ValueKeyLayout::Shared => format!("{}_", self.namespace),
            ValueKeyLayout::OwnerScoped => format!("{}_", self.owner_prefix(owner)),
        };

        member
            .strip_prefix(prefix.as_str())
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(SequenceKey)
            .ok_or_else(|| Error::MemberDecode {
                member: member.to_string(),
            })
    }
}
