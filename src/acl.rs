//! Access-control lists.
//!
//! An [`Acl`] is the ordered list of access-control entries of one object,
//! owned exclusively by that object. Local edits only mark the list dirty;
//! persistence happens solely as the ACL aspect of the owning object's
//! save, which keeps ACL changes ordered relative to attribute and filing
//! changes.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::Result;
use crate::transport::Transport;
use crate::wire::WireAce;

/// One (principal, permission set) pair of an object's ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// Principal identifier.
    pub principal: String,
    /// Permission names granted to the principal.
    pub permissions: BTreeSet<String>,
    /// Directly assigned, as opposed to inherited from a parent.
    pub direct: bool,
}

/// The access-control entry list of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Acl {
    href: String,
    entries: Vec<AclEntry>,
    dirty: bool,
}

impl Acl {
    pub(crate) fn new(href: String, aces: Vec<WireAce>) -> Self {
        let entries = aces.into_iter().map(AclEntry::from_wire).collect();
        Self { href, entries, dirty: false }
    }

    /// The entries in repository order; inherited entries included.
    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Whether local edits have not been persisted yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Grant permissions to a principal, adding a direct entry if none
    /// exists. A no-op grant does not mark the list dirty.
    pub fn grant<I, S>(&mut self, principal: &str, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let permissions: BTreeSet<String> = permissions.into_iter().map(Into::into).collect();
        if permissions.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|e| e.direct && e.principal == principal) {
            Some(entry) => {
                let before = entry.permissions.len();
                entry.permissions.extend(permissions);
                if entry.permissions.len() != before {
                    self.dirty = true;
                }
            }
            None => {
                self.entries.push(AclEntry {
                    principal: principal.to_string(),
                    permissions,
                    direct: true,
                });
                self.dirty = true;
            }
        }
    }

    /// Revoke permissions from a principal's direct entry. Inherited
    /// entries cannot be edited here. Revoking the last permission drops
    /// the entry.
    pub fn revoke<'a, I>(&mut self, principal: &str, permissions: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(index) =
            self.entries.iter().position(|e| e.direct && e.principal == principal)
        else {
            return;
        };
        let entry = &mut self.entries[index];
        for permission in permissions {
            if entry.permissions.remove(permission) {
                self.dirty = true;
            }
        }
        if entry.permissions.is_empty() {
            self.entries.remove(index);
        }
    }

    /// Persist the list if dirty. Invoked solely by the ACL aspect of the
    /// owning object's save.
    pub(crate) fn persist(&mut self, transport: &dyn Transport) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let direct: Vec<WireAce> =
            self.entries.iter().filter(|e| e.direct).map(AclEntry::to_wire).collect();
        debug!(url = %self.href, entries = direct.len(), "persisting ACL");
        let applied = transport.put_acl(&self.href, &direct)?;
        self.entries = applied.into_iter().map(AclEntry::from_wire).collect();
        self.dirty = false;
        Ok(())
    }
}

impl AclEntry {
    fn from_wire(ace: WireAce) -> Self {
        Self {
            principal: ace.principal,
            permissions: ace.permissions.into_iter().collect(),
            direct: ace.direct,
        }
    }

    fn to_wire(&self) -> WireAce {
        WireAce {
            principal: self.principal.clone(),
            permissions: self.permissions.iter().cloned().collect(),
            direct: self.direct,
        }
    }
}
