//! The non-atomic save protocol.
//!
//! [`Object::save`] pushes all pending local mutations in a fixed aspect
//! order: creation, attributes (with any requested checkin folded in),
//! folder filing, ACL. Each aspect is one or more remote requests against
//! live repository state; there is no cross-aspect transaction. When an
//! aspect fails, everything committed before it stays committed and the
//! returned [`SaveError`] says how far the save got, so the caller can
//! re-invoke `save` to retry only what remains.

use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::property::AtomicType;
use crate::repository::{append_parameters, AclCapability};
use crate::types::Updatability;
use crate::wire::{rel, Entry, WireProperty};

use super::{Lifecycle, Object};

/// One phase of the save protocol, in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    /// Persist a transient object, assigning its identity.
    Create,
    /// Push dirty attributes, and check a working copy in when requested.
    Attributes,
    /// Reconcile the parent-folder set.
    Folders,
    /// Persist ACL edits.
    Acl,
}

/// How a successful save left the saved instance.
#[derive(Debug)]
pub enum Saved {
    /// The instance kept its identity; continue using it.
    InPlace,
    /// The repository answered the attribute update with a different
    /// object id (typically a checkin producing a new version). The old
    /// instance is stale; use the carried replacement.
    NewIdentity(Object),
}

/// A save that aborted partway through.
///
/// Aspects before `aspect` are committed and will not be re-sent; a later
/// `save` on the same instance (or on `new_identity` when present) retries
/// only the remainder.
#[derive(Debug, thiserror::Error)]
#[error("save aborted in {aspect:?} aspect after {committed} committed aspect(s): {source}")]
pub struct SaveError {
    /// The aspect that failed.
    pub aspect: Aspect,
    /// How many aspects committed before the failure.
    pub committed: usize,
    /// The replacement instance, when the attribute aspect had already
    /// produced one before a later aspect failed.
    pub new_identity: Option<Box<Object>>,
    /// The underlying failure.
    #[source]
    pub source: Error,
}

impl Object {
    /// Push every pending local mutation to the repository.
    ///
    /// With nothing pending this is a no-op issuing no requests. The
    /// protocol is not atomic; see [`SaveError`] for partial-failure
    /// semantics.
    pub fn save(&mut self) -> Result<Saved, SaveError> {
        let mut committed = 0usize;
        let mut replacement: Option<Object> = None;

        if self.is_transient() {
            if let Err(source) = self.apply_create() {
                return Err(SaveError {
                    aspect: Aspect::Create,
                    committed,
                    new_identity: None,
                    source,
                });
            }
            committed += 1;
        }

        if !self.dirty.is_empty() || self.pending_checkin.is_some() {
            match self.apply_attributes() {
                Ok(None) => {}
                Ok(Some(new_instance)) => replacement = Some(new_instance),
                Err(source) => {
                    return Err(SaveError {
                        aspect: Aspect::Attributes,
                        committed,
                        new_identity: None,
                        source,
                    });
                }
            }
            committed += 1;
        }

        let target = replacement.as_mut().unwrap_or(&mut *self);
        if target.pending_parents.is_some() {
            match target.apply_folders() {
                Ok(true) => committed += 1,
                Ok(false) => {}
                Err(source) => {
                    return Err(SaveError {
                        aspect: Aspect::Folders,
                        committed,
                        new_identity: replacement.map(Box::new),
                        source,
                    });
                }
            }
        }

        let target = replacement.as_mut().unwrap_or(&mut *self);
        if target.acl.as_ref().is_some_and(|acl| acl.is_dirty()) {
            if let Err(source) = target.apply_acl() {
                return Err(SaveError {
                    aspect: Aspect::Acl,
                    committed,
                    new_identity: replacement.map(Box::new),
                    source,
                });
            }
        }

        Ok(match replacement {
            Some(new_instance) => Saved::NewIdentity(new_instance),
            None => Saved::InPlace,
        })
    }

    /// Create aspect: POST the transient object and adopt the assigned id.
    fn apply_create(&mut self) -> Result<(), Error> {
        for (key, def) in self.attrs.iter() {
            if def.required && self.overlay.get(key).is_none_or(|v| v.is_empty()) {
                return Err(Error::InvalidArgument(format!(
                    "required attribute {key} is not set"
                )));
            }
        }
        let mut entry = Entry {
            author: self.repo.transport().user().map(str::to_string),
            ..Entry::default()
        };
        for (key, def) in self.attrs.iter() {
            if let Some(value) = self.overlay.get(key) {
                if self.dirty.contains(key) || def.required {
                    entry.properties.push(def.render(value)?);
                }
            }
        }
        if entry.property("cmis:objectTypeId").is_none() {
            entry.properties.push(WireProperty::single(
                "cmis:objectTypeId",
                AtomicType::Id,
                &self.type_def.id,
            ));
        }
        if self.attrs.contains_key("cmis:name") {
            entry.title = self.name()?;
        }

        let pending = self.pending_parents.take().unwrap_or_default();
        let url = match pending.first() {
            Some(folder) => folder.items_url()?,
            None => self
                .repo
                .unfiled_href()
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::NotSupported(
                        "repository has no unfiled collection; file the object into a folder \
                         before saving"
                        .into(),
                    )
                })?,
        };
        debug!(type_id = %self.type_def.id, url = %url, "creating object");
        let created = self.repo.transport().post_entry(&url, &entry)?;
        let id = created
            .object_id()
            .ok_or_else(|| Error::protocol("creation response carries no cmis:objectId"))?
            .to_string();
        self.lifecycle = Lifecycle::Persistent { id };
        self.overlay.clear();
        self.dirty.clear();
        self.cache.invalidate_all();
        self.cache.entry.prime(created);
        // Any additional initial parents flow into the folders aspect.
        if pending.len() > 1 {
            self.pending_parents = Some(pending);
        }
        Ok(())
    }

    /// Attribute aspect: PUT exactly the dirty attributes, folding a
    /// requested checkin into the same request. Yields a replacement
    /// instance when the repository answers with a new identity.
    fn apply_attributes(&mut self) -> Result<Option<Object>, Error> {
        let id = match &self.lifecycle {
            Lifecycle::Persistent { id } => id.clone(),
            Lifecycle::Transient => {
                return Err(Error::InvalidState(
                    "cannot push attributes of a transient object".into(),
                ));
            }
        };
        let mut entry = Entry {
            author: self.repo.transport().user().map(str::to_string),
            ..Entry::default()
        };
        for (key, def) in self.attrs.iter() {
            if !self.dirty.contains(key) || def.updatability == Updatability::OnCreate {
                continue;
            }
            let value = self.overlay.get(key).cloned().unwrap_or_default();
            entry.properties.push(def.render(&value)?);
        }

        let snapshot = self.snapshot()?;
        let mut params: Vec<(&str, String)> = Vec::new();
        match &self.pending_checkin {
            Some(checkin) => {
                params.push(("checkin", "true".into()));
                params.push(("major", if checkin.major { "true" } else { "false" }.into()));
                params.push(("checkinComment", checkin.comment.clone()));
            }
            None => params.push(("checkin", "false".into())),
        }
        if let Some(token) = snapshot.property_text("cmis:changeToken") {
            params.push(("changeToken", token.to_string()));
        }
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let self_url = match snapshot.link(rel::SELF) {
            Some(link) => link.href.clone(),
            None => self.repo.object_url(&id)?,
        };
        let url = append_parameters(&self_url, &params);

        debug!(id = %id, dirty = entry.properties.len(), checkin = self.pending_checkin.is_some(), "updating attributes");
        let response = self.repo.transport().put_entry(&url, &entry)?;
        self.dirty.clear();
        self.overlay.clear();
        self.pending_checkin = None;
        self.cache.invalidate_all();

        let returned = response
            .object_id()
            .ok_or_else(|| Error::protocol("update response carries no cmis:objectId"))?
            .to_string();
        if returned == id {
            self.cache.entry.prime(response);
            Ok(None)
        } else {
            debug!(old = %id, new = %returned, "repository assigned a new identity");
            let mut new_instance = Object::from_entry(&self.repo, response)?;
            new_instance.pending_parents = self.pending_parents.take();
            new_instance.acl = self.acl.take();
            Ok(Some(new_instance))
        }
    }

    /// Folders aspect: reconcile the desired parent set against the live
    /// persisted one. Pairs one removal with one addition as a move so the
    /// object never transits through an unfiled state unnecessarily.
    /// Returns whether any request was issued.
    fn apply_folders(&mut self) -> Result<bool, Error> {
        let Some(desired) = self.pending_parents.clone() else {
            return Ok(false);
        };
        let current = self.fetch_parent_folders()?;
        let current_ids: Vec<&str> = current.iter().filter_map(Object::id).collect();
        let desired_ids: Vec<&str> = desired.iter().filter_map(Object::id).collect();
        let added: Vec<&Object> = desired
            .iter()
            .filter(|f| !f.id().is_some_and(|id| current_ids.contains(&id)))
            .collect();
        let removed: Vec<&Object> = current
            .iter()
            .filter(|f| !f.id().is_some_and(|id| desired_ids.contains(&id)))
            .collect();
        if added.is_empty() && removed.is_empty() {
            self.pending_parents = None;
            return Ok(false);
        }

        let body = self.reference_entry()?;
        let transport = Arc::clone(self.repo.transport());
        for index in 0..added.len().max(removed.len()) {
            match (added.get(index), removed.get(index)) {
                (Some(add), Some(remove)) => {
                    let from = remove
                        .id()
                        .ok_or_else(|| Error::InvalidState("parent folder has no id".into()))?;
                    let url = append_parameters(&add.items_url()?, &[("sourceFolderId", from)]);
                    debug!(to = ?add.id(), from = %from, "moving object between folders");
                    transport.post_entry(&url, &body)?;
                }
                (Some(add), None) => {
                    debug!(to = ?add.id(), "filing object into folder");
                    transport.post_entry(&add.items_url()?, &body)?;
                }
                (None, Some(remove)) => {
                    let from = remove
                        .id()
                        .ok_or_else(|| Error::InvalidState("parent folder has no id".into()))?;
                    let unfiled = self.repo.unfiled_href().ok_or_else(|| {
                        Error::NotSupported("repository has no unfiled collection".into())
                    })?;
                    let url = append_parameters(unfiled, &[("removeFrom", from)]);
                    debug!(from = %from, "unfiling object");
                    transport.post_entry(&url, &body)?;
                }
                (None, None) => break,
            }
        }
        self.pending_parents = None;
        self.cache.invalidate_all();
        Ok(true)
    }

    /// ACL aspect: persist the dirty entry list, then drop cached views so
    /// the owning object reflects what the repository actually applied.
    fn apply_acl(&mut self) -> Result<(), Error> {
        if self.repo.capabilities().acl != AclCapability::Manage {
            return Err(Error::NotSupported(
                "ACLs cannot be managed on this repository".into(),
            ));
        }
        let transport = Arc::clone(self.repo.transport());
        if let Some(acl) = self.acl.as_mut() {
            acl.persist(transport.as_ref())?;
        }
        self.cache.invalidate_all();
        Ok(())
    }
}
