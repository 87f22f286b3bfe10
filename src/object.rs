//! Typed, attribute-bearing object instances.
//!
//! An [`Object`] is the client-side handle for one repository object. The
//! four instantiable base kinds (document, folder, policy, relationship)
//! share one struct; kind-specific operations check the closed
//! [`BaseKind`] tag instead of dispatching through a class hierarchy.
//!
//! An instance is either *transient* (created locally, no id yet) or
//! *persistent* (backed by a retrievable remote representation). Local
//! mutations (attribute updates, filing changes, ACL edits, a requested
//! checkin) accumulate in memory in an overlay distinct from the
//! last-fetched canonical snapshot and are pushed to the repository by
//! [`Object::save`] in a fixed aspect order. [`Object::reload`] discards
//! the overlay and every cached derived view.
//!
//! Instances are not meant for concurrent mutation from several threads;
//! callers serialize access to a single instance.

mod save;

pub use save::{Aspect, SaveError, Saved};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::acl::Acl;
use crate::cache::CacheSlot;
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::property::{wire_bool, AtomicType, PropertyValue};
use crate::repository::{append_parameters, Repository};
use crate::types::{BaseKind, PropertyDefinition, TypeDefinition, Updatability};
use crate::wire::{rel, Entry, WireProperty};

/// Ordered attribute map: property key to coerced value.
pub type AttributeMap = IndexMap<String, PropertyValue>;

/// Which end of its relationships an object asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipDirection {
    /// Relationships whose source is this object.
    Source,
    /// Relationships whose target is this object.
    Target,
}

impl RelationshipDirection {
    fn param(self) -> &'static str {
        match self {
            RelationshipDirection::Source => "source",
            RelationshipDirection::Target => "target",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lifecycle {
    Transient,
    Persistent { id: String },
}

#[derive(Debug, Clone)]
struct Checkin {
    major: bool,
    comment: String,
}

/// The memoized derived views of one instance. Every slot is invalidated
/// by save and reload; a stale read is a correctness bug.
#[derive(Debug, Clone)]
struct Slots {
    entry: CacheSlot<Entry>,
    attributes: CacheSlot<AttributeMap>,
    actions: CacheSlot<BTreeMap<String, bool>>,
    parents: CacheSlot<Vec<Object>>,
    relationships_source: CacheSlot<Collection<Object>>,
    relationships_target: CacheSlot<Collection<Object>>,
}

impl Slots {
    fn new() -> Self {
        Self {
            entry: CacheSlot::new("entry"),
            attributes: CacheSlot::new("attributes"),
            actions: CacheSlot::new("allowable-actions"),
            parents: CacheSlot::new("parent-folders"),
            relationships_source: CacheSlot::new("relationships-source"),
            relationships_target: CacheSlot::new("relationships-target"),
        }
    }

    fn invalidate_all(&self) {
        self.entry.invalidate();
        self.attributes.invalidate();
        self.actions.invalidate();
        self.parents.invalidate();
        self.relationships_source.invalidate();
        self.relationships_target.invalidate();
    }
}

/// Client-side handle for one repository object.
#[derive(Debug, Clone)]
pub struct Object {
    repo: Repository,
    type_def: Arc<TypeDefinition>,
    /// Union of own and inherited property definitions, resolved once.
    attrs: Arc<IndexMap<String, PropertyDefinition>>,
    lifecycle: Lifecycle,
    /// Locally updated values, distinct from the canonical snapshot.
    overlay: AttributeMap,
    /// Keys updated since the last save/reload.
    dirty: BTreeSet<String>,
    /// In-memory parent-folder override; `None` until first file/unfile.
    pending_parents: Option<Vec<Object>>,
    pending_checkin: Option<Checkin>,
    acl: Option<Acl>,
    cache: Slots,
}

impl Object {
    /// Wrap a fetched entry in a typed instance.
    pub(crate) fn from_entry(repo: &Repository, entry: Entry) -> Result<Self> {
        let type_id = entry
            .type_id()
            .ok_or_else(|| Error::protocol("entry carries no cmis:objectTypeId"))?;
        let type_def = repo.type_by_id(type_id)?;
        let id = entry
            .object_id()
            .ok_or_else(|| Error::protocol("entry carries no cmis:objectId"))?
            .to_string();
        let attrs = Arc::new(repo.registry().attributes(&type_def, true)?);
        let object = Object {
            repo: repo.clone(),
            type_def,
            attrs,
            lifecycle: Lifecycle::Persistent { id },
            overlay: AttributeMap::new(),
            dirty: BTreeSet::new(),
            pending_parents: None,
            pending_checkin: None,
            acl: None,
            cache: Slots::new(),
        };
        object.cache.entry.prime(entry);
        Ok(object)
    }

    /// A transient instance of the given type.
    pub(crate) fn transient(repo: &Repository, type_def: Arc<TypeDefinition>) -> Result<Self> {
        let attrs = Arc::new(repo.registry().attributes(&type_def, true)?);
        Ok(Object {
            repo: repo.clone(),
            type_def,
            attrs,
            lifecycle: Lifecycle::Transient,
            overlay: AttributeMap::new(),
            dirty: BTreeSet::new(),
            pending_parents: None,
            pending_checkin: None,
            acl: None,
            cache: Slots::new(),
        })
    }

    /// The object id; `None` while the instance is transient.
    pub fn id(&self) -> Option<&str> {
        match &self.lifecycle {
            Lifecycle::Transient => None,
            Lifecycle::Persistent { id } => Some(id),
        }
    }

    /// Whether this instance has not been persisted yet.
    pub fn is_transient(&self) -> bool {
        self.lifecycle == Lifecycle::Transient
    }

    /// The base kind of this object's type.
    pub fn base_kind(&self) -> BaseKind {
        self.type_def.base
    }

    /// The object's type definition.
    pub fn type_definition(&self) -> &Arc<TypeDefinition> {
        &self.type_def
    }

    /// The repository this object belongs to.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// The `cmis:name` attribute, when set.
    pub fn name(&self) -> Result<Option<String>> {
        Ok(self
            .attribute("cmis:name")?
            .as_single()
            .and_then(|v| v.as_text())
            .map(str::to_string))
    }

    /// Attribute keys updated since the last save or reload.
    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    // ------------------------------------------------------------------
    // Attributes

    /// The value of one attribute; local updates shadow the snapshot.
    pub fn attribute(&self, key: &str) -> Result<PropertyValue> {
        if !self.attrs.contains_key(key) {
            return Err(Error::UnknownAttribute(key.to_string()));
        }
        if let Some(value) = self.overlay.get(key) {
            return Ok(value.clone());
        }
        Ok(self.canonical_attributes()?.get(key).cloned().unwrap_or_default())
    }

    /// The full attribute map: the canonical snapshot with local updates
    /// merged on top.
    pub fn attributes(&self) -> Result<AttributeMap> {
        let mut map = self.canonical_attributes()?;
        for (key, value) in &self.overlay {
            map.insert(key.clone(), value.clone());
        }
        Ok(map)
    }

    /// Update attributes locally, without contacting the repository.
    ///
    /// Every key and value is validated before anything is applied: an
    /// unknown key fails with `UnknownAttribute`, an incompatible value
    /// with `Validation`, and in either case no dirty state is mutated.
    pub fn update<I, K, V>(&mut self, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        let mut updates: Vec<(String, PropertyValue)> =
            updates.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        for (key, value) in &mut updates {
            let def = self
                .attrs
                .get(key.as_str())
                .ok_or_else(|| Error::UnknownAttribute(key.clone()))?;
            self.check_writable(def)?;
            // A repeating attribute always reads back as a sequence, even
            // when updated with a scalar.
            if def.repeating {
                *value = std::mem::take(value).into_repeating();
            }
            def.validate_value(value)?;
        }
        for (key, value) in updates {
            self.dirty.insert(key.clone());
            self.overlay.insert(key, value);
        }
        Ok(())
    }

    fn check_writable(&self, def: &PropertyDefinition) -> Result<()> {
        match def.updatability {
            Updatability::ReadOnly => {
                Err(Error::validation(&def.id, "property is read-only"))
            }
            Updatability::OnCreate if !self.is_transient() => {
                Err(Error::validation(&def.id, "property is only writable at creation time"))
            }
            // WhenCheckedOut is accepted locally; whether the instance is a
            // private working copy is only known to the repository.
            _ => Ok(()),
        }
    }

    /// The canonical attribute map coerced from the snapshot; all-absent
    /// for a transient instance.
    fn canonical_attributes(&self) -> Result<AttributeMap> {
        self.cache.attributes.get_or_try_init(|| {
            if self.is_transient() {
                return Ok(self
                    .attrs
                    .iter()
                    .map(|(key, def)| {
                        let empty = if def.repeating {
                            PropertyValue::Multi(vec![])
                        } else {
                            PropertyValue::Absent
                        };
                        (key.clone(), empty)
                    })
                    .collect());
            }
            let entry = self.snapshot()?;
            let mut map = AttributeMap::with_capacity(self.attrs.len());
            for (key, def) in self.attrs.iter() {
                map.insert(key.clone(), def.extract(&entry)?);
            }
            Ok(map)
        })
    }

    /// The last-fetched canonical entry, fetching it on first use.
    fn snapshot(&self) -> Result<Entry> {
        match &self.lifecycle {
            Lifecycle::Transient => Err(Error::InvalidState(
                "transient object has no remote representation".into(),
            )),
            Lifecycle::Persistent { id } => self.cache.entry.get_or_try_init(|| {
                let url = self.repo.object_url(id)?;
                Ok(self.repo.transport().get_entry(&url)?)
            }),
        }
    }

    // ------------------------------------------------------------------
    // Derived views

    /// The allowable-actions map, keyed without the `can` prefix.
    pub fn allowable_actions(&self) -> Result<BTreeMap<String, bool>> {
        self.cache.actions.get_or_try_init(|| {
            let entry = self.snapshot()?;
            let raw = match entry.allowable_actions {
                Some(actions) => actions,
                None => match entry.link(rel::ALLOWABLE_ACTIONS) {
                    Some(link) => self.repo.transport().get_actions(&link.href)?,
                    None => BTreeMap::new(),
                },
            };
            Ok(raw
                .iter()
                .map(|(name, value)| {
                    let name = name.strip_prefix("can").unwrap_or(name).to_string();
                    (name, wire_bool(value).unwrap_or(false))
                })
                .collect())
        })
    }

    /// The persisted parent folders.
    ///
    /// Always empty for relationships; policies may be empty too. A
    /// repository speaking single-parent up-links yields exactly one.
    pub fn parent_folders(&self) -> Result<Vec<Object>> {
        self.cache.parents.get_or_try_init(|| self.fetch_parent_folders())
    }

    fn fetch_parent_folders(&self) -> Result<Vec<Object>> {
        if self.is_transient() || self.type_def.base == BaseKind::Relationship {
            return Ok(vec![]);
        }
        let entry = self.snapshot()?;
        if let Some(feed_link) = entry.links(rel::UP).find(|l| l.is_feed()) {
            return self.repo.object_collection(Some(&feed_link.href)).items();
        }
        if let Some(entry_link) = entry.links(rel::UP).find(|l| l.is_entry()) {
            let parent = self.repo.transport().get_entry(&entry_link.href)?;
            return Ok(vec![Object::from_entry(&self.repo, parent)?]);
        }
        Ok(vec![])
    }

    /// The object's ACL handle, loading it on first use.
    ///
    /// Fails with `NotSupported` when the repository does not expose ACLs.
    pub fn acl(&mut self) -> Result<&mut Acl> {
        if !self.repo.capabilities().acl.readable() {
            return Err(Error::NotSupported("ACLs are not exposed by this repository".into()));
        }
        if self.acl.is_none() {
            let entry = self.snapshot()?;
            let links: Vec<_> = entry.links(rel::ACL).collect();
            if links.len() != 1 {
                return Err(Error::protocol(format!(
                    "expected exactly 1 acl link, got {}",
                    links.len()
                )));
            }
            let href = links[0].href.clone();
            let aces = match entry.acl.clone() {
                Some(aces) => aces,
                None => self.repo.transport().get_acl(&href)?,
            };
            self.acl = Some(Acl::new(href, aces));
        }
        self.acl.as_mut().ok_or_else(|| Error::InvalidState("acl vanished".into()))
    }

    /// Relationships of this object in the given direction; structurally
    /// empty when the repository advertises no relationships link.
    pub fn relationships(&self, direction: RelationshipDirection) -> Result<Collection<Object>> {
        let slot = match direction {
            RelationshipDirection::Source => &self.cache.relationships_source,
            RelationshipDirection::Target => &self.cache.relationships_target,
        };
        slot.get_or_try_init(|| {
            let entry = self.snapshot()?;
            match entry.link(rel::RELATIONSHIPS) {
                Some(link) => {
                    let url = append_parameters(
                        &link.href,
                        &[("relationshipDirection", direction.param())],
                    );
                    Ok(self.repo.object_collection(Some(&url)))
                }
                None => Ok(Collection::empty(Arc::clone(self.repo.transport()))),
            }
        })
    }

    // ------------------------------------------------------------------
    // Filing

    fn require_fileable(&self) -> Result<()> {
        if self.type_def.fileable {
            Ok(())
        } else {
            Err(Error::ConstraintViolation(format!(
                "type {} is not fileable",
                self.type_def.id
            )))
        }
    }

    /// The parent set a save would reconcile against: the override when
    /// one exists, the persisted set otherwise.
    pub fn effective_parents(&self) -> Result<Vec<Object>> {
        match &self.pending_parents {
            Some(parents) => Ok(parents.clone()),
            None => self.parent_folders(),
        }
    }

    /// File this object into a folder, in memory only.
    ///
    /// Without the multi-filing capability this replaces the parent set;
    /// with it, the folder is added.
    pub fn file(&mut self, folder: &Object) -> Result<()> {
        self.require_fileable()?;
        if folder.base_kind() != BaseKind::Folder {
            return Err(Error::InvalidArgument("filing target is not a folder".into()));
        }
        let folder_id = folder
            .id()
            .ok_or_else(|| Error::InvalidState("cannot file into a transient folder".into()))?
            .to_string();
        let mut parents = self.effective_parents()?;
        if self.repo.capabilities().multifiling {
            if !parents.iter().any(|p| p.id() == Some(folder_id.as_str())) {
                parents.push(folder.clone());
            }
        } else {
            parents = vec![folder.clone()];
        }
        self.pending_parents = Some(parents);
        Ok(())
    }

    /// Remove this object from one folder (or from all with `None`), in
    /// memory only.
    ///
    /// Removing a folder that was only pending (filed but never saved)
    /// cancels the pending filing and restores the persisted set.
    /// Removing the last persisted parent requires the unfiling
    /// capability.
    pub fn unfile(&mut self, folder: Option<&Object>) -> Result<()> {
        self.require_fileable()?;
        let capabilities = *self.repo.capabilities();
        let current = self.effective_parents()?;
        if !capabilities.multifiling && current.len() > 1 {
            return Err(Error::NotSupported(
                "cannot unfile a multi-filed object without the multi-filing capability".into(),
            ));
        }
        let mut parents = current;
        match folder {
            Some(folder) => parents.retain(|p| p.id() != folder.id()),
            None => parents.clear(),
        }
        if parents.is_empty() {
            let persisted = if self.is_transient() { vec![] } else { self.parent_folders()? };
            let cancelled_pending_only = match folder {
                Some(folder) => !persisted.iter().any(|p| p.id() == folder.id()),
                None => persisted.is_empty(),
            };
            if cancelled_pending_only {
                parents = persisted;
            } else if !capabilities.unfiling {
                return Err(Error::NotSupported(
                    "unfiling is not supported by this repository".into(),
                ));
            }
        }
        self.pending_parents = Some(parents);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Kind-specific operations

    fn require_kind(&self, kind: BaseKind, operation: &str) -> Result<()> {
        if self.type_def.base == kind {
            Ok(())
        } else {
            Err(Error::ConstraintViolation(format!(
                "{operation} is only valid for {kind:?} objects, not {:?}",
                self.type_def.base
            )))
        }
    }

    /// URL of the document's content stream, when one exists.
    pub fn content_url(&self) -> Result<Option<String>> {
        self.require_kind(BaseKind::Document, "content access")?;
        Ok(self.snapshot()?.link(rel::EDIT_MEDIA).map(|l| l.href.clone()))
    }

    /// Check the document out, yielding its private working copy.
    pub fn checkout(&self) -> Result<Object> {
        self.require_kind(BaseKind::Document, "checkout")?;
        if self.is_transient() {
            return Err(Error::InvalidState("cannot check out a transient document".into()));
        }
        if !self.type_def.versionable {
            return Err(Error::ConstraintViolation(format!(
                "type {} is not versionable",
                self.type_def.id
            )));
        }
        let href = self.repo.checkedout_href().ok_or_else(|| {
            Error::NotSupported("repository has no checked-out collection".into())
        })?;
        debug!(id = ?self.id(), "checking out document");
        let pwc = self.repo.transport().post_entry(href, &self.reference_entry()?)?;
        Object::from_entry(&self.repo, pwc)
    }

    /// Request that the next save checks this working copy in as a new
    /// version. Carried even when no attribute is dirty.
    pub fn request_checkin(&mut self, major: bool, comment: impl Into<String>) -> Result<()> {
        self.require_kind(BaseKind::Document, "checkin")?;
        if self.is_transient() {
            return Err(Error::InvalidState("cannot check in a transient document".into()));
        }
        self.pending_checkin = Some(Checkin { major, comment: comment.into() });
        Ok(())
    }

    /// Whether a checkin is pending for the next save.
    pub fn checkin_requested(&self) -> bool {
        self.pending_checkin.is_some()
    }

    /// The folder's children; structurally empty when the folder
    /// advertises no children feed.
    pub fn children(&self) -> Result<Collection<Object>> {
        self.require_kind(BaseKind::Folder, "children listing")?;
        let entry = self.snapshot()?;
        let href = entry
            .links(rel::DOWN)
            .find(|l| l.is_feed() || l.media_type.is_none())
            .map(|l| l.href.clone());
        Ok(self.repo.object_collection(href.as_deref()))
    }

    /// The folder's items feed URL, the target of creation and refiling
    /// requests.
    pub fn items_url(&self) -> Result<String> {
        self.require_kind(BaseKind::Folder, "filing")?;
        let entry = self.snapshot()?;
        let href = entry
            .links(rel::DOWN)
            .find(|l| l.is_feed() || l.media_type.is_none())
            .map(|l| l.href.clone());
        href.ok_or_else(|| Error::protocol("folder advertises no children feed link"))
    }

    /// The source object of this relationship.
    pub fn source(&self) -> Result<Object> {
        self.relationship_end("cmis:sourceId")
    }

    /// The target object of this relationship.
    pub fn target(&self) -> Result<Object> {
        self.relationship_end("cmis:targetId")
    }

    fn relationship_end(&self, key: &str) -> Result<Object> {
        self.require_kind(BaseKind::Relationship, "relationship traversal")?;
        let entry = self.snapshot()?;
        let id = entry
            .property_text(key)
            .ok_or_else(|| Error::protocol(format!("relationship carries no {key}")))?;
        self.repo.object_by_id(id)
    }

    // ------------------------------------------------------------------
    // Lifecycle

    /// Discard every cached derived view and every pending local
    /// mutation; the canonical representation is re-fetched on next
    /// access.
    pub fn reload(&mut self) -> Result<()> {
        if self.is_transient() {
            return Err(Error::InvalidState("cannot reload a transient object".into()));
        }
        debug!(id = ?self.id(), "reloading object");
        self.cache.invalidate_all();
        self.overlay.clear();
        self.dirty.clear();
        self.pending_parents = None;
        self.pending_checkin = None;
        self.acl = None;
        Ok(())
    }

    /// A minimal entry referencing this object, used as the body of
    /// refiling and checkout requests.
    pub(crate) fn reference_entry(&self) -> Result<Entry> {
        let id = self
            .id()
            .ok_or_else(|| Error::InvalidState("transient object has no identity".into()))?;
        Ok(Entry {
            properties: vec![
                WireProperty::single("cmis:objectId", AtomicType::Id, id),
                WireProperty::single("cmis:objectTypeId", AtomicType::Id, &self.type_def.id),
            ],
            ..Entry::default()
        })
    }
}
