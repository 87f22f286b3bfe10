//! Type definitions and the per-repository type registry.
//!
//! Every object is an instance of a named type. A type declares its base
//! kind, a single-inheritance parent chain terminating at a base kind, a
//! set of behavior flags and an ordered map of property definitions. The
//! [`TypeRegistry`] fetches definitions on demand through the transport and
//! memoizes them for the life of the repository handle; repository schemas
//! are assumed stable for that long, so there is no TTL.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::property::{self, AtomicType, PropertyValue, Value};
use crate::repository::fill_template;
use crate::transport::Transport;
use crate::wire::{rel, Entry, WireProperty};

/// The five CMIS base kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseKind {
    /// A content-bearing, versionable object.
    Document,
    /// A container for fileable objects.
    Folder,
    /// An object that can be applied to other objects.
    Policy,
    /// A typed, directed link between two objects.
    Relationship,
    /// A secondary (mixin) type; never instantiated on its own.
    Secondary,
}

impl BaseKind {
    /// Parse a base type id (`cmis:document`, ...).
    pub fn from_type_id(id: &str) -> Option<Self> {
        match id {
            "cmis:document" => Some(BaseKind::Document),
            "cmis:folder" => Some(BaseKind::Folder),
            "cmis:policy" => Some(BaseKind::Policy),
            "cmis:relationship" => Some(BaseKind::Relationship),
            "cmis:secondary" => Some(BaseKind::Secondary),
            _ => None,
        }
    }
}

/// When a property may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Updatability {
    /// Never writable by clients.
    ReadOnly,
    /// Writable only while the object is transient.
    OnCreate,
    /// Always writable.
    ReadWrite,
    /// Writable only on a private working copy.
    WhenCheckedOut,
}

/// Schema of one property: key, atomic type, cardinality and write rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Property definition id; the attribute key.
    pub id: String,
    /// Atomic type of each value.
    pub atomic: AtomicType,
    /// Whether the property holds a sequence of values.
    #[serde(default)]
    pub repeating: bool,
    /// Whether a value must be present when the object is created.
    #[serde(default)]
    pub required: bool,
    /// Write rules.
    pub updatability: Updatability,
}

impl PropertyDefinition {
    /// Coerce this property out of an entry's properties block.
    ///
    /// An absent or empty wire value yields an empty sequence for a
    /// repeating property and the explicit no-value marker for a
    /// single-valued one.
    pub fn extract(&self, entry: &Entry) -> Result<PropertyValue> {
        let values = entry.property(&self.id).map(|p| p.values.as_slice()).unwrap_or(&[]);
        if self.repeating {
            let values: Result<Vec<Value>> =
                values.iter().map(|v| property::to_native(self.atomic, v)).collect();
            Ok(PropertyValue::Multi(values?))
        } else {
            match values.first() {
                None => Ok(PropertyValue::Absent),
                Some(v) => Ok(PropertyValue::Single(property::to_native(self.atomic, v)?)),
            }
        }
    }

    /// Render a native value into a wire property node.
    pub fn render(&self, value: &PropertyValue) -> Result<WireProperty> {
        self.validate_value(value)?;
        let values: Result<Vec<String>> =
            value.values().iter().map(|v| property::to_wire(self.atomic, v)).collect();
        Ok(WireProperty { id: self.id.clone(), atomic: self.atomic, values: values? })
    }

    /// Check a native value against this definition's type and cardinality.
    pub fn validate_value(&self, value: &PropertyValue) -> Result<()> {
        match value {
            PropertyValue::Absent => Ok(()),
            PropertyValue::Single(v) => {
                if self.repeating {
                    return Err(Error::validation(
                        &self.id,
                        "single value for repeating property",
                    ));
                }
                property::validate(self.atomic, v)
                    .map_err(|e| Error::validation(&self.id, e.to_string()))
            }
            PropertyValue::Multi(values) => {
                if !self.repeating {
                    return Err(Error::validation(
                        &self.id,
                        "repeating value for single-valued property",
                    ));
                }
                for v in values {
                    property::validate(self.atomic, v)
                        .map_err(|e| Error::validation(&self.id, e.to_string()))?;
                }
                Ok(())
            }
        }
    }
}

/// Schema of one object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Type id.
    pub id: String,
    /// Base kind this type ultimately derives from.
    pub base: BaseKind,
    /// Parent type id; `None` for a base type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Whether objects of this type can be created by clients.
    #[serde(default)]
    pub creatable: bool,
    /// Whether objects of this type can be filed into folders.
    #[serde(default)]
    pub fileable: bool,
    /// Whether this type can appear in queries.
    #[serde(default)]
    pub queryable: bool,
    /// Whether ACLs of instances can be managed.
    #[serde(default)]
    pub controllable_acl: bool,
    /// Whether documents of this type participate in versioning.
    #[serde(default)]
    pub versionable: bool,
    /// Own (non-inherited) property definitions, in wire order.
    #[serde(default)]
    pub properties: IndexMap<String, PropertyDefinition>,
}

struct CachedType {
    def: Arc<TypeDefinition>,
    /// Down-link to the subtype feed, when the repository exposes one.
    children_href: Option<String>,
}

/// Per-repository cache of type definitions.
///
/// Read-mostly after warm-up; the map may be shared read-only across
/// threads. Populating a missing entry is single-writer-wins: concurrent
/// duplicate fetches are wasteful but harmless, since an entry never
/// changes once inserted.
pub struct TypeRegistry {
    transport: Arc<dyn Transport>,
    type_by_id_template: Option<String>,
    cache: RwLock<HashMap<String, CachedType>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached: Vec<String> =
            self.cache.read().map(|c| c.keys().cloned().collect()).unwrap_or_default();
        f.debug_struct("TypeRegistry").field("cached", &cached).finish()
    }
}

impl TypeRegistry {
    /// Create a registry resolving unknown types through the `typebyid`
    /// URI template.
    pub fn new(transport: Arc<dyn Transport>, type_by_id_template: Option<String>) -> Self {
        Self { transport, type_by_id_template, cache: RwLock::new(HashMap::new()) }
    }

    /// The definition with the given type id, fetching it on first use.
    pub fn type_by_id(&self, id: &str) -> Result<Arc<TypeDefinition>> {
        if let Some(cached) = self.lookup(id) {
            return Ok(cached);
        }
        let template = self.type_by_id_template.as_deref().ok_or_else(|| {
            Error::protocol("repository does not define required URI template 'typebyid'")
        })?;
        let url = fill_template(template, &[("id", id)]);
        debug!(type_id = id, "fetching type definition");
        let entry = self.transport.get_entry(&url)?;
        self.register_entry(&entry)
    }

    fn lookup(&self, id: &str) -> Option<Arc<TypeDefinition>> {
        let cache = self.cache.read().expect("type cache poisoned");
        cache.get(id).map(|c| Arc::clone(&c.def))
    }

    /// Insert a type definition parsed out of a feed or entry into the
    /// cache. The first writer wins; a concurrent duplicate is dropped.
    pub fn register_entry(&self, entry: &Entry) -> Result<Arc<TypeDefinition>> {
        let def = entry
            .type_definition
            .clone()
            .ok_or_else(|| Error::protocol("entry carries no type definition"))?;
        let children_href = entry
            .links(rel::DOWN)
            .find(|l| l.is_feed() || l.media_type.is_none())
            .map(|l| l.href.clone());
        let def = Arc::new(def);
        let mut cache = self.cache.write().expect("type cache poisoned");
        let slot = cache
            .entry(def.id.clone())
            .or_insert_with(|| CachedType { def: Arc::clone(&def), children_href });
        Ok(Arc::clone(&slot.def))
    }

    /// The ordered property definitions of a type.
    ///
    /// With `inherited`, walks the parent chain and accumulates ancestor
    /// definitions first; a child definition overrides a same-keyed parent
    /// definition.
    pub fn attributes(
        &self,
        def: &TypeDefinition,
        inherited: bool,
    ) -> Result<IndexMap<String, PropertyDefinition>> {
        if !inherited {
            return Ok(def.properties.clone());
        }
        let mut chain = vec![def.properties.clone()];
        let mut parent = def.parent.clone();
        while let Some(parent_id) = parent {
            let parent_def = self.type_by_id(&parent_id)?;
            chain.push(parent_def.properties.clone());
            parent = parent_def.parent.clone();
        }
        let mut merged = IndexMap::new();
        for properties in chain.into_iter().rev() {
            for (key, value) in properties {
                merged.insert(key, value);
            }
        }
        Ok(merged)
    }

    /// The given type plus every transitive subtype, deduplicated.
    ///
    /// Repositories occasionally report overlapping subtrees; the visited
    /// set tolerates diamonds and cycles.
    pub fn all_subtypes(&self, id: &str) -> Result<Vec<Arc<TypeDefinition>>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::from([self.type_by_id(id)?]);
        while let Some(def) = queue.pop_front() {
            if !seen.insert(def.id.clone()) {
                continue;
            }
            let children_href = {
                let cache = self.cache.read().expect("type cache poisoned");
                cache.get(&def.id).and_then(|c| c.children_href.clone())
            };
            result.push(def);
            let Some(mut href) = children_href else { continue };
            loop {
                let feed = self.transport.get_feed(&href)?;
                for entry in &feed.entries {
                    queue.push_back(self.register_entry(entry)?);
                }
                match feed.next {
                    Some(next) => href = next,
                    None => break,
                }
            }
        }
        Ok(result)
    }
}
