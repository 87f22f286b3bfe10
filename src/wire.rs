//! Protocol-level document model.
//!
//! These are the structured forms of the AtomPub documents the protocol
//! exchanges: entries, feeds, links, ACL entries and the repository service
//! document. Parsing raw bytes into these structures (and serializing them
//! back) is the transport collaborator's job; the core only consumes and
//! produces the structured form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::property::AtomicType;
use crate::types::TypeDefinition;

/// Well-known link relations used by the protocol.
pub mod rel {
    /// The entry's canonical self link.
    pub const SELF: &str = "self";
    /// Up-link to the parent folder(s).
    pub const UP: &str = "up";
    /// Down-link to children (folder children or subtype feed).
    pub const DOWN: &str = "down";
    /// Content stream of a document.
    pub const EDIT_MEDIA: &str = "edit-media";
    /// Allowable-actions document for an entry.
    pub const ALLOWABLE_ACTIONS: &str =
        "http://docs.oasis-open.org/ns/cmis/link/200908/allowableactions";
    /// ACL document for an entry.
    pub const ACL: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/acl";
    /// Relationships feed for an entry.
    pub const RELATIONSHIPS: &str =
        "http://docs.oasis-open.org/ns/cmis/link/200908/relationships";
    /// Repository change log feed.
    pub const CHANGES: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/changes";
}

/// A typed hyperlink carried by an entry, feed or service document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link relation.
    pub rel: String,
    /// Target URL.
    pub href: String,
    /// Media type, when advertised (e.g. `application/atom+xml;type=feed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Link {
    /// Whether the media type marks the target as a feed.
    pub fn is_feed(&self) -> bool {
        self.media_type.as_deref().is_some_and(|t| t.contains("type=feed"))
    }

    /// Whether the media type marks the target as a single entry.
    pub fn is_entry(&self) -> bool {
        self.media_type.as_deref().is_some_and(|t| t.contains("type=entry"))
    }
}

/// One typed property node inside an entry's properties block, keyed by
/// property-definition id. Values stay in wire form until a property
/// definition coerces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireProperty {
    /// Property definition id (e.g. `cmis:name`).
    pub id: String,
    /// Declared atomic type of the value nodes.
    pub atomic: AtomicType,
    /// Zero or more wire scalars; absent values are an empty list.
    #[serde(default)]
    pub values: Vec<String>,
}

impl WireProperty {
    /// A single-valued wire property.
    pub fn single(id: impl Into<String>, atomic: AtomicType, value: impl Into<String>) -> Self {
        Self { id: id.into(), atomic, values: vec![value.into()] }
    }
}

/// One access-control entry in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAce {
    /// Principal identifier.
    pub principal: String,
    /// Granted permission names.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Whether the entry is directly assigned (false when inherited).
    #[serde(default)]
    pub direct: bool,
}

/// The canonical remote form of a single object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Entry title, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Entry author; set on creation requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Typed hyperlinks (self, up, down, acl, ...).
    #[serde(default)]
    pub links: Vec<Link>,
    /// Properties block, keyed by property-definition id.
    #[serde(default)]
    pub properties: Vec<WireProperty>,
    /// Inline allowable-actions block, when the fetch asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowable_actions: Option<BTreeMap<String, String>>,
    /// Inline ACL block, when the fetch asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Vec<WireAce>>,
    /// Inline type definition; present on entries of a types feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_definition: Option<TypeDefinition>,
}

impl Entry {
    /// The wire property with the given definition id.
    pub fn property(&self, id: &str) -> Option<&WireProperty> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// First wire scalar of the given property, when exactly present.
    pub fn property_text(&self, id: &str) -> Option<&str> {
        self.property(id).and_then(|p| p.values.first()).map(String::as_str)
    }

    /// First link with the given relation.
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.rel == rel)
    }

    /// All links with the given relation.
    pub fn links<'a>(&'a self, rel: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.rel == rel)
    }

    /// The object id property, when persisted.
    pub fn object_id(&self) -> Option<&str> {
        self.property_text("cmis:objectId")
    }

    /// The object type id property.
    pub fn type_id(&self) -> Option<&str> {
        self.property_text("cmis:objectTypeId")
    }
}

/// One page of a paginated result set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feed {
    /// Entries of this page, in page order.
    #[serde(default)]
    pub entries: Vec<Entry>,
    /// Link to the next page; absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Total item count across all pages, when the repository reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_items: Option<u64>,
}

/// A named URI template advertised by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriTemplate {
    /// Template kind (`objectbyid`, `typebyid`, `query`, ...).
    pub kind: String,
    /// The template string with `{key}` placeholders.
    pub template: String,
    /// Media type produced by the resolved URL, when advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// A named top-level collection advertised by the repository
/// (`root`, `types`, `checkedout`, `unfiled`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionLink {
    /// Collection kind.
    pub kind: String,
    /// Collection feed URL.
    pub href: String,
}

/// The parsed repository service document.
///
/// How this document is discovered and parsed is up to the transport layer;
/// the repository handle is constructed from the already-parsed form and
/// treats it as immutable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceDocument {
    /// Repository identifier.
    pub repository_id: String,
    /// CMIS protocol version the repository speaks.
    pub cmis_version: String,
    /// Object id of the repository's root folder.
    pub root_folder_id: String,
    /// Raw capability flags, keyed without the `capability` prefix
    /// (`MultiFiling`, `UnFiling`, `Query`, `ACL`, ...).
    #[serde(default)]
    pub capabilities: BTreeMap<String, String>,
    /// URI templates used to build request URLs.
    #[serde(default)]
    pub uri_templates: Vec<UriTemplate>,
    /// Top-level collections.
    #[serde(default)]
    pub collections: Vec<CollectionLink>,
    /// Repository-level links (e.g. the change log).
    #[serde(default)]
    pub links: Vec<Link>,
    /// Principal id standing for anonymous users, when ACLs are exposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_anonymous: Option<String>,
    /// Principal id standing for everyone, when ACLs are exposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_anyone: Option<String>,
}

impl ServiceDocument {
    /// The URI template of the given kind, when advertised.
    pub fn template(&self, kind: &str) -> Option<&UriTemplate> {
        self.uri_templates.iter().find(|t| t.kind == kind)
    }

    /// The href of the named top-level collection, when advertised.
    pub fn collection(&self, kind: &str) -> Option<&str> {
        self.collections.iter().find(|c| c.kind == kind).map(|c| c.href.as_str())
    }

    /// First repository-level link with the given relation.
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.iter().find(|l| l.rel == rel).map(|l| l.href.as_str())
    }
}
