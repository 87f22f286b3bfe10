//! The repository handle.
//!
//! A [`Repository`] identifies one remote content repository: the protocol
//! version it speaks, its capability flags, its URI templates and top-level
//! collections. It is constructed once per connection from an
//! already-parsed service document and is immutable afterwards except for
//! lazily-populated caches (root folder entry, type definitions).
//!
//! The handle is cheap to clone and may be shared across threads; object
//! instances obtained from it are not.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::property::wire_bool;
use crate::query::QueryResult;
use crate::transport::Transport;
use crate::types::{TypeDefinition, TypeRegistry};
use crate::wire::{rel, Entry, ServiceDocument};

/// How far ACLs are exposed by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AclCapability {
    /// ACLs are not exposed at all.
    None,
    /// ACLs can be read but not changed.
    Discover,
    /// ACLs can be read and changed.
    Manage,
}

impl AclCapability {
    /// ACLs can at least be viewed.
    pub fn readable(self) -> bool {
        self >= AclCapability::Discover
    }
}

/// Query support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCapability {
    /// No query support.
    None,
    /// Metadata-only queries.
    MetadataOnly,
    /// Full-text-only queries.
    FullTextOnly,
    /// Metadata and full-text, separately.
    BothSeparate,
    /// Metadata and full-text, combined.
    BothCombined,
}

impl QueryCapability {
    /// Whether any form of query is supported.
    pub fn supported(self) -> bool {
        self != QueryCapability::None
    }
}

/// Typed view of the repository's capability block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// One object may be filed in more than one folder at once.
    pub multifiling: bool,
    /// Objects may exist outside any folder.
    pub unfiling: bool,
    /// Private working copies are updatable outside checkin.
    pub pwc_updatable: bool,
    /// Individual versions may be filed independently.
    pub version_specific_filing: bool,
    /// ACL visibility level.
    pub acl: AclCapability,
    /// Query support level.
    pub query: QueryCapability,
}

impl Capabilities {
    fn from_document(doc: &ServiceDocument) -> Self {
        let flag = |name: &str| {
            doc.capabilities.get(name).map(|v| wire_bool(v).unwrap_or(false)).unwrap_or(false)
        };
        let acl = match doc.capabilities.get("ACL").map(String::as_str) {
            Some("manage") => AclCapability::Manage,
            Some("discover") => AclCapability::Discover,
            _ => AclCapability::None,
        };
        let query = match doc.capabilities.get("Query").map(String::as_str) {
            Some("metadataonly") => QueryCapability::MetadataOnly,
            Some("fulltextonly") => QueryCapability::FullTextOnly,
            Some("bothseparate") => QueryCapability::BothSeparate,
            Some("bothcombined") => QueryCapability::BothCombined,
            _ => QueryCapability::None,
        };
        Capabilities {
            multifiling: flag("MultiFiling"),
            unfiling: flag("UnFiling"),
            pwc_updatable: flag("PWCUpdatable"),
            version_specific_filing: flag("VersionSpecificFiling"),
            acl,
            query,
        }
    }
}

#[derive(Debug)]
struct Inner {
    doc: ServiceDocument,
    transport: Arc<dyn Transport>,
    capabilities: Capabilities,
    registry: TypeRegistry,
    root_folder: OnceLock<Entry>,
}

/// Handle to one remote content repository.
#[derive(Debug, Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

/// Option keys accepted by [`Repository::query`].
const QUERY_OPTIONS: &[&str] = &[
    "searchAllVersions",
    "includeAllowableActions",
    "includeRelationships",
    "renditionFilter",
    "maxItems",
    "skipCount",
];

impl Repository {
    /// Build a repository handle from a parsed service document.
    pub fn new(doc: ServiceDocument, transport: Arc<dyn Transport>) -> Self {
        let capabilities = Capabilities::from_document(&doc);
        let registry = TypeRegistry::new(
            Arc::clone(&transport),
            doc.template("typebyid").map(|t| t.template.clone()),
        );
        Repository {
            inner: Arc::new(Inner {
                doc,
                transport,
                capabilities,
                registry,
                root_folder: OnceLock::new(),
            }),
        }
    }

    /// Fetch the service document at `url` and build a repository handle
    /// from it.
    pub fn connect(transport: Arc<dyn Transport>, url: &str) -> Result<Self> {
        debug!(url, "fetching service document");
        let doc = transport.get_service_document(url)?;
        Ok(Repository::new(doc, transport))
    }

    /// The repository identifier.
    pub fn id(&self) -> &str {
        &self.inner.doc.repository_id
    }

    /// The CMIS protocol version the repository speaks.
    pub fn cmis_version(&self) -> &str {
        &self.inner.doc.cmis_version
    }

    /// The repository's capability flags.
    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Private working copies may be updated outside a checkin.
    pub fn pwc_updatable(&self) -> bool {
        self.inner.capabilities.pwc_updatable
    }

    /// Individual versions of a document may be filed independently.
    pub fn version_specific_filing(&self) -> bool {
        self.inner.capabilities.version_specific_filing
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// Fetch the object with the given id.
    pub fn object_by_id(&self, id: &str) -> Result<Object> {
        let url = self.object_url(id)?;
        let entry = self.inner.transport.get_entry(&url)?;
        Object::from_entry(self, entry)
    }

    /// Resolve the `objectbyid` URI template for an object, asking for the
    /// inline allowable-actions and ACL blocks.
    pub(crate) fn object_url(&self, id: &str) -> Result<String> {
        let template = self.inner.doc.template("objectbyid").ok_or_else(|| {
            Error::protocol("repository does not define required URI template 'objectbyid'")
        })?;
        Ok(fill_template(
            &template.template,
            &[
                ("id", id),
                ("includeAllowableActions", "true"),
                ("includeACL", "true"),
                ("renditionFilter", "*"),
            ],
        ))
    }

    /// The type definition with the given id.
    pub fn type_by_id(&self, id: &str) -> Result<Arc<TypeDefinition>> {
        self.inner.registry.type_by_id(id)
    }

    /// A new transient object of the given type.
    ///
    /// Fails with `ConstraintViolation` when the type is not creatable.
    pub fn new_object(&self, type_id: &str) -> Result<Object> {
        let def = self.type_by_id(type_id)?;
        if !def.creatable {
            return Err(Error::ConstraintViolation(format!(
                "type {} is not creatable",
                def.id
            )));
        }
        Object::transient(self, def)
    }

    /// The repository's root folder.
    pub fn root_folder(&self) -> Result<Object> {
        if let Some(entry) = self.inner.root_folder.get() {
            return Object::from_entry(self, entry.clone());
        }
        let url = self.object_url(&self.inner.doc.root_folder_id)?;
        let entry = self.inner.transport.get_entry(&url)?;
        let entry = self.inner.root_folder.get_or_init(|| entry).clone();
        Object::from_entry(self, entry)
    }

    /// The base types supported by the repository.
    ///
    /// Structurally empty when the repository advertises no types
    /// collection.
    pub fn base_types(&self) -> Collection<Arc<TypeDefinition>> {
        let repo = self.clone();
        Collection::new(
            Arc::clone(&self.inner.transport),
            self.inner.doc.collection("types").map(str::to_string),
            move |entry| repo.inner.registry.register_entry(&entry),
        )
    }

    /// Every type used by the repository: the base types plus all their
    /// subtypes, flattened.
    pub fn types(&self) -> Result<Vec<Arc<TypeDefinition>>> {
        let mut all = Vec::new();
        for base in self.base_types().iter() {
            let base = base?;
            all.extend(self.inner.registry.all_subtypes(&base.id)?);
        }
        Ok(all)
    }

    /// The `root` top-level collection; structurally empty when absent.
    pub fn root_collection(&self) -> Collection<Object> {
        self.object_collection(self.inner.doc.collection("root"))
    }

    /// The checked-out-documents collection; structurally empty when absent.
    pub fn checkedout(&self) -> Collection<Object> {
        self.object_collection(self.inner.doc.collection("checkedout"))
    }

    /// The unfiled-objects collection; structurally empty when absent.
    pub fn unfiled(&self) -> Collection<Object> {
        self.object_collection(self.inner.doc.collection("unfiled"))
    }

    pub(crate) fn checkedout_href(&self) -> Option<&str> {
        self.inner.doc.collection("checkedout")
    }

    pub(crate) fn unfiled_href(&self) -> Option<&str> {
        self.inner.doc.collection("unfiled")
    }

    pub(crate) fn object_collection(&self, href: Option<&str>) -> Collection<Object> {
        let repo = self.clone();
        Collection::new(
            Arc::clone(&self.inner.transport),
            href.map(str::to_string),
            move |entry| Object::from_entry(&repo, entry),
        )
    }

    /// Run a CMIS query.
    ///
    /// The statement is handed to the `query` URI template as an opaque
    /// string. Fails with `NotSupported` before issuing any request when
    /// the repository's query capability is `none`; unknown option keys
    /// fail with `InvalidArgument`.
    pub fn query(&self, statement: &str, options: &[(&str, &str)]) -> Result<Collection<QueryResult>> {
        if !self.inner.capabilities.query.supported() {
            return Err(Error::NotSupported("this repository does not support queries".into()));
        }
        if let Some((key, _)) = options.iter().find(|(k, _)| !QUERY_OPTIONS.contains(k)) {
            return Err(Error::InvalidArgument(format!("invalid query option: {key}")));
        }
        let template = self.inner.doc.template("query").ok_or_else(|| {
            Error::protocol("repository does not define required URI template 'query'")
        })?;
        let mut params = vec![("q", statement)];
        params.extend_from_slice(options);
        let url = fill_template(&template.template, &params);
        debug!(url = %url, "issuing query");
        Ok(Collection::new(
            Arc::clone(&self.inner.transport),
            Some(url),
            |entry| Ok(QueryResult::new(entry)),
        ))
    }

    /// The change log since the given token, when the repository exposes
    /// one. Completely uncached.
    pub fn changes(&self, options: &[(&str, &str)]) -> Option<Collection<Entry>> {
        let href = self.inner.doc.link(rel::CHANGES)?;
        let url = append_parameters(href, options);
        Some(Collection::entries(Arc::clone(&self.inner.transport), Some(url)))
    }

    /// The principal id standing for anonymous users; only meaningful when
    /// ACLs are at least discoverable.
    pub fn anonymous_user(&self) -> Option<&str> {
        if self.inner.capabilities.acl.readable() {
            self.inner.doc.principal_anonymous.as_deref()
        } else {
            None
        }
    }

    /// The principal id standing for everyone; only meaningful when ACLs
    /// are at least discoverable.
    pub fn world_user(&self) -> Option<&str> {
        if self.inner.capabilities.acl.readable() {
            self.inner.doc.principal_anyone.as_deref()
        } else {
            None
        }
    }
}

/// Substitute `{key}` placeholders in a URI template.
///
/// Values are percent-encoded; a key absent from `values` is treated as
/// the empty string; a value whose key the template never references is
/// silently dropped.
pub(crate) fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                let value =
                    values.iter().find(|(k, _)| *k == key).map(|(_, v)| *v).unwrap_or("");
                out.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Append percent-encoded query parameters to a URL that may already carry
/// a query string.
pub(crate) fn append_parameters(url: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::from(url);
    for (key, value) in params {
        out.push(if out.contains('?') { '&' } else { '?' });
        out.extend(url::form_urlencoded::byte_serialize(key.as_bytes()));
        out.push('=');
        out.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
    }
    out
}
