//! Helper utilities for integration tests

#![allow(dead_code)] // Some test files use subsets of these utilities

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use cmis_client::wire::{
    rel, CollectionLink, Entry, Feed, Link, ServiceDocument, UriTemplate, WireAce, WireProperty,
};
use cmis_client::{
    AtomicType, BaseKind, PropertyDefinition, Repository, Transport, TransportError,
    TypeDefinition, Updatability,
};
use indexmap::IndexMap;

pub const BASE: &str = "http://repo";

/// One request captured by the fake transport, with its body where the
/// request carried one.
#[derive(Debug, Clone)]
pub enum Request {
    GetServiceDocument(String),
    GetEntry(String),
    GetFeed(String),
    GetActions(String),
    GetAcl(String),
    PostEntry { url: String, body: Entry },
    PutEntry { url: String, body: Entry },
    PutAcl { url: String, body: Vec<WireAce> },
}

impl Request {
    pub fn url(&self) -> &str {
        match self {
            Request::GetServiceDocument(url)
            | Request::GetEntry(url)
            | Request::GetFeed(url)
            | Request::GetActions(url)
            | Request::GetAcl(url) => url,
            Request::PostEntry { url, .. }
            | Request::PutEntry { url, .. }
            | Request::PutAcl { url, .. } => url,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::PostEntry { .. } | Request::PutEntry { .. } | Request::PutAcl { .. }
        )
    }
}

/// In-memory transport serving canned documents and recording every
/// request. Canned responses are keyed by URL prefix so requests carrying
/// extra query parameters still match; the longest registered prefix wins.
#[derive(Debug, Default)]
pub struct FakeTransport {
    documents: Mutex<BTreeMap<String, ServiceDocument>>,
    entries: Mutex<BTreeMap<String, Entry>>,
    feeds: Mutex<BTreeMap<String, Feed>>,
    actions: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    acls: Mutex<BTreeMap<String, Vec<WireAce>>>,
    post_responses: Mutex<BTreeMap<String, Vec<Entry>>>,
    put_responses: Mutex<BTreeMap<String, Entry>>,
    failing: Mutex<BTreeSet<String>>,
    requests: Mutex<Vec<Request>>,
    user: Option<String>,
}

fn lookup<V: Clone>(map: &BTreeMap<String, V>, url: &str) -> Option<V> {
    map.iter()
        .filter(|(key, _)| url.starts_with(key.as_str()))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, value)| value.clone())
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_user(user: &str) -> Arc<Self> {
        Arc::new(FakeTransport { user: Some(user.to_string()), ..Default::default() })
    }

    pub fn serve_document(&self, url: &str, doc: ServiceDocument) {
        self.documents.lock().unwrap().insert(url.to_string(), doc);
    }

    pub fn serve_entry(&self, url: &str, entry: Entry) {
        self.entries.lock().unwrap().insert(url.to_string(), entry);
    }

    pub fn serve_feed(&self, url: &str, feed: Feed) {
        self.feeds.lock().unwrap().insert(url.to_string(), feed);
    }

    pub fn serve_actions(&self, url: &str, actions: BTreeMap<String, String>) {
        self.actions.lock().unwrap().insert(url.to_string(), actions);
    }

    pub fn serve_acl(&self, url: &str, aces: Vec<WireAce>) {
        self.acls.lock().unwrap().insert(url.to_string(), aces);
    }

    /// Queue a response for a POST to the given URL prefix; queued
    /// responses are consumed in order. With no queued response the
    /// request body is echoed back.
    pub fn on_post(&self, url: &str, response: Entry) {
        self.post_responses.lock().unwrap().entry(url.to_string()).or_default().push(response);
    }

    /// Can a response for PUTs to the given URL prefix. Without one, the
    /// canned entry for the same prefix is returned; without that, the
    /// request body is echoed back.
    pub fn on_put(&self, url: &str, response: Entry) {
        self.put_responses.lock().unwrap().insert(url.to_string(), response);
    }

    /// Make every request whose URL starts with `url` fail.
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// Let previously failing URLs succeed again.
    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn write_requests(&self) -> Vec<Request> {
        self.requests().into_iter().filter(Request::is_write).collect()
    }

    fn record(&self, request: Request) -> Result<(), TransportError> {
        let url = request.url().to_string();
        self.requests.lock().unwrap().push(request);
        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|prefix| url.starts_with(prefix.as_str())) {
            return Err(TransportError::status(500, format!("canned failure for {url}")));
        }
        Ok(())
    }
}

impl Transport for FakeTransport {
    fn get_service_document(&self, url: &str) -> Result<ServiceDocument, TransportError> {
        self.record(Request::GetServiceDocument(url.to_string()))?;
        lookup(&self.documents.lock().unwrap(), url)
            .ok_or_else(|| TransportError::status(404, format!("no service document at {url}")))
    }

    fn get_entry(&self, url: &str) -> Result<Entry, TransportError> {
        self.record(Request::GetEntry(url.to_string()))?;
        lookup(&self.entries.lock().unwrap(), url)
            .ok_or_else(|| TransportError::status(404, format!("no entry at {url}")))
    }

    fn get_feed(&self, url: &str) -> Result<Feed, TransportError> {
        self.record(Request::GetFeed(url.to_string()))?;
        lookup(&self.feeds.lock().unwrap(), url)
            .ok_or_else(|| TransportError::status(404, format!("no feed at {url}")))
    }

    fn get_actions(&self, url: &str) -> Result<BTreeMap<String, String>, TransportError> {
        self.record(Request::GetActions(url.to_string()))?;
        lookup(&self.actions.lock().unwrap(), url)
            .ok_or_else(|| TransportError::status(404, format!("no actions at {url}")))
    }

    fn get_acl(&self, url: &str) -> Result<Vec<WireAce>, TransportError> {
        self.record(Request::GetAcl(url.to_string()))?;
        lookup(&self.acls.lock().unwrap(), url)
            .ok_or_else(|| TransportError::status(404, format!("no acl at {url}")))
    }

    fn post_entry(&self, url: &str, entry: &Entry) -> Result<Entry, TransportError> {
        self.record(Request::PostEntry { url: url.to_string(), body: entry.clone() })?;
        let mut queues = self.post_responses.lock().unwrap();
        let queued = queues
            .iter_mut()
            .filter(|(key, _)| url.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .and_then(|(_, queue)| if queue.is_empty() { None } else { Some(queue.remove(0)) });
        Ok(queued.unwrap_or_else(|| entry.clone()))
    }

    fn put_entry(&self, url: &str, entry: &Entry) -> Result<Entry, TransportError> {
        self.record(Request::PutEntry { url: url.to_string(), body: entry.clone() })?;
        if let Some(response) = lookup(&self.put_responses.lock().unwrap(), url) {
            return Ok(response);
        }
        if let Some(canned) = lookup(&self.entries.lock().unwrap(), url) {
            return Ok(canned);
        }
        Ok(entry.clone())
    }

    fn put_acl(&self, url: &str, aces: &[WireAce]) -> Result<Vec<WireAce>, TransportError> {
        self.record(Request::PutAcl { url: url.to_string(), body: aces.to_vec() })?;
        Ok(aces.to_vec())
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

// ---------------------------------------------------------------------
// Service document and repository fixtures

/// Capability knobs for a fixture repository.
pub struct RepoConfig {
    pub multifiling: bool,
    pub unfiling: bool,
    pub pwc_updatable: bool,
    pub acl: &'static str,
    pub query: &'static str,
    /// Whether the service document advertises an unfiled collection.
    pub unfiled_collection: bool,
    pub checkedout_collection: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            multifiling: true,
            unfiling: true,
            pwc_updatable: false,
            acl: "manage",
            query: "bothcombined",
            unfiled_collection: true,
            checkedout_collection: true,
        }
    }
}

pub fn object_url(id: &str) -> String {
    format!("{BASE}/obj/{id}")
}

pub fn type_url(id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    format!("{BASE}/type/{encoded}")
}

pub fn children_url(id: &str) -> String {
    format!("{BASE}/obj/{id}/children")
}

pub fn service_document(config: &RepoConfig) -> ServiceDocument {
    let mut capabilities = BTreeMap::new();
    capabilities.insert("MultiFiling".to_string(), config.multifiling.to_string());
    capabilities.insert("UnFiling".to_string(), config.unfiling.to_string());
    capabilities.insert("PWCUpdatable".to_string(), config.pwc_updatable.to_string());
    capabilities.insert("VersionSpecificFiling".to_string(), "false".to_string());
    capabilities.insert("ACL".to_string(), config.acl.to_string());
    capabilities.insert("Query".to_string(), config.query.to_string());

    let mut collections = vec![
        CollectionLink { kind: "root".to_string(), href: format!("{BASE}/root") },
        CollectionLink { kind: "types".to_string(), href: format!("{BASE}/types") },
    ];
    if config.checkedout_collection {
        collections
            .push(CollectionLink { kind: "checkedout".to_string(), href: format!("{BASE}/checkedout") });
    }
    if config.unfiled_collection {
        collections
            .push(CollectionLink { kind: "unfiled".to_string(), href: format!("{BASE}/unfiled") });
    }

    ServiceDocument {
        repository_id: "test-repo".to_string(),
        cmis_version: "1.0".to_string(),
        root_folder_id: "root".to_string(),
        capabilities,
        uri_templates: vec![
            UriTemplate {
                kind: "objectbyid".to_string(),
                template: format!("{BASE}/obj/{{id}}"),
                media_type: None,
            },
            UriTemplate {
                kind: "typebyid".to_string(),
                template: format!("{BASE}/type/{{id}}"),
                media_type: None,
            },
            UriTemplate {
                kind: "query".to_string(),
                template: format!("{BASE}/query?q={{q}}&maxItems={{maxItems}}"),
                media_type: None,
            },
        ],
        collections,
        links: vec![],
        principal_anonymous: Some("anonymous".to_string()),
        principal_anyone: Some("everyone".to_string()),
    }
}

/// A repository over a fake transport pre-seeded with the standard base
/// types and a root folder.
pub fn repository(transport: &Arc<FakeTransport>, config: &RepoConfig) -> Repository {
    serve_type(transport, document_type());
    serve_type(transport, folder_type());
    serve_type(transport, relationship_type());
    transport.serve_entry(&object_url("root"), folder_entry("root"));
    transport.serve_feed(&children_url("root"), Feed::default());
    Repository::new(service_document(config), Arc::clone(transport) as Arc<dyn Transport>)
}

pub fn repository_with_defaults(transport: &Arc<FakeTransport>) -> Repository {
    repository(transport, &RepoConfig::default())
}

// ---------------------------------------------------------------------
// Type fixtures

pub fn prop_def(
    id: &str,
    atomic: AtomicType,
    updatability: Updatability,
    required: bool,
) -> PropertyDefinition {
    PropertyDefinition {
        id: id.to_string(),
        atomic,
        repeating: false,
        required,
        updatability,
    }
}

fn shared_props() -> IndexMap<String, PropertyDefinition> {
    let defs = [
        prop_def("cmis:objectId", AtomicType::Id, Updatability::ReadOnly, false),
        prop_def("cmis:objectTypeId", AtomicType::Id, Updatability::OnCreate, false),
        prop_def("cmis:name", AtomicType::String, Updatability::ReadWrite, false),
        prop_def("cmis:changeToken", AtomicType::String, Updatability::ReadOnly, false),
    ];
    defs.into_iter().map(|d| (d.id.clone(), d)).collect()
}

pub fn document_type() -> TypeDefinition {
    TypeDefinition {
        id: "cmis:document".to_string(),
        base: BaseKind::Document,
        parent: None,
        creatable: true,
        fileable: true,
        queryable: true,
        controllable_acl: true,
        versionable: true,
        properties: shared_props(),
    }
}

pub fn folder_type() -> TypeDefinition {
    TypeDefinition {
        id: "cmis:folder".to_string(),
        base: BaseKind::Folder,
        parent: None,
        creatable: true,
        fileable: true,
        queryable: true,
        controllable_acl: true,
        versionable: false,
        properties: shared_props(),
    }
}

pub fn relationship_type() -> TypeDefinition {
    let mut properties = shared_props();
    for def in [
        prop_def("cmis:sourceId", AtomicType::Id, Updatability::OnCreate, true),
        prop_def("cmis:targetId", AtomicType::Id, Updatability::OnCreate, true),
    ] {
        properties.insert(def.id.clone(), def);
    }
    TypeDefinition {
        id: "cmis:relationship".to_string(),
        base: BaseKind::Relationship,
        parent: None,
        creatable: true,
        fileable: false,
        queryable: false,
        controllable_acl: false,
        versionable: false,
        properties,
    }
}

/// Serve a type definition entry where the `typebyid` template resolves it.
pub fn serve_type(transport: &FakeTransport, def: TypeDefinition) {
    let url = type_url(&def.id);
    let entry = Entry { type_definition: Some(def), ..Entry::default() };
    transport.serve_entry(&url, entry);
}

// ---------------------------------------------------------------------
// Entry fixtures

pub fn text_property(id: &str, atomic: AtomicType, value: &str) -> WireProperty {
    WireProperty::single(id, atomic, value)
}

pub fn link(rel: &str, href: &str, media_type: Option<&str>) -> Link {
    Link { rel: rel.to_string(), href: href.to_string(), media_type: media_type.map(str::to_string) }
}

/// A minimal persistent entry: identity properties plus a self link.
pub fn object_entry(id: &str, type_id: &str) -> Entry {
    Entry {
        title: Some(id.to_string()),
        properties: vec![
            WireProperty::single("cmis:objectId", AtomicType::Id, id),
            WireProperty::single("cmis:objectTypeId", AtomicType::Id, type_id),
            WireProperty::single("cmis:name", AtomicType::String, id),
        ],
        links: vec![link(rel::SELF, &object_url(id), Some("application/atom+xml;type=entry"))],
        ..Entry::default()
    }
}

pub fn document_entry(id: &str) -> Entry {
    object_entry(id, "cmis:document")
}

/// A folder entry carrying the children feed link creation and refiling
/// POST against.
pub fn folder_entry(id: &str) -> Entry {
    let mut entry = object_entry(id, "cmis:folder");
    entry
        .links
        .push(link(rel::DOWN, &children_url(id), Some("application/atom+xml;type=feed")));
    entry
}

pub fn feed_of(entries: Vec<Entry>) -> Feed {
    Feed { entries, next: None, num_items: None }
}

/// Serve `entry` at its object-by-id URL and return it.
pub fn serve_object(transport: &FakeTransport, entry: Entry) -> Entry {
    let id = entry
        .object_id()
        .expect("fixture entry must carry cmis:objectId")
        .to_string();
    transport.serve_entry(&object_url(&id), entry.clone());
    entry
}
