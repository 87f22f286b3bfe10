//! Repository handle integration tests: capabilities, templates, types
//! and queries.

mod common;

use cmis_client::wire::{rel, Feed};
use cmis_client::{
    AclCapability, AtomicType, BaseKind, Error, PropertyValue, QueryCapability, Transport,
    Updatability, Value,
};
use common::*;
use indexmap::IndexMap;
use std::sync::Arc;

#[test]
fn test_connect_fetches_the_service_document() {
    let transport = FakeTransport::new();
    transport.serve_document(&format!("{BASE}/atom"), service_document(&RepoConfig::default()));

    let repo = cmis_client::Repository::connect(
        Arc::clone(&transport) as Arc<dyn Transport>,
        &format!("{BASE}/atom"),
    )
    .unwrap();

    assert_eq!(repo.id(), "test-repo");
    assert_eq!(repo.cmis_version(), "1.0");
}

#[test]
fn test_capabilities_are_parsed_from_the_service_document() {
    let transport = FakeTransport::new();
    let config = RepoConfig {
        multifiling: false,
        unfiling: true,
        acl: "discover",
        query: "metadataonly",
        ..RepoConfig::default()
    };
    let repo = repository(&transport, &config);

    let caps = repo.capabilities();
    assert!(!caps.multifiling);
    assert!(caps.unfiling);
    assert_eq!(caps.acl, AclCapability::Discover);
    assert_eq!(caps.query, QueryCapability::MetadataOnly);
}

#[test]
fn test_root_folder_is_fetched_once() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);

    let root = repo.root_folder().unwrap();
    let again = repo.root_folder().unwrap();
    assert_eq!(root.id(), again.id());

    let root_fetches = transport
        .requests()
        .iter()
        .filter(|r| matches!(r, Request::GetEntry(url) if url.starts_with(&object_url("root"))))
        .count();
    assert_eq!(root_fetches, 1);
}

#[test]
fn test_unknown_object_id_surfaces_the_transport_status() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);

    match repo.object_by_id("missing") {
        Err(Error::Transport(e)) => assert_eq!(e.status, Some(404)),
        other => panic!("expected a transport error, got {other:?}"),
    }
}

#[test]
fn test_type_definitions_inherit_parent_attributes() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);

    let mut properties = IndexMap::new();
    let flag = prop_def("my:flag", AtomicType::Boolean, Updatability::ReadWrite, false);
    properties.insert(flag.id.clone(), flag);
    serve_type(
        &transport,
        cmis_client::TypeDefinition {
            id: "my:doc".to_string(),
            parent: Some("cmis:document".to_string()),
            properties,
            ..document_type()
        },
    );

    let mut doc = repo.new_object("my:doc").unwrap();
    // Own and inherited attributes are both writable.
    doc.update([("my:flag", true)]).unwrap();
    doc.update([("cmis:name", "typed")]).unwrap();
    assert_eq!(doc.attribute("my:flag").unwrap(), PropertyValue::Single(Value::Boolean(true)));
}

#[test]
fn test_query_is_gated_before_any_request() {
    let transport = FakeTransport::new();
    let config = RepoConfig { query: "none", ..RepoConfig::default() };
    let repo = repository(&transport, &config);
    let before = transport.request_count();

    let result = repo.query("SELECT * FROM cmis:document", &[]);
    assert!(matches!(result, Err(Error::NotSupported(_))));
    assert_eq!(transport.request_count(), before);
}

#[test]
fn test_query_rejects_unknown_options() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);

    let result = repo.query("SELECT * FROM cmis:document", &[("pageSize", "10")]);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_query_rows_coerce_values_by_declared_type() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);

    let row = cmis_client::wire::Entry {
        properties: vec![
            text_property("cmis:name", AtomicType::String, "report"),
            text_property("my:count", AtomicType::Integer, "17"),
        ],
        ..Default::default()
    };
    transport.serve_feed(&format!("{BASE}/query?q="), feed_of(vec![row]));

    let rows = repo
        .query("SELECT * FROM cmis:document", &[("maxItems", "10")])
        .unwrap()
        .items()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("my:count").unwrap(), PropertyValue::Single(Value::Integer(17)));
}

#[test]
fn test_base_types_register_through_the_types_collection() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);
    let type_entry = |def: cmis_client::TypeDefinition| cmis_client::wire::Entry {
        type_definition: Some(def),
        ..Default::default()
    };
    transport.serve_feed(
        &format!("{BASE}/types"),
        Feed {
            entries: vec![type_entry(document_type()), type_entry(folder_type())],
            next: None,
            num_items: Some(2),
        },
    );

    let bases = repo.base_types().items().unwrap();
    assert_eq!(bases.len(), 2);
    assert!(bases.iter().any(|t| t.base == BaseKind::Folder));
}

#[test]
fn test_types_deduplicates_overlapping_subtype_trees() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);
    let type_entry = |def: cmis_client::TypeDefinition, children: Option<&str>| {
        let links = children
            .map(|href| vec![link(rel::DOWN, href, Some("application/atom+xml;type=feed"))])
            .unwrap_or_default();
        cmis_client::wire::Entry { type_definition: Some(def), links, ..Default::default() }
    };
    let subtype = |id: &str| cmis_client::TypeDefinition {
        id: id.to_string(),
        parent: Some("cmis:document".to_string()),
        ..document_type()
    };

    transport.serve_feed(
        &format!("{BASE}/types"),
        feed_of(vec![type_entry(document_type(), Some(&format!("{BASE}/subtypes/doc")))]),
    );
    // Both intermediate subtypes report the same grandchild.
    transport.serve_feed(
        &format!("{BASE}/subtypes/doc"),
        feed_of(vec![
            type_entry(subtype("my:a"), Some(&format!("{BASE}/subtypes/a"))),
            type_entry(subtype("my:b"), Some(&format!("{BASE}/subtypes/b"))),
        ]),
    );
    transport
        .serve_feed(&format!("{BASE}/subtypes/a"), feed_of(vec![type_entry(subtype("my:shared"), None)]));
    transport
        .serve_feed(&format!("{BASE}/subtypes/b"), feed_of(vec![type_entry(subtype("my:shared"), None)]));

    let types = repo.types().unwrap();
    let ids: Vec<&str> = types.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(types.len(), 4);
    assert_eq!(ids.iter().filter(|id| **id == "my:shared").count(), 1);
    assert!(ids.contains(&"my:a") && ids.contains(&"my:b"));
}

#[test]
fn test_principals_are_gated_on_acl_capability() {
    let transport = FakeTransport::new();
    let readable = repository(&transport, &RepoConfig::default());
    assert_eq!(readable.anonymous_user(), Some("anonymous"));
    assert_eq!(readable.world_user(), Some("everyone"));

    let hidden_transport = FakeTransport::new();
    let hidden = repository(&hidden_transport, &RepoConfig { acl: "none", ..RepoConfig::default() });
    assert_eq!(hidden.anonymous_user(), None);
    assert_eq!(hidden.world_user(), None);
}

#[test]
fn test_changes_feed_is_absent_without_a_changes_link() {
    let transport = FakeTransport::new();
    let repo = repository_with_defaults(&transport);
    assert!(repo.changes(&[]).is_none());
}
