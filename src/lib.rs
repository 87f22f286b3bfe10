//! # CMIS Client
//!
//! Blocking client for CMIS content repositories over the AtomPub binding.
//!
//! The crate connects to a repository's service document and exposes the
//! repository object model, including:
//!
//! - **Repository**: capability flags, URI templates, top-level
//!   collections and CMIS SQL queries
//! - **Object**: typed instances of the document, folder, policy and
//!   relationship base kinds, with local mutation and an ordered,
//!   non-atomic save protocol
//! - **Collection**: lazily-paginated, restartable feeds
//! - **Acl**: per-object access-control lists persisted through save
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cmis_client::{HttpTransport, Repository};
//!
//! // Authenticate and fetch the service document
//! let transport = HttpTransport::builder()
//!     .basic_auth("alice", "secret")
//!     .build()?;
//! let repo = Repository::connect(Arc::new(transport), "https://cmis.example.com/atom")?;
//!
//! // Create and file a document
//! let root = repo.root_folder()?;
//! let mut doc = repo.new_object("cmis:document")?;
//! doc.update([("cmis:name", "report.txt")])?;
//! doc.file(&root)?;
//! doc.save()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Access-control lists
pub mod acl;
/// Memoized lazy-loading cache slots
pub mod cache;
/// Lazily-paginated collections
pub mod collection;
/// Error types
pub mod error;
/// Typed object instances and the save protocol
pub mod object;
/// Atomic property types, values and wire coercion
pub mod property;
/// Typeless query result rows
pub mod query;
/// Repository handle, capabilities and URI templates
pub mod repository;
/// Transport boundary and the bundled HTTP implementation
pub mod transport;
/// Type definitions and the type registry
pub mod types;
/// Structured wire documents
pub mod wire;

// Re-export key types at crate root
pub use acl::{Acl, AclEntry};
pub use collection::Collection;
pub use error::{Error, Result};
pub use object::{Aspect, Object, RelationshipDirection, SaveError, Saved};
pub use property::{AtomicType, PropertyValue, Value};
pub use query::QueryResult;
pub use repository::{AclCapability, Capabilities, QueryCapability, Repository};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{BaseKind, PropertyDefinition, TypeDefinition, Updatability};
