//! Lazily-paginated, restartable collections.
//!
//! Feeds, query results and one-to-many relations all come back as paged
//! result sets. A [`Collection`] remembers only how to fetch the first page
//! and a per-entry transform; iterating materializes one page at a time,
//! following `next` links until they run out. Iterating again re-issues the
//! fetches from page one; nothing beyond the currently materialized page is
//! memoized.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::wire::Entry;

type Transform<T> = Arc<dyn Fn(Entry) -> Result<T> + Send + Sync>;

/// An ordered, lazily-realized sequence of `T` backed by a paginated feed.
///
/// A collection declared without an href (the repository advertises no such
/// feed) behaves as a zero-length, always-exhausted sequence rather than an
/// error.
pub struct Collection<T> {
    transport: Arc<dyn Transport>,
    href: Option<String>,
    transform: Transform<T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            href: self.href.clone(),
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("href", &self.href).finish()
    }
}

impl Collection<Entry> {
    /// A collection yielding raw entries.
    pub fn entries(transport: Arc<dyn Transport>, href: Option<String>) -> Self {
        Collection { transport, href, transform: Arc::new(Ok) }
    }
}

impl<T: 'static> Collection<T> {
    /// A collection applying `transform` to every entry.
    pub fn new(
        transport: Arc<dyn Transport>,
        href: Option<String>,
        transform: impl Fn(Entry) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Collection { transport, href, transform: Arc::new(transform) }
    }

    /// An always-exhausted collection.
    pub fn empty(transport: Arc<dyn Transport>) -> Self {
        Collection {
            transport,
            href: None,
            transform: Arc::new(|_| Err(Error::protocol("empty collection yielded an entry"))),
        }
    }

    /// Whether the backing feed exists at all.
    pub fn is_declared(&self) -> bool {
        self.href.is_some()
    }

    /// Compose a further transform, lazily.
    pub fn map<U: 'static>(
        self,
        f: impl Fn(T) -> Result<U> + Send + Sync + 'static,
    ) -> Collection<U> {
        let inner = self.transform;
        Collection {
            transport: self.transport,
            href: self.href,
            transform: Arc::new(move |entry| f(inner(entry)?)),
        }
    }

    /// Total item count as reported by the first page, when the repository
    /// reports one. Issues a page fetch.
    pub fn len_hint(&self) -> Result<Option<u64>> {
        match &self.href {
            None => Ok(Some(0)),
            Some(href) => Ok(self.transport.get_feed(href)?.num_items),
        }
    }

    /// Iterate the sequence from the first page. Each call restarts with
    /// fresh page fetches.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            transport: Arc::clone(&self.transport),
            transform: Arc::clone(&self.transform),
            page: VecDeque::new(),
            next_href: self.href.clone(),
            failed: false,
        }
    }

    /// Materialize the whole sequence, failing on the first error.
    pub fn items(&self) -> Result<Vec<T>> {
        self.iter().collect()
    }
}

/// Lazy iterator over a [`Collection`]; yields per-item results so a page
/// fetch failure surfaces in place.
pub struct Iter<T> {
    transport: Arc<dyn Transport>,
    transform: Transform<T>,
    page: VecDeque<Entry>,
    next_href: Option<String>,
    failed: bool,
}

impl<T> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(entry) = self.page.pop_front() {
                return Some((self.transform)(entry));
            }
            let href = self.next_href.take()?;
            trace!(url = %href, "fetching collection page");
            match self.transport.get_feed(&href) {
                Ok(feed) => {
                    self.page = feed.entries.into();
                    self.next_href = feed.next;
                    if self.page.is_empty() && self.next_href.is_none() {
                        return None;
                    }
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}
