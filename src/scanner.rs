use serde_json::Value;

use crate::error::StoreError;
use crate::store::{DocumentStore, Page};

/// Bookmark-paginated cursor over a filtered view of the collection.
///
/// The bookmark is an opaque continuation token returned by the store after
/// each page and threaded into the next request unchanged. Numeric offsets
/// are neither available nor stable here: the collection is mutated between
/// pages by the very writes this engine issues. An empty page terminates the
/// scan; a collection with zero matching documents performs one query and
/// stops.
pub struct PageScanner<'a> {
    store: &'a dyn DocumentStore,
    selector: Value,
    index: String,
    page_size: usize,
    bookmark: Option<String>,
    done: bool,
}

impl<'a> PageScanner<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        selector: Value,
        index: String,
        page_size: usize,
        start_bookmark: Option<String>,
    ) -> Self {
        Self {
            store,
            selector,
            index,
            page_size,
            bookmark: start_bookmark,
            done: false,
        }
    }

    /// The next non-empty page, or `None` once the scan is finished.
    pub async fn next_page(&mut self) -> Result<Option<Page>, StoreError> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .store
            .find_page(
                &self.selector,
                &self.index,
                self.page_size,
                self.bookmark.as_deref(),
            )
            .await?;
        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.bookmark = page.bookmark.clone();
        Ok(Some(page))
    }

    /// Continuation token of the most recent page.
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.as_deref()
    }
}
