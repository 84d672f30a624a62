use crate::{
    api::{
        CommentPage, CommentPages, Error, InfiniteData, PageParam, RemoteCommentStore, FIRST_PAGE,
    },
    key, FetchStatus, MemoryCache, QueryCache, QueryKey,
};

pub const PAGE_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NextPage {
    Fetched(FetchStatus),

    /// The last loaded page was not full, there is nothing more to load
    Exhausted,
}

/// Comment list loaded page by page into a `MemoryCache`
pub struct InfiniteCommentsQuery<S> {
    cache: MemoryCache<CommentPages>,
    store: S,
    key: QueryKey,
}

impl<S: RemoteCommentStore> InfiniteCommentsQuery<S> {
    pub fn new(cache: MemoryCache<CommentPages>, store: S) -> InfiniteCommentsQuery<S> {
        InfiniteCommentsQuery {
            cache,
            store,
            key: key::comments::all(),
        }
    }

    pub fn with_key(mut self, key: QueryKey) -> InfiniteCommentsQuery<S> {
        self.key = key;
        self
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn data(&self) -> Option<CommentPages> {
        self.cache.get(&self.key)
    }

    pub fn has_next_page(&self) -> bool {
        match self.data() {
            None => true,
            Some(d) if d.pages.is_empty() => true,
            Some(d) => d.last_next_page().is_some(),
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.cache.is_fetching(&self.key)
    }

    pub async fn fetch_next_page(&self) -> Result<NextPage, Error> {
        let page = match self.data() {
            None => FIRST_PAGE,
            Some(d) if d.pages.is_empty() => FIRST_PAGE,
            Some(d) => match d.last_next_page() {
                Some(p) => p,
                None => return Ok(NextPage::Exhausted),
            },
        };
        tracing::debug!(key = %self.key, page, "fetching comments page");
        let status = self
            .cache
            .fetch(
                &self.key,
                self.store.fetch_comments(page, PAGE_SIZE),
                move |old, listing| {
                    let fetched = CommentPage::from_listing(listing, page, PAGE_SIZE);
                    match old {
                        None => InfiniteData::first(fetched, page),
                        Some(old) => {
                            let mut data = old.clone();
                            match data.page_params.iter().position(|p| *p == page) {
                                // someone else loaded it meanwhile
                                Some(idx) => data.pages[idx] = fetched,
                                None => data.push_page(fetched, page),
                            }
                            data
                        }
                    }
                },
            )
            .await?;
        Ok(NextPage::Fetched(status))
    }

    /// Reloads every page currently loaded (at least the first one), and
    /// replaces the cached value once they all came in
    pub async fn refetch(&self) -> Result<FetchStatus, Error> {
        let num_pages = self.data().map_or(1, |d| std::cmp::max(1, d.pages.len()));
        tracing::debug!(key = %self.key, num_pages, "refetching comments");
        let store = &self.store;
        let fetcher = async move {
            let first = fetch_page(store, FIRST_PAGE).await?;
            let mut next = first.next_page;
            let mut data = InfiniteData::first(first, FIRST_PAGE);
            while data.pages.len() < num_pages {
                let page = match next {
                    None => break,
                    Some(p) => p,
                };
                let fetched = fetch_page(store, page).await?;
                next = fetched.next_page;
                data.push_page(fetched, page);
            }
            Ok::<_, Error>(data)
        };
        self.cache.fetch(&self.key, fetcher, |_, data| data).await
    }

    /// Loads the first page or refetches, if the cached value is stale.
    /// Returns `None` when the cache was fresh.
    pub async fn ensure_fresh(&self) -> Result<Option<FetchStatus>, Error> {
        if !self.cache.is_stale(&self.key) {
            return Ok(None);
        }
        match self.data() {
            None => match self.fetch_next_page().await? {
                NextPage::Fetched(status) => Ok(Some(status)),
                NextPage::Exhausted => Ok(None),
            },
            Some(_) => self.refetch().await.map(Some),
        }
    }
}

async fn fetch_page<S: RemoteCommentStore>(store: &S, page: PageParam) -> Result<CommentPage, Error> {
    let listing = store.fetch_comments(page, PAGE_SIZE).await?;
    Ok(CommentPage::from_listing(listing, page, PAGE_SIZE))
}
