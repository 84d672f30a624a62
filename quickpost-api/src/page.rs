use crate::{Comment, CommentId};

/// 1-based page number, as understood by the remote store
pub type PageParam = u32;

pub const FIRST_PAGE: PageParam = 1;

/// One page of comments as answered by the remote store
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListing {
    pub comments: Vec<Comment>,
    pub total_count: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    /// Newest first
    pub comments: Vec<Comment>,
    pub next_page: Option<PageParam>,
    pub total_count: u64,
}

impl CommentPage {
    /// Builds the page stored for `page`: a page that came back full is
    /// assumed to have a successor
    pub fn from_listing(listing: CommentListing, page: PageParam, limit: usize) -> CommentPage {
        let next_page = (listing.comments.len() == limit).then(|| page + 1);
        CommentPage {
            comments: listing.comments,
            next_page,
            total_count: listing.total_count,
        }
    }
}

/// Cached value of a paginated query: every page loaded so far, with the
/// page parameter each was fetched with
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteData<P> {
    pub pages: Vec<P>,
    pub page_params: Vec<PageParam>,
}

impl<P> InfiniteData<P> {
    pub fn first(page: P, param: PageParam) -> InfiniteData<P> {
        InfiniteData {
            pages: vec![page],
            page_params: vec![param],
        }
    }

    pub fn push_page(&mut self, page: P, param: PageParam) {
        self.pages.push(page);
        self.page_params.push(param);
    }
}

pub type CommentPages = InfiniteData<CommentPage>;

impl CommentPages {
    /// Returns a copy with `comment` on top of the first page, counted in its
    /// total, or `None` if no page was loaded yet
    pub fn with_prepended(&self, comment: Comment) -> Option<CommentPages> {
        let mut res = self.clone();
        let first = res.pages.first_mut()?;
        first.total_count += 1;
        first.comments.insert(0, comment);
        Some(res)
    }

    /// Returns a copy where the placeholder for `client_id` is swapped for
    /// `comment`, or `None` if there is no such placeholder anymore
    pub fn with_placeholder_replaced(
        &self,
        client_id: CommentId,
        comment: Comment,
    ) -> Option<CommentPages> {
        let mut res = self.clone();
        let slot = res
            .pages
            .iter_mut()
            .flat_map(|p| p.comments.iter_mut())
            .find(|c| c.is_placeholder_for(client_id))?;
        *slot = comment;
        Some(res)
    }

    /// Returns a copy without the placeholder for `client_id`, uncounted from
    /// the first page's total, or `None` if there is no such placeholder
    pub fn without_placeholder(&self, client_id: CommentId) -> Option<CommentPages> {
        let mut res = self.clone();
        let (page, idx) = res.pages.iter().enumerate().find_map(|(page, p)| {
            p.comments
                .iter()
                .position(|c| c.is_placeholder_for(client_id))
                .map(|idx| (page, idx))
        })?;
        res.pages[page].comments.remove(idx);
        res.pages[0].total_count = res.pages[0].total_count.saturating_sub(1);
        Some(res)
    }

    pub fn find_by_key(&self, key: CommentId) -> Option<&Comment> {
        self.comments().find(|c| c.key() == key)
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.pages.iter().flat_map(|p| p.comments.iter())
    }

    pub fn last_next_page(&self) -> Option<PageParam> {
        self.pages.last().and_then(|p| p.next_page)
    }
}
