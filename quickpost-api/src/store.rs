use std::sync::Arc;

use async_trait::async_trait;

use crate::{Comment, CommentListing, Error, NewComment, PageParam};

/// The remote side holding the authoritative comment list
#[async_trait]
pub trait RemoteCommentStore: Send + Sync {
    /// Persists a comment and returns it with its server-assigned id
    async fn create_comment(&self, c: NewComment) -> Result<Comment, Error>;

    /// Returns page `page` (1-based) of at most `limit` comments, newest first
    async fn fetch_comments(&self, page: PageParam, limit: usize) -> Result<CommentListing, Error>;
}

#[async_trait]
impl<S: RemoteCommentStore + ?Sized> RemoteCommentStore for Arc<S> {
    async fn create_comment(&self, c: NewComment) -> Result<Comment, Error> {
        (**self).create_comment(c).await
    }

    async fn fetch_comments(&self, page: PageParam, limit: usize) -> Result<CommentListing, Error> {
        (**self).fetch_comments(page, limit).await
    }
}
