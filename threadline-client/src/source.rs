use std::sync::Arc;

use async_trait::async_trait;

use crate::api::{Comment, CommentId, NewComment, PageRequest, PostId, RootPage};

/// The remote end of the comment engine. Response shapes must already be normalized.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_roots(&self, post: &PostId, req: PageRequest) -> anyhow::Result<RootPage>;

    /// All the replies to `parent` the server is willing to show, in one go
    async fn fetch_replies(&self, parent: &CommentId) -> anyhow::Result<Vec<Comment>>;

    async fn submit(&self, post: &PostId, comment: NewComment) -> anyhow::Result<Comment>;
}

#[async_trait]
impl<S: CommentSource + ?Sized> CommentSource for Arc<S> {
    async fn fetch_roots(&self, post: &PostId, req: PageRequest) -> anyhow::Result<RootPage> {
        (**self).fetch_roots(post, req).await
    }

    async fn fetch_replies(&self, parent: &CommentId) -> anyhow::Result<Vec<Comment>> {
        (**self).fetch_replies(parent).await
    }

    async fn submit(&self, post: &PostId, comment: NewComment) -> anyhow::Result<Comment> {
        (**self).submit(post, comment).await
    }
}
