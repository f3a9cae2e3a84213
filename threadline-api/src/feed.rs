use crate::{Comment, CommentId, PostId};

/// Messages pushed by the server to connected clients
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeedMessage {
    Pong,

    #[serde(rename_all = "camelCase")]
    NewComment { post_id: PostId, comment: Comment },

    #[serde(rename_all = "camelCase")]
    CountersChanged {
        post_id: PostId,
        comment_id: CommentId,
        likes_count: u64,
        replies_count: u64,
    },
}

impl FeedMessage {
    pub fn post_id(&self) -> Option<&PostId> {
        match self {
            FeedMessage::Pong => None,
            FeedMessage::NewComment { post_id, .. } => Some(post_id),
            FeedMessage::CountersChanged { post_id, .. } => Some(post_id),
        }
    }
}
