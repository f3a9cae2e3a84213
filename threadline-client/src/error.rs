use std::sync::Arc;

use crate::api::{self, CommentId};

// Clone because results of in-flight fetches are handed to every caller waiting on them
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] api::Error),

    #[error("fetching from server failed: {0:#}")]
    Transport(Arc<anyhow::Error>),

    #[error("post changed while the request was in flight")]
    SubjectChanged,

    #[error("no post is open")]
    NoSubject,

    #[error("comment {0} is not loaded")]
    UnknownComment(CommentId),

    #[error("cannot reply to comment {parent} at depth {depth}")]
    ReplyDepthExceeded { parent: CommentId, depth: usize },
}

impl Error {
    pub fn transport(err: anyhow::Error) -> Error {
        Error::Transport(Arc::new(err))
    }

    /// Whether calling the same operation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
