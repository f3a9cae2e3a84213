use crate::{CommentId, Error, PostId, Time, UserId};

/// Display information about a comment's author, as embedded by the server
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

impl Author {
    pub fn stub() -> Author {
        Author {
            id: UserId::stub(),
            username: String::from("stub"),
            display_name: String::from("Stub User"),
            avatar_url: None,
            is_verified: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    // Defaulted so that a comment without an id deserializes and can be rejected by
    // `validate` instead of failing the whole page
    #[serde(default)]
    pub id: CommentId,

    #[serde(default)]
    pub post_id: PostId,

    #[serde(default)]
    pub author: Option<Author>,

    pub content: String,

    /// None for a comment made directly on the post
    #[serde(default, deserialize_with = "empty_as_none")]
    pub parent_comment_id: Option<CommentId>,

    pub created_at: Time,

    #[serde(default)]
    pub updated_at: Option<Time>,

    #[serde(default)]
    pub likes_count: u64,

    #[serde(default)]
    pub replies_count: u64,

    /// Whether the current user liked this comment
    #[serde(default)]
    pub is_liked: bool,

    /// Immediate children the server chose to inline, never assumed complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<Comment>>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<CommentId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let id: Option<CommentId> = serde::Deserialize::deserialize(deserializer)?;
    Ok(id.filter(|id| !id.is_empty()))
}

impl Comment {
    pub fn new(
        id: CommentId,
        post_id: PostId,
        parent_comment_id: Option<CommentId>,
        content: String,
        created_at: Time,
    ) -> Comment {
        Comment {
            id,
            post_id,
            author: None,
            content,
            parent_comment_id,
            created_at,
            updated_at: None,
            likes_count: 0,
            replies_count: 0,
            is_liked: false,
            replies: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }

    // See comments on other `validate` functions throughout threadline-api
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::MissingId);
        }
        if self.parent_comment_id.as_ref() == Some(&self.id) {
            return Err(Error::SelfParent(self.id.clone()));
        }
        crate::validate_string(self.id.as_str())?;
        if let Some(parent) = &self.parent_comment_id {
            crate::validate_string(parent.as_str())?;
        }
        crate::validate_string(&self.content)
    }
}

/// Body of a comment submission
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<CommentId>,
}

impl NewComment {
    pub fn new(content: String, parent_comment_id: Option<CommentId>) -> NewComment {
        NewComment {
            content,
            parent_comment_id,
        }
    }

    // See comments on other `validate` functions throughout threadline-api
    pub fn validate(&self) -> Result<(), Error> {
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        crate::validate_string(&self.content)?;
        if let Some(parent) = &self.parent_comment_id {
            crate::validate_string(parent.as_str())?;
        }
        Ok(())
    }
}
