use crate::Comment;

/// What the client asks the transport for when fetching root comments
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    pub page_size: usize,

    /// Number of root comments already received for this post, for transports that
    /// paginate by offset rather than by page number
    pub offset: usize,
}

impl PageRequest {
    pub fn first(page_size: usize) -> PageRequest {
        PageRequest {
            page: 1,
            page_size,
            offset: 0,
        }
    }
}

/// A page of root comments, once normalized
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootPage {
    pub comments: Vec<Comment>,

    /// Explicit "there is more after this page" flag, when the server provides one
    #[serde(default)]
    pub has_more: Option<bool>,

    #[serde(default)]
    pub total_count: Option<u64>,
}

/// All the shapes the comment endpoints have been seen answering with
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum CommentsResponse {
    Bare(Vec<Comment>),
    Comments(CommentsField),
    Data(DataField),
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsField {
    comments: Vec<Comment>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataField {
    data: Vec<Comment>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    total_count: Option<u64>,
}

impl CommentsResponse {
    pub fn normalize(self) -> RootPage {
        match self {
            CommentsResponse::Bare(comments) => RootPage {
                comments,
                has_more: None,
                total_count: None,
            },
            CommentsResponse::Comments(CommentsField {
                comments,
                has_more,
                total_count,
            }) => RootPage {
                comments,
                has_more,
                total_count,
            },
            CommentsResponse::Data(DataField {
                data,
                has_more,
                total_count,
            }) => RootPage {
                comments: data,
                has_more,
                total_count,
            },
        }
    }
}

impl From<CommentsResponse> for RootPage {
    fn from(r: CommentsResponse) -> RootPage {
        r.normalize()
    }
}
