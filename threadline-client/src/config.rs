/// Page sizes used when fetching root comments
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationConfig {
    /// Size of the first page, fetched when a post is opened
    pub initial_page_size: usize,

    /// Size of every page fetched by "load more"
    pub subsequent_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> PaginationConfig {
        PaginationConfig {
            initial_page_size: 15,
            subsequent_page_size: 10,
        }
    }
}

/// Depth rules of the thread view. The two limits are independent: threads
/// beyond `max_display_depth` start collapsed but may still accept replies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadPolicy {
    /// Threads at this depth or deeper are flagged `is_beyond_depth_limit`
    pub max_display_depth: usize,

    /// Comments at this depth or deeper cannot be replied to
    pub max_reply_depth: usize,
}

impl Default for ThreadPolicy {
    fn default() -> ThreadPolicy {
        ThreadPolicy {
            max_display_depth: 3,
            max_reply_depth: 3,
        }
    }
}
