use crate::{
    api::{PageRequest, RootPage},
    PaginationConfig,
};

/// Where we are in the list of root comments of the current post
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RootCursor {
    /// Page to request on the next "load more"
    pub next_page: u32,

    /// Root comments received so far, duplicates included
    pub fetched: usize,

    pub has_more: bool,

    /// Total number of root comments, when the server tells us
    pub total_count: Option<u64>,
}

impl Default for RootCursor {
    fn default() -> RootCursor {
        RootCursor {
            next_page: 1,
            fetched: 0,
            has_more: true,
            total_count: None,
        }
    }
}

impl RootCursor {
    pub fn initial_request(config: &PaginationConfig) -> PageRequest {
        PageRequest::first(config.initial_page_size)
    }

    pub fn next_request(&self, config: &PaginationConfig) -> PageRequest {
        PageRequest {
            page: self.next_page,
            page_size: config.subsequent_page_size,
            offset: self.fetched,
        }
    }

    /// Cursor after `page` was received in answer to `req`
    pub fn advance(&self, req: &PageRequest, page: &RootPage) -> RootCursor {
        RootCursor {
            next_page: req.page + 1,
            fetched: req.offset + page.comments.len(),
            has_more: derive_has_more(page, req.page_size),
            total_count: page.total_count.or(self.total_count),
        }
    }
}

/// Whether there may be more root comments after `page`.
///
/// An explicit flag from the server always wins. Otherwise a page holding exactly the
/// requested number of comments is taken to mean there may be more, so an exactly full
/// last page is followed by one empty fetch. The total count is not used: pages of
/// different sizes overlap when requested by number, so counting received comments
/// overshoots it before the last page.
pub fn derive_has_more(page: &RootPage, requested: usize) -> bool {
    if let Some(has_more) = page.has_more {
        return has_more;
    }
    tracing::debug!(
        received = page.comments.len(),
        requested,
        "no hasMore flag from server, guessing from page size"
    );
    requested > 0 && page.comments.len() == requested
}
