mod config;
pub use config::{PaginationConfig, ThreadPolicy};

mod error;
pub use error::Error;

mod pagination;
pub use pagination::{derive_has_more, RootCursor};

mod session;
pub use session::{Delivery, Phase, ThreadSession};

mod source;
pub use source::CommentSource;

mod store;
pub use store::{CommentStore, Merge, UpsertReport};

pub mod thread;
pub use thread::{CommentThread, Forest};

mod view;
pub use view::{reply_prefix, ViewState};

mod fuzz;

pub mod api {
    pub use threadline_api::*;
}
