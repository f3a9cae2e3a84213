use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod comment;
pub use comment::{Author, Comment, NewComment};

mod error;
pub use error::Error;

mod feed;
pub use feed::FeedMessage;

mod page;
pub use page::{CommentsResponse, PageRequest, RootPage};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Default,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            serde::Deserialize,
            serde::Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> $name {
                $name(id.into())
            }

            pub fn stub() -> $name {
                $name(STUB_UUID.to_string())
            }

            /// Generates a fresh random identifier
            pub fn random() -> $name {
                $name(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(PostId);
string_id!(CommentId);
string_id!(UserId);

// All the `validate` functions below are here to reject data that we would not want to
// store client-side, because it would either break invariants of the comment store or
// be unrepresentable for the API we talk to.

pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}
