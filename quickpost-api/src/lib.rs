use chrono::Utc;

pub type Time = chrono::DateTime<Utc>;

mod comment;
pub use comment::{validate_comment_text, Comment, CommentId, NewComment};

mod error;
pub use error::Error;

mod page;
pub use page::{CommentListing, CommentPage, CommentPages, InfiniteData, PageParam, FIRST_PAGE};

mod store;
pub use store::RemoteCommentStore;

mod user;
pub use user::User;

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
