use crate::{Error, Time, User};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct CommentId(pub u64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Server-assigned, except on a placeholder where it equals `client_id`
    pub id: CommentId,

    /// Identity assigned when the comment was optimistically inserted, kept
    /// as-is once the server confirmed it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<CommentId>,

    pub text: String,
    pub user: User,
    pub created_at: Time,
}

impl Comment {
    /// Builds the speculative entry displayed until the server answers
    pub fn placeholder(client_id: CommentId, text: String, user: User, created_at: Time) -> Comment {
        Comment {
            id: client_id,
            client_id: Some(client_id),
            text,
            user,
            created_at,
        }
    }

    /// Returns true iff this is the not-yet-confirmed entry for `client_id`
    pub fn is_placeholder_for(&self, client_id: CommentId) -> bool {
        self.id == client_id && self.client_id == Some(client_id)
    }

    /// Identity to use as a stable list key across confirmation
    pub fn key(&self) -> CommentId {
        self.client_id.unwrap_or(self.id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub text: String,
    pub user: User,
    pub created_at: Time,
}

impl NewComment {
    pub fn new(text: String, user: User, created_at: Time) -> NewComment {
        NewComment {
            text,
            user,
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_comment_text(&self.text)?;
        crate::validate_string(&self.user.name)?;
        crate::validate_string(&self.user.avatar)?;
        Ok(())
    }
}

/// Checks done before a submission is even attempted
pub fn validate_comment_text(text: &str) -> Result<(), Error> {
    if text.trim().is_empty() {
        return Err(Error::EmptyComment);
    }
    crate::validate_string(text)
}
