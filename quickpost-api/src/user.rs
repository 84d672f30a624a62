#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub name: String,

    /// Short label displayed in place of a picture
    pub avatar: String,
}

impl User {
    pub fn new(name: impl Into<String>, avatar: impl Into<String>) -> User {
        User {
            name: name.into(),
            avatar: avatar.into(),
        }
    }

    /// Identity shown on a comment that the server did not confirm yet
    // TODO: take this from the logged-in session once there is one
    pub fn provisional() -> User {
        User::new("Current User", "CU")
    }

    /// Identity attached to the payload sent to the remote store
    pub fn default_author() -> User {
        User::new("User", "U")
    }
}
