#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Comment text is empty")]
    EmptyComment,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    /// Whether the remote call itself failed, as opposed to the caller
    /// submitting something that never should have been sent
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Unknown(_) | Error::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors() {
        assert!(Error::Network(String::from("timeout")).is_remote());
        assert!(Error::Unknown(String::new()).is_remote());
        assert!(!Error::EmptyComment.is_remote());
        assert!(!Error::NullByteInString(String::from("\0")).is_remote());
    }
}
