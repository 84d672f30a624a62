use std::fmt;

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KeySegment {
    Str(String),
    Int(u64),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Str(s) => write!(f, "{s:?}"),
            KeySegment::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> KeySegment {
        KeySegment::Str(String::from(s))
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> KeySegment {
        KeySegment::Str(s)
    }
}

impl From<u64> for KeySegment {
    fn from(i: u64) -> KeySegment {
        KeySegment::Int(i)
    }
}

/// Hierarchical cache address, most generic segment first
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(root: impl Into<KeySegment>) -> QueryKey {
        QueryKey(vec![root.into()])
    }

    pub fn with(&self, segment: impl Into<KeySegment>) -> QueryKey {
        let mut res = self.clone();
        res.0.push(segment.into());
        res
    }

    /// Prefix matching: invalidating `["posts"]` reaches `["posts", "list", ...]`
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.segments().iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{s}")?;
        }
        write!(f, "]")
    }
}

pub mod comments {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::new("comments")
    }

    pub fn infinite() -> QueryKey {
        all().with("infinite")
    }

    pub fn by_post(post: u64) -> QueryKey {
        all().with("post").with(post)
    }
}

pub mod posts {
    use super::QueryKey;

    #[derive(Clone, Debug, Default, Eq, PartialEq)]
    pub struct ListFilters {
        pub category: Option<String>,
        pub page: Option<u64>,
        pub limit: Option<u64>,
    }

    pub fn all() -> QueryKey {
        QueryKey::new("posts")
    }

    pub fn lists() -> QueryKey {
        all().with("list")
    }

    /// Unset filters are skipped so that equal filters give equal keys
    pub fn list(filters: &ListFilters) -> QueryKey {
        let mut key = lists();
        if let Some(category) = &filters.category {
            key = key.with("category").with(category.clone());
        }
        if let Some(page) = filters.page {
            key = key.with("page").with(page);
        }
        if let Some(limit) = filters.limit {
            key = key.with("limit").with(limit);
        }
        key
    }

    pub fn details() -> QueryKey {
        all().with("detail")
    }

    pub fn detail(id: u64) -> QueryKey {
        details().with(id)
    }

    pub fn search(term: &str) -> QueryKey {
        all().with("search").with(term)
    }
}

pub mod tags {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::new("tags")
    }

    pub fn list() -> QueryKey {
        all().with("list")
    }
}

pub mod users {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::new("users")
    }

    pub fn detail(id: u64) -> QueryKey {
        all().with(id)
    }

    pub fn profile() -> QueryKey {
        all().with("profile")
    }

    pub fn preferences(user: u64) -> QueryKey {
        all().with(user).with("preferences")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy() {
        let list = posts::list(&posts::ListFilters {
            category: Some(String::from("tech")),
            ..Default::default()
        });
        assert!(list.starts_with(&posts::lists()));
        assert!(list.starts_with(&posts::all()));
        assert!(!list.starts_with(&posts::details()));
        assert!(posts::detail(12).starts_with(&posts::details()));
        assert!(!posts::all().starts_with(&posts::lists()));

        assert!(comments::infinite().starts_with(&comments::all()));
        assert!(!comments::by_post(3).starts_with(&posts::all()));
        assert!(users::preferences(3).starts_with(&users::detail(3)));
    }

    #[test]
    fn segments() {
        assert_eq!(
            comments::by_post(3).segments(),
            &[
                KeySegment::from("comments"),
                KeySegment::from("post"),
                KeySegment::Int(3),
            ]
        );
        assert_eq!(QueryKey::new("tags").with("list"), tags::list());
    }

    #[test]
    fn display() {
        assert_eq!(comments::by_post(3).to_string(), r#"["comments", "post", 3]"#);
        assert_eq!(tags::list().to_string(), r#"["tags", "list"]"#);
    }

    #[test]
    fn equal_filters_equal_keys() {
        let a = posts::list(&posts::ListFilters {
            page: Some(2),
            limit: Some(10),
            ..Default::default()
        });
        let b = posts::list(&posts::ListFilters {
            page: Some(2),
            limit: Some(10),
            category: None,
        });
        assert_eq!(a, b);
        assert_ne!(a, posts::list(&posts::ListFilters::default()));
        assert!(users::profile().starts_with(&users::all()));
    }
}
