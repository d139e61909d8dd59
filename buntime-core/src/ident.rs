use std::fmt;

/// Identity of a resolved app: the name used as the URL's first path segment
/// plus the exact on-disk semantic version it resolved to.
///
/// This is the key the worker pool's lane map is indexed by (§3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppIdent {
    pub name: String,
    pub version: String,
}

impl AppIdent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for AppIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let id = AppIdent::new("hello", "1.0.0");
        assert_eq!(id.to_string(), "hello@1.0.0");
    }

    #[test]
    fn equality_is_by_name_and_version() {
        assert_eq!(AppIdent::new("a", "1.0.0"), AppIdent::new("a", "1.0.0"));
        assert_ne!(AppIdent::new("a", "1.0.0"), AppIdent::new("a", "1.0.1"));
    }
}
