//! Newtype wrappers for string identifiers used on the wire.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a search index (or of an alias pointing at one).
    IndexName
);

string_newtype!(
    /// Full document key, `{namespace}:{id}`.
    DocKey
);

string_newtype!(
    /// Key prefix under which every document is auto-indexed.
    Namespace
);

impl Namespace {
    /// Build the key for document `id` under this namespace.
    pub fn key(&self, id: u64) -> DocKey {
        DocKey(format!("{}:{id}", self.0))
    }

    /// The prefix handed to the index definition (namespace plus separator).
    pub fn index_prefix(&self) -> String {
        format!("{}:", self.0)
    }

    /// Parse the numeric id back out of a key under this namespace.
    pub fn id_of(&self, key: &str) -> Option<u64> {
        key.strip_prefix(self.0.as_str())?
            .strip_prefix(':')?
            .parse()
            .ok()
    }
}

impl IndexName {
    /// The conventional alias name for this index.
    pub fn alias(&self) -> IndexName {
        IndexName(format!("{}_alias", self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_builds_keys() {
        let ns = Namespace::new("indexquake:books");
        assert_eq!(ns.key(42), "indexquake:books:42");
        assert_eq!(ns.key(0).as_str(), "indexquake:books:0");
    }

    #[test]
    fn namespace_index_prefix_has_separator() {
        let ns = Namespace::from("a:b");
        assert_eq!(ns.index_prefix(), "a:b:");
    }

    #[test]
    fn namespace_id_roundtrip() {
        let ns = Namespace::new("indexquake:books");
        let key = ns.key(1234);
        assert_eq!(ns.id_of(&key), Some(1234));
        assert_eq!(ns.id_of("other:books:1"), None);
        assert_eq!(ns.id_of("indexquake:books:abc"), None);
    }

    #[test]
    fn index_alias_name() {
        let idx = IndexName::new("idx:books");
        assert_eq!(idx.alias(), "idx:books_alias");
    }

    #[test]
    fn doc_key_serializes_as_plain_string() {
        let key = DocKey::new("ns:7");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"ns:7\"");
        let back: DocKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
