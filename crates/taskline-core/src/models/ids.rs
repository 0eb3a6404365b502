//! Opaque string identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the string representation of this ID
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Stable task identity. Generated client-side as a UUID v7 string;
    /// the server may replace it through an id remap.
    TaskId
);

opaque_id!(
    /// Identity of a single queued command, echoed back as `client_id`
    CommandId
);

opaque_id!(
    /// Owner of a command log
    UserId
);

opaque_id!(
    /// Server-side folder identity
    FolderId
);

impl TaskId {
    /// Create a new time-sortable task ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Leading characters used for placeholders and short display
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(index, _)| index);
        &self.0[..end]
    }
}

impl CommandId {
    /// Create a new time-sortable command ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_unique() {
        assert_ne!(TaskId::generate(), TaskId::generate());
        assert_ne!(CommandId::generate(), CommandId::generate());
    }

    #[test]
    fn test_short_handles_short_ids() {
        assert_eq!(TaskId::from("abc").short(), "abc");
        assert_eq!(TaskId::from("0123456789").short(), "01234567");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&TaskId::from("t-1")).unwrap();
        assert_eq!(json, "\"t-1\"");
    }
}
