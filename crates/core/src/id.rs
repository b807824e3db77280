//! Unique identifiers for Orbit entities.
//!
//! Each identifier is a distinct UUID newtype so a [`JobId`] can never be
//! passed where a [`ConnectionId`] is expected. All ids are `Copy` and
//! support:
//! - `v4()` for random generation
//! - `nil()` for the zero value
//! - `FromStr` / `Display` (hyphenated UUID form)
//! - serde (serialized as the UUID string)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a random identifier.
            pub fn v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// The all-zero identifier.
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Whether this is the all-zero identifier.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Borrow the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id!(
    /// Identifies one client session or one stateless request.
    ConnectionId
);

define_id!(
    /// Identifies one enqueued task job.
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn v4_is_not_nil() {
        assert!(!ConnectionId::v4().is_nil());
        assert!(!JobId::v4().is_nil());
    }

    #[test]
    fn default_is_nil() {
        assert!(ConnectionId::default().is_nil());
    }

    #[test]
    fn parse_and_display_agree() {
        let id = JobId::v4();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ConnectionId::v4();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
