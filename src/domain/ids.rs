// File: src/domain/ids.rs

//! Identifier types for agents, conversations and messages.
//!
//! Identifiers are opaque strings: records created by this crate get a
//! freshly minted UUID, while identifiers supplied from outside (seeded
//! agents, ids chosen by an administrator) are accepted verbatim.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: mint time-ordered `UUIDv7` values instead of random `UUIDv4`.

use core::fmt;
use core::convert::Infallible;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mint a new identifier string.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()` for better
/// insert locality. Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn mint() -> String {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7().to_string()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4().to_string()
    }
}

/// Declare a string newtype identifier with a consistent API.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new unique identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(mint())
            }

            /// Borrow the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the underlying string.
            #[inline]
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$name> for String {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }
    };
}

define_string_id!(
    /// Identifier of a configured agent.
    AgentId
);

define_string_id!(
    /// Identifier of a conversation (an ordered sequence of messages).
    ConversationId
);

define_string_id!(
    /// Identifier of a single persisted message.
    MessageId
);
