//! Branded ID newtypes.
//!
//! Billing sessions and routes are both identified by strings, but they are
//! never interchangeable. Each gets its own newtype so a route id cannot be
//! handed to the engine where a billing session id is expected.
//!
//! Generated IDs are UUID v7 (time-ordered), which keeps billing sessions
//! sortable by start time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh time-ordered ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a metered billing session.
    BillingSessionId
}

branded_id! {
    /// Identifier of a route as assigned by the directions service.
    RouteId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_billing_ids_are_v7() {
        let id = BillingSessionId::generate();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(BillingSessionId::generate(), BillingSessionId::generate());
    }

    #[test]
    fn route_id_from_str() {
        let id = RouteId::from("route-7#0");
        assert_eq!(id.as_str(), "route-7#0");
        assert_eq!(id.to_string(), "route-7#0");
    }

    #[test]
    fn serializes_transparently() {
        let id = RouteId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: RouteId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }
}
