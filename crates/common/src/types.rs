use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each entity gets its own type so a material id can never be passed where
/// an order id is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a stock material.
    MaterialId
);
uuid_id!(
    /// Identifier of a product.
    ProductId
);
uuid_id!(
    /// Identifier of a customer order.
    OrderId
);
uuid_id!(
    /// Identifier of a registered customer.
    CustomerId
);
uuid_id!(
    /// Identifier of one product line inside an order.
    OrderLineId
);
uuid_id!(
    /// Identifier of a per-line material usage record.
    MaterialUsageId
);
uuid_id!(
    /// Identifier of an ad-hoc cost adjustment on an order.
    AdditionalCostId
);
uuid_id!(
    /// Identifier of a bill-of-materials entry.
    BomEntryId
);
uuid_id!(
    /// Identifier of a product price tier.
    PriceTierId
);
uuid_id!(
    /// Identifier of a bookkeeping expense.
    ExpenseId
);

/// Version number of an order or catalog entry, used for optimistic
/// concurrency control.
///
/// A freshly created record is at version 0; every successful write
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of a new record.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
        assert_ne!(MaterialId::new(), MaterialId::new());
    }

    #[test]
    fn id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = ProductId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn id_parses_from_string() {
        let id = MaterialId::new();
        let parsed: MaterialId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MaterialId>().is_err());
    }

    #[test]
    fn id_serializes_as_plain_uuid() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn version_increments() {
        let v = Version::initial();
        assert_eq!(v.as_i64(), 0);
        assert_eq!(v.next().as_i64(), 1);
        assert_eq!(v.next().next(), Version::new(2));
    }
}
