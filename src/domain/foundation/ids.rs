//! Strongly-typed identifier value objects.
//!
//! Two families live here:
//!
//! - **Record ids** (`MembershipId`, `FundingId`, ...) are UUIDs minted by this
//!   crate when it persists a record.
//! - **Reference ids** (`ContactId`, `MembershipTypeId`, ...) point at data owned
//!   by collaborators (catalog, contact directory). They are ordered integers so
//!   that tie-breaks such as "lowest membership type wins" are well defined.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

macro_rules! reference_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Unique identifier for a persisted membership record.
    MembershipId
);
record_id!(
    /// Unique identifier for a funding record (contribution).
    FundingId
);
record_id!(
    /// Unique identifier for a recurring funding agreement.
    RecurringFundingId
);
record_id!(
    /// Unique identifier for a line item.
    LineItemId
);
record_id!(
    /// Unique identifier for a soft credit entry.
    SoftCreditId
);

reference_id!(
    /// A person or organization in the contact directory.
    ContactId
);
reference_id!(
    /// A membership type definition in the catalog.
    MembershipTypeId
);
reference_id!(
    /// A priced catalog (price set).
    PriceSetId
);
reference_id!(
    /// A field within a price set.
    PriceFieldId
);
reference_id!(
    /// A selectable option within a price field.
    PriceOptionId
);
reference_id!(
    /// A configured membership status.
    MembershipStatusId
);
reference_id!(
    /// A payment instrument (cash, check, credit card, ...).
    PaymentInstrumentId
);
reference_id!(
    /// An accounting financial type.
    FinancialTypeId
);
reference_id!(
    /// A soft credit type tag (gift, in honor of, ...).
    SoftCreditTypeId
);
