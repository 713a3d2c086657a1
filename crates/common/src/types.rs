/// Declares a UUID-backed identifier newtype.
///
/// Every marketplace party and every event stream gets its own type so that a
/// merchant id can never be passed where a driver id is expected. The invoking
/// crate must depend on `serde` and `uuid`.
#[macro_export]
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> ::uuid::Uuid {
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
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id! {
    /// Identifier of an event stream (order, product or wallet).
    AggregateId
}

uuid_id! {
    /// A customer account.
    UserId
}

uuid_id! {
    /// A merchant (restaurant / shop) account.
    MerchantId
}

uuid_id! {
    /// A driver account. Drivers are users with an approved driver profile.
    DriverId
}

uuid_id! {
    /// A catalog product. Each product is also the id of its inventory stream.
    ProductId
}

impl From<ProductId> for AggregateId {
    fn from(id: ProductId) -> Self {
        AggregateId(id.0)
    }
}

impl From<DriverId> for UserId {
    fn from(id: DriverId) -> Self {
        UserId(id.0)
    }
}
