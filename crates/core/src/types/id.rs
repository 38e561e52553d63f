//! Newtype IDs for type-safe entity references.
//!
//! Every identifier in the cart API is an opaque server string. Use the
//! `define_id!` macro to create wrappers that prevent accidentally passing a
//! product ID where a cart line ID is expected.

/// Prefix reserved for cart line IDs generated on the client.
///
/// Server-assigned IDs never start with this prefix, so a line carrying it
/// only exists in the guest cart.
pub const LOCAL_ITEM_PREFIX: &str = "local-";

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use cartsync_core::define_id;
/// define_id!(OrderId);
/// define_id!(WalletId);
///
/// let order_id = OrderId::new("ord_1");
/// let wallet_id = WalletId::new("ord_1");
///
/// // These are different types, so this won't compile:
/// // let _: OrderId = wallet_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(LineItemId);
define_id!(ProductId);
define_id!(VendorId);
define_id!(UserId);

impl LineItemId {
    /// Generate a fresh client-side ID for a guest cart line.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_ITEM_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    /// Returns `true` if this ID was generated on the client.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ITEM_PREFIX)
    }
}
