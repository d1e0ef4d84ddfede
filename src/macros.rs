/// Declares a backend row type and the lossless conversions between it and a
/// local record type with the same fields.
///
/// Local records serialize with camelCase names (the Local Store's JSON),
/// rows serialize with the backend's snake_case column names. Because Rust
/// field names are already snake_case, both sides share field identifiers
/// and the mapping is simply a field-by-field move in each direction.
///
/// # Parameters
/// - `$row:ident`: name of the row struct to declare.
/// - `$local:ty`: the local record it mirrors. Must have exactly the listed fields.
/// - `$field: $ty`: every field, with optional attributes (e.g. `#[serde(default)]`).
///
/// # Example
/// ```ignore
/// remote_row! {
///     /// `bt_users`
///     UserRow <=> User {
///         id: String,
///         name: String,
///         team_id: String,
///     }
/// }
/// ```
/// This declares `pub struct UserRow { pub id, pub name, pub team_id }` with
/// `From<User> for UserRow` and `From<UserRow> for User`.
#[macro_export]
macro_rules! remote_row {
    (
        $(#[$meta:meta])*
        $row:ident <=> $local:ty {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $row {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl From<$local> for $row {
            fn from(local: $local) -> Self {
                Self { $( $field: local.$field, )* }
            }
        }

        impl From<$row> for $local {
            fn from(row: $row) -> Self {
                Self { $( $field: row.$field, )* }
            }
        }
    };
}
