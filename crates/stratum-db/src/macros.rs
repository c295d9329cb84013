//! Macros for defining entity schemas.
//!
//! The [`define_entity!`] macro generates a unit struct implementing
//! [`crate::entity::Entity`] for a table.

/// Defines an entity type for a database table.
///
/// The optional settings must appear in the order shown. Field flags are
/// `nullable` and `transformed`.
///
/// # Syntax
///
/// ```rust
/// use stratum_db::{define_entity, entity::Entity};
///
/// define_entity!(
///     /// Registered users.
///     pub User {
///         table: "users",
///         primary_key: "id",
///         soft_delete: "deleted_at",
///         timestamps: true,
///         transform_key: "k1",
///         fields: {
///             id: Integer,
///             name: Text,
///             ssn: Text [nullable, transformed],
///             created_at: Timestamp [nullable],
///             updated_at: Timestamp [nullable],
///             deleted_at: Timestamp [nullable],
///         }
///     }
/// );
///
/// assert_eq!(User::TABLE, "users");
/// assert_eq!(User::transform_columns(), vec!["ssn"]);
/// ```
#[macro_export]
macro_rules! define_entity {
    (
        $(#[$meta:meta])*
        $vis:vis $entity:ident {
            table: $table:literal,
            $(primary_key: $pk:literal,)?
            $(soft_delete: $soft_delete:literal,)?
            $(timestamps: $timestamps:literal,)?
            $(transform_key: $key:literal,)?
            fields: {
                $($field:ident: $kind:ident $([$($flag:ident),* $(,)?])?),* $(,)?
            } $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $entity;

        impl $crate::entity::Entity for $entity {
            const TABLE: &'static str = $table;
            $(const PRIMARY_KEY: &'static str = $pk;)?
            $(const SOFT_DELETE: Option<&'static str> = Some($soft_delete);)?
            $(const TIMESTAMPS: bool = $timestamps;)?
            $(const TRANSFORM_KEY: Option<&'static str> = Some($key);)?
            const FIELDS: &'static [$crate::entity::Field] = &[
                $(
                    $crate::entity::Field::new(
                        stringify!($field),
                        $crate::entity::FieldKind::$kind,
                    )
                    $($(.$flag())*)?
                ),*
            ];
        }
    };
}
