// record
/// Declare a record type together with its relation model.
///
/// ```ignore
/// record! {
///     pub struct Person in "Person" {
///         id: u64,
///         name: String,
///     }
///     primary_key(id);
///     index by_name(name);
/// }
/// ```
///
/// `apart(tenant: u64);` may follow `primary_key` to declare key fields the
/// relation handle supplies instead of the row. Apart fields must lead the
/// `primary_key` list.
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $relation:literal {
            $( $field:ident : $ty:ty ),* $(,)?
        }
        primary_key( $( $pk:ident ),+ $(,)? );
        $( apart( $( $apart:ident : $apart_ty:ty ),+ $(,)? ); )?
        $( index $index:ident ( $( $ix:ident ),+ $(,)? ); )*
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        $vis struct $name {
            $( pub $field: $ty, )*
        }

        impl $crate::traits::Record for $name {
            fn model() -> $crate::model::RelationModel {
                $crate::model::RelationModel::new($relation)
                    $( $(
                        .apart(
                            stringify!($apart),
                            <$apart_ty as $crate::traits::FieldValue>::kind(),
                        )
                    )+ )?
                    $(
                        .field(
                            stringify!($field),
                            <$ty as $crate::traits::FieldValue>::kind(),
                        )
                    )*
                    .primary_key(&[$( stringify!($pk) ),+])
                    $(
                        .index(stringify!($index), &[$( stringify!($ix) ),+])
                    )*
            }

            fn get_value(&self, field: &str) -> Option<$crate::value::Value> {
                $(
                    if field == stringify!($field) {
                        return Some($crate::traits::FieldValue::to_value(&self.$field));
                    }
                )*

                None
            }

            fn set_value(
                &mut self,
                field: &str,
                value: $crate::value::Value,
            ) -> Result<bool, $crate::codec::CodecError> {
                $(
                    if field == stringify!($field) {
                        self.$field = $crate::traits::FieldValue::from_value(value)?;
                        return Ok(true);
                    }
                )*

                Ok(false)
            }
        }
    };
}

// record_enum
/// Declare a fieldless enum stored by explicit discriminant. The first
/// variant is the default.
#[macro_export]
macro_rules! record_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $first:ident = $first_value:literal
            $( , $variant:ident = $value:literal )* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        $vis enum $name {
            #[default]
            $first,
            $( $variant, )*
        }

        impl $crate::traits::FieldValue for $name {
            fn kind() -> $crate::db::field::FieldKind {
                $crate::db::field::FieldKind::Enum($crate::db::field::EnumConfig::new(&[
                    (stringify!($first), $first_value),
                    $( (stringify!($variant), $value), )*
                ]))
            }

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Enum(match self {
                    Self::$first => $first_value,
                    $( Self::$variant => $value, )*
                })
            }

            fn from_value(
                value: $crate::value::Value,
            ) -> Result<Self, $crate::codec::CodecError> {
                match value {
                    $crate::value::Value::Enum(stored) => {
                        if stored == $first_value {
                            return Ok(Self::$first);
                        }
                        $(
                            if stored == $value {
                                return Ok(Self::$variant);
                            }
                        )*

                        Err($crate::codec::CodecError::InvalidValue {
                            kind: "enum",
                            message: format!(
                                "{stored} is not a variant of {}",
                                stringify!($name)
                            ),
                        })
                    }
                    other => Err($crate::codec::CodecError::InvalidValue {
                        kind: "enum",
                        message: format!("unexpected {} value", other.label()),
                    }),
                }
            }
        }
    };
}
