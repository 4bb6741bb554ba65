//! Model declaration macro.

/// Declare a model type with reactive fields.
///
/// Each field is written `name as TOKEN: Type = default`. The macro
/// generates:
///
/// - the struct, holding only its [`Observable`](crate::Observable),
/// - an associated [`Field`](crate::Field) constant per field (`TOKEN`),
/// - a getter per field (`name()`),
/// - `FIELDS`, the declared field names,
/// - `new`, `with_config`, `Default` and the [`Model`](crate::Model) impl.
///
/// Defaults are evaluated on every read of an unset field.
///
/// ```rust,ignore
/// reactive_model! {
///     /// Playback settings.
///     pub struct Settings {
///         volume as VOLUME: u8 = 50,
///         device as DEVICE: String = String::from("default"),
///     }
/// }
///
/// let settings = Settings::new();
/// assert_eq!(settings.volume(), 50);
/// settings.set(&Settings::VOLUME, 70);
/// ```
#[macro_export]
macro_rules! reactive_model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $model:ident {
            $(
                $(#[$field_meta:meta])*
                $name:ident as $token:ident : $ty:ty = $default:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $model {
            observable: $crate::Observable<$model>,
        }

        #[allow(dead_code)]
        impl $model {
            $(
                $(#[$field_meta])*
                pub const $token: $crate::Field<$model, $ty> = $crate::Field::new(
                    ::core::stringify!($name),
                    {
                        fn default_value() -> $ty {
                            $default
                        }
                        default_value
                    },
                );
            )*

            /// Names of the declared fields.
            pub const FIELDS: &'static [&'static str] = &[$(::core::stringify!($name)),*];

            pub fn new() -> Self {
                Self::with_config($crate::ObservableConfig::default())
            }

            pub fn with_config(config: $crate::ObservableConfig) -> Self {
                Self {
                    observable: $crate::Observable::with_config(config),
                }
            }

            $(
                pub fn $name(&self) -> $ty {
                    $crate::Model::get(self, &Self::$token)
                }
            )*
        }

        impl ::core::default::Default for $model {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::Model for $model {
            fn observable(&self) -> &$crate::Observable<Self> {
                &self.observable
            }

            fn field_names() -> &'static [&'static str] {
                Self::FIELDS
            }
        }
    };
}
