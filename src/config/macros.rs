/// Define a configuration section with its defaults in one declaration.
///
/// Each field is written as `name: Type = default`. The macro expands to a
/// struct with public fields, a `Default` impl built from the listed values,
/// and serde support with `#[serde(default)]` so partial TOML files load.
///
/// ```
/// vesting_preview::config_struct! {
///     pub struct ExampleConfig {
///         ttl_secs: u64 = 60,
///         enabled: bool = true,
///     }
/// }
///
/// let cfg = ExampleConfig::default();
/// assert_eq!(cfg.ttl_secs, 60);
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
