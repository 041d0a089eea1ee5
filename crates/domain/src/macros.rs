//! Macro for implementing Display and FromStr for status enums
//!
//! Status enums are persisted as lowercase strings in SQLite and parsed back
//! when rows are loaded. This macro provides both directions from a single
//! variant-to-string table, with case-insensitive parsing.

/// Implements Display and FromStr traits for status enums
///
/// Generates:
/// - Display: converts enum variants to lowercase strings
/// - FromStr: parses case-insensitive strings to enum variants
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
