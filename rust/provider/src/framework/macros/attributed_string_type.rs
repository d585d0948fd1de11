use snafu::{ResultExt, Snafu, ensure};
use strum::{EnumDiscriminants, IntoStaticStr};

#[derive(Debug, EnumDiscriminants, Snafu)]
#[snafu(visibility(pub))]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display(
        "{type_name} must be at least {min_length} characters long, but has {length}"
    ))]
    MinimumLengthNotMet {
        type_name: &'static str,
        length: usize,
        min_length: usize,
    },

    #[snafu(display("{type_name} must be at most {max_length} characters long, but has {length}"))]
    LengthExceeded {
        type_name: &'static str,
        length: usize,
        max_length: usize,
    },

    #[snafu(display("the regular expression of {type_name} is invalid"))]
    InvalidRegex {
        source: regex::Error,
        type_name: &'static str,
    },

    #[snafu(display("{value:?} is not a valid {type_name}; it must match {regex:?}"))]
    RegexNotMatched {
        type_name: &'static str,
        value: String,
        regex: &'static str,
    },
}

/// Constraints of a restricted string type
///
/// The length is counted in characters. The regular expression must match the whole value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Constraints {
    pub min_length: usize,
    pub max_length: usize,
    pub regex: Option<&'static str>,
}

impl Constraints {
    pub fn check(&self, type_name: &'static str, value: &str) -> Result<(), Error> {
        let length = value.chars().count();
        ensure!(
            length >= self.min_length,
            MinimumLengthNotMetSnafu {
                type_name,
                length,
                min_length: self.min_length,
            }
        );
        ensure!(
            length <= self.max_length,
            LengthExceededSnafu {
                type_name,
                length,
                max_length: self.max_length,
            }
        );

        if let Some(regex) = self.regex {
            let anchored =
                regex::Regex::new(&anchor(regex)).context(InvalidRegexSnafu { type_name })?;
            ensure!(
                anchored.is_match(value),
                RegexNotMatchedSnafu {
                    type_name,
                    value,
                    regex,
                }
            );
        }

        Ok(())
    }

    pub fn json_schema(&self) -> schemars::Schema {
        let mut schema = schemars::json_schema!({
            "type": "string",
            "minLength": self.min_length
        });
        if self.max_length != usize::MAX {
            schema.insert("maxLength".to_owned(), self.max_length.into());
        }
        if let Some(regex) = self.regex {
            schema.insert("pattern".to_owned(), anchor(regex).into());
        }
        schema
    }
}

fn anchor(regex: &str) -> String {
    format!("^(?:{regex})$")
}

/// Restricted string type with a length range and an optional regular expression
///
/// The value is checked on [`std::str::FromStr`] and on deserialization, so an instance is
/// always valid. Omitted bounds default to `0` and `usize::MAX`.
///
/// # Examples
///
/// ```rust
/// attributed_string_type! {
///     RoleName,
///     "The name of a security role",
///     "logs_reader",
///     min_length: 1,
///     max_length: 255,
///     regex: "[^/?#\\s]+"
/// }
/// ```
#[macro_export]
macro_rules! attributed_string_type {
    (
        $name:ident,
        $description:literal,
        $example:literal
        $(, min_length: $min_length:expr)?
        $(, max_length: $max_length:expr)?
        $(, regex: $regex:literal)?
        $(,)?
    ) => {
        #[doc = std::concat!($description, ", e.g. \"", $example, "\"")]
        #[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(String);

        impl $name {
            pub const CONSTRAINTS: $crate::framework::macros::attributed_string_type::Constraints =
                $crate::framework::macros::attributed_string_type::Constraints {
                    min_length: $crate::attributed_string_type!(@or 0 $(, $min_length)?),
                    max_length: $crate::attributed_string_type!(@or usize::MAX $(, $max_length)?),
                    regex: $crate::attributed_string_type!(@or None $(, Some($regex))?),
                };
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::framework::macros::attributed_string_type::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::CONSTRAINTS.check(std::stringify!($name), s)?;
                Ok(Self(s.to_owned()))
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::CONSTRAINTS
                    .check(std::stringify!($name), &value)
                    .map_err(<D::Error as serde::de::Error>::custom)?;
                Ok(Self(value))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl schemars::JsonSchema for $name {
            fn schema_name() -> std::borrow::Cow<'static, str> {
                std::stringify!($name).into()
            }

            fn json_schema(_generator: &mut schemars::generate::SchemaGenerator) -> schemars::Schema {
                let mut schema = Self::CONSTRAINTS.json_schema();
                schema.insert("description".to_owned(), $description.into());
                schema
            }
        }

        #[cfg(test)]
        impl $name {
            #[allow(dead_code)]
            pub fn from_str_unsafe(s: &str) -> Self {
                std::str::FromStr::from_str(s)
                    .expect(std::concat!("should be a valid ", std::stringify!($name)))
            }

            // A dead_code warning is emitted if there is no unit test that calls this function.
            pub fn test_example() {
                Self::from_str_unsafe($example);
            }
        }
    };

    (@or $default:expr) => {
        $default
    };
    (@or $default:expr, $value:expr) => {
        $value
    };
}
