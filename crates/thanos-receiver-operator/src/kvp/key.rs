use std::{fmt::Display, ops::Deref, str::FromStr, sync::LazyLock};

use regex::Regex;
use snafu::{Snafu, ensure};

const PREFIX_MAX_LEN: usize = 253;
const NAME_MAX_LEN: usize = 63;

/// A DNS subdomain, e.g. `receiver.thanos.io`.
static PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z](\.?[a-zA-Z0-9-])*\.[a-zA-Z]{2,}\.?$")
        .expect("failed to compile key prefix regex")
});

/// Alphanumeric at both ends, with `-`, `_` and `.` in between. Shared by key names and values.
pub(super) static SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9A-Z]([a-z0-9A-Z-_.]*[a-z0-9A-Z]+)?$")
        .expect("failed to compile label segment regex")
});

#[derive(Debug, PartialEq, Snafu)]
pub enum KeyError {
    #[snafu(display("label key is empty"))]
    EmptyInput,

    #[snafu(display("label key contains more than one slash"))]
    NestedPrefix,

    #[snafu(display("label key has a slash but no prefix before it"))]
    PrefixEmpty,

    #[snafu(display("label key prefix is {length} characters long, at most {PREFIX_MAX_LEN} are allowed"))]
    PrefixTooLong { length: usize },

    #[snafu(display("label key prefix is not a DNS subdomain"))]
    PrefixInvalid,

    #[snafu(display("label key name is {length} characters long, at most {NAME_MAX_LEN} are allowed"))]
    NameTooLong { length: usize },

    #[snafu(display("label key name contains invalid characters"))]
    NameInvalid,
}

/// A validated label key of the form `[<prefix>/]<name>`, such as `receiver.thanos.io/group`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    fn validate_prefix(prefix: &str) -> Result<(), KeyError> {
        ensure!(!prefix.is_empty(), PrefixEmptySnafu);
        ensure!(
            prefix.len() <= PREFIX_MAX_LEN,
            PrefixTooLongSnafu {
                length: prefix.len()
            }
        );
        ensure!(PREFIX_REGEX.is_match(prefix), PrefixInvalidSnafu);
        Ok(())
    }

    fn validate_name(name: &str) -> Result<(), KeyError> {
        ensure!(
            name.len() <= NAME_MAX_LEN,
            NameTooLongSnafu { length: name.len() }
        );
        ensure!(SEGMENT_REGEX.is_match(name), NameInvalidSnafu);
        Ok(())
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        ensure!(!input.is_empty(), EmptyInputSnafu);
        ensure!(input.matches('/').count() <= 1, NestedPrefixSnafu);

        let name = match input.split_once('/') {
            Some((prefix, name)) => {
                Self::validate_prefix(prefix)?;
                name
            }
            None => input,
        };
        Self::validate_name(name)?;

        Ok(Self(input.to_owned()))
    }
}

impl Deref for Key {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("app.kubernetes.io/name")]
    #[case("receiver.thanos.io/group")]
    #[case("receiverGroup")]
    fn valid_key(#[case] input: &str) {
        let key = Key::from_str(input).unwrap();
        assert_eq!(key.to_string(), input);
    }

    #[rstest]
    #[case("", KeyError::EmptyInput)]
    #[case("a/b/c", KeyError::NestedPrefix)]
    #[case("/name", KeyError::PrefixEmpty)]
    #[case("no_dots/name", KeyError::PrefixInvalid)]
    #[case("app.kubernetes.io/-name", KeyError::NameInvalid)]
    #[case("a".repeat(64), KeyError::NameTooLong { length: 64 })]
    fn invalid_key(#[case] input: String, #[case] error: KeyError) {
        let err = Key::from_str(&input).unwrap_err();
        assert_eq!(err, error);
    }
}
