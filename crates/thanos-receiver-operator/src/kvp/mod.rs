//! Labels stamped on the objects the operator owns.
//!
//! Keys and values are checked against the Kubernetes rules when they are parsed, so a
//! [`Labels`] set can always be written to an object.
use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
};

use snafu::{ResultExt, Snafu, ensure};

pub mod consts;
mod key;

pub use key::{Key, KeyError};
use key::SEGMENT_REGEX;

const LABEL_VALUE_MAX_LEN: usize = 63;

#[derive(Debug, PartialEq, Snafu)]
pub enum LabelError {
    #[snafu(display("invalid label key {key:?}"))]
    InvalidKey { source: KeyError, key: String },

    #[snafu(display("invalid value {value:?} of label {key:?}"))]
    InvalidValue {
        source: LabelValueError,
        key: String,
        value: String,
    },
}

#[derive(Debug, PartialEq, Snafu)]
pub enum LabelValueError {
    #[snafu(display("label value is {length} characters long, at most {LABEL_VALUE_MAX_LEN} are allowed"))]
    ValueTooLong { length: usize },

    #[snafu(display("label value contains non-ASCII characters"))]
    ValueNotAscii,

    #[snafu(display("label value contains invalid characters"))]
    ValueInvalid,
}

/// A label value, possibly empty.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelValue(String);

impl FromStr for LabelValue {
    type Err = LabelValueError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        ensure!(
            input.len() <= LABEL_VALUE_MAX_LEN,
            ValueTooLongSnafu {
                length: input.len()
            }
        );
        ensure!(input.is_ascii(), ValueNotAsciiSnafu);
        ensure!(
            input.is_empty() || SEGMENT_REGEX.is_match(input),
            ValueInvalidSnafu
        );

        Ok(Self(input.to_string()))
    }
}

impl Deref for LabelValue {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Debug for LabelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Display for LabelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single validated label.
///
/// ```
/// # use thanos_receiver_operator::kvp::Label;
/// let label = Label::try_from(("app.kubernetes.io/name", "receiver")).unwrap();
/// assert_eq!(label.to_string(), "app.kubernetes.io/name=receiver");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label {
    pub key: Key,
    pub value: LabelValue,
}

impl TryFrom<(&str, &str)> for Label {
    type Error = LabelError;

    fn try_from((key, value): (&str, &str)) -> Result<Self, Self::Error> {
        let parsed_key = Key::from_str(key).context(InvalidKeySnafu { key })?;
        let value = LabelValue::from_str(value).context(InvalidValueSnafu { key, value })?;
        Ok(Self {
            key: parsed_key,
            value,
        })
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// A validated set of Kubernetes labels.
///
/// Keys are unique; inserting a label with an existing key replaces the previous value, so
/// composing label sets with [`Labels::merge`] lets later sources win. Iteration order is by key
/// and carries no meaning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(BTreeMap<Key, LabelValue>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a single label, replacing the value of an existing label with the same key.
    pub fn insert(&mut self, label: Label) -> &mut Self {
        self.0.insert(label.key, label.value);
        self
    }

    /// Parses and inserts a single label.
    pub fn try_insert(&mut self, label: (&str, &str)) -> Result<&mut Self, LabelError> {
        Ok(self.insert(Label::try_from(label)?))
    }

    /// Returns `self` with all labels of `others` applied in order. On key collisions the label
    /// of the later set wins.
    pub fn merge<'a>(mut self, others: impl IntoIterator<Item = &'a Labels>) -> Self {
        for other in others {
            self.0
                .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = Key::from_str(key).ok()?;
        self.0.get(&key).map(|value| value.deref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses every pair of `iter` into a label.
    pub fn try_from_iter<'a>(
        iter: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, LabelError> {
        let mut labels = Self::new();
        for pair in iter {
            labels.try_insert(pair)?;
        }
        Ok(labels)
    }
}

impl FromIterator<Label> for Labels {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self(iter.into_iter().map(|l| (l.key, l.value)).collect())
    }
}

impl From<Labels> for BTreeMap<String, String> {
    fn from(labels: Labels) -> Self {
        labels
            .0
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn try_from_tuple() {
        let label = Label::try_from(("receiver.thanos.io/group", "default")).unwrap();
        assert_eq!(label.to_string(), "receiver.thanos.io/group=default");
    }

    #[rstest]
    #[case("a".repeat(64), LabelValueError::ValueTooLong { length: 64 })]
    #[case("foo-", LabelValueError::ValueInvalid)]
    #[case("ä", LabelValueError::ValueNotAscii)]
    fn invalid_value(#[case] input: String, #[case] error: LabelValueError) {
        let err = LabelValue::from_str(&input).unwrap_err();
        assert_eq!(err, error);
    }

    #[test]
    fn empty_value_is_allowed() {
        assert!(Label::try_from(("app.kubernetes.io/name", "")).is_ok());
    }

    #[test]
    fn merge_later_wins() {
        let base = Labels::try_from_iter([("a.io/x", "1"), ("a.io/y", "1")]).unwrap();
        let middle = Labels::try_from_iter([("a.io/y", "2")]).unwrap();
        let last = Labels::try_from_iter([("a.io/y", "3"), ("a.io/z", "3")]).unwrap();

        let merged = base.merge([&middle, &last]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("a.io/x"), Some("1"));
        assert_eq!(merged.get("a.io/y"), Some("3"));
        assert_eq!(merged.get("a.io/z"), Some("3"));
    }

    #[test]
    fn into_unvalidated_map() {
        let labels = Labels::try_from_iter([("a.io/x", "1")]).unwrap();
        let map: BTreeMap<String, String> = labels.into();
        assert_eq!(map, BTreeMap::from([("a.io/x".to_string(), "1".to_string())]));
    }
}
