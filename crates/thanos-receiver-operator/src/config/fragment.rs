//! Fragments are partially validated parts of a receiver group configuration. For example,
//! mandatory values may be missing. Fragments may be [`validate`]d and turned into their
//! ["full"](`FromFragment`) type once all configuration layers have been [merged](`Merge`).
use std::fmt::Display;

use snafu::Snafu;

use super::merge::Atomic;

#[cfg(doc)]
use super::merge::Merge;

/// Position of a field inside the fragment being validated.
///
/// Every [`Validator::field`] call adds one segment, so errors can name the offending field by
/// its full path. Created by [`validate`].
pub struct Validator<'a> {
    segment: Option<&'a dyn Display>,
    outer: Option<&'a Validator<'a>>,
}

impl Validator<'_> {
    /// The position of the fragment itself.
    pub fn root() -> Validator<'static> {
        Validator {
            segment: None,
            outer: None,
        }
    }

    /// The position of the field `segment` below the current position.
    pub fn field<'b>(&'b self, segment: &'b dyn Display) -> Validator<'b> {
        Validator {
            segment: Some(segment),
            outer: Some(self),
        }
    }

    /// The field is mandatory but no configuration layer sets it.
    pub fn error_required(self) -> ValidationError {
        self.fail(ValidationProblem::FieldRequired)
    }

    /// The field is set, but to a value that is not accepted.
    pub fn error_invalid(self, reason: impl Into<String>) -> ValidationError {
        self.fail(ValidationProblem::FieldInvalid {
            reason: reason.into(),
        })
    }

    fn fail(self, problem: ValidationProblem) -> ValidationError {
        let mut segments: Vec<String> = std::iter::successors(Some(&self), |v| v.outer)
            .filter_map(|v| v.segment.map(ToString::to_string))
            .collect();
        segments.reverse();

        ValidationError {
            path: segments.join("."),
            problem,
        }
    }
}

/// A fragment field that failed validation.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(display("invalid configuration at {path:?}"))]
pub struct ValidationError {
    path: String,
    #[snafu(source)]
    problem: ValidationProblem,
}

impl ValidationError {
    /// The dotted path of the offending field, e.g. `grpcIngress.host`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, PartialEq, Snafu)]
enum ValidationProblem {
    #[snafu(display("a value is required"))]
    FieldRequired,

    #[snafu(display("{reason}"))]
    FieldInvalid { reason: String },
}

/// A type that can be constructed by validating a "fragment" type.
///
/// Fragments are deserialized from multiple sources (the receiver group, the `defaults` of the
/// `ThanosReceiver` and the operator defaults), [`Merge`]d, and then validated into the type
/// implementing `FromFragment`.
pub trait FromFragment: Sized {
    /// The fragment type of `Self`.
    ///
    /// For [`Atomic`] types this should be [`Option`](`Option<Self>`).
    type Fragment;

    /// Try to validate a [`Self::Fragment`] into `Self`.
    ///
    /// `validator` contains additional error reporting context, such as the path to the field
    /// from the root fragment. It is created by [`validate`].
    fn from_fragment(fragment: Self::Fragment, validator: Validator)
    -> Result<Self, ValidationError>;
}

impl<T: Atomic> FromFragment for T {
    type Fragment = Option<T>;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        fragment.ok_or_else(|| validator.error_required())
    }
}

/// Validates a [`Fragment`](`FromFragment::Fragment`), and turns it into its corresponding
/// [`FromFragment`] type if successful.
pub fn validate<T: FromFragment>(fragment: T::Fragment) -> Result<T, ValidationError> {
    T::from_fragment(fragment, Validator::root())
}

#[cfg(test)]
mod tests {
    use super::{FromFragment, ValidationError, Validator, validate};

    #[derive(Debug, PartialEq, Eq)]
    struct WithFields {
        name: String,
        replicas: u16,
    }

    #[derive(Debug, Default)]
    struct WithFieldsFragment {
        name: Option<String>,
        replicas: Option<u16>,
    }

    impl FromFragment for WithFields {
        type Fragment = WithFieldsFragment;

        fn from_fragment(
            fragment: Self::Fragment,
            validator: Validator,
        ) -> Result<Self, ValidationError> {
            Ok(Self {
                name: String::from_fragment(fragment.name, validator.field(&"name"))?,
                replicas: u16::from_fragment(fragment.replicas, validator.field(&"replicas"))?,
            })
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Nested {
        required: WithFields,
    }

    impl FromFragment for Nested {
        type Fragment = WithFieldsFragment;

        fn from_fragment(
            fragment: Self::Fragment,
            validator: Validator,
        ) -> Result<Self, ValidationError> {
            Ok(Self {
                required: WithFields::from_fragment(fragment, validator.field(&"required"))?,
            })
        }
    }

    #[test]
    fn validate_basics() {
        assert_eq!(
            validate::<WithFields>(WithFieldsFragment {
                name: Some("foo".to_string()),
                replicas: Some(23),
            })
            .unwrap(),
            WithFields {
                name: "foo".to_string(),
                replicas: 23,
            }
        );

        let err = validate::<WithFields>(WithFieldsFragment::default()).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn validate_nested_path() {
        let err = validate::<Nested>(WithFieldsFragment {
            name: Some("foo".to_string()),
            replicas: None,
        })
        .unwrap_err();
        assert_eq!(err.path(), "required.replicas");
    }
}
