use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Fills the unset parts of a configuration layer from a wider layer.
///
/// Receiver group settings come from three layers. From narrowest to widest these are the group
/// itself, the `defaults` of its `ThanosReceiver` and the defaults of the operator. Merging a
/// layer with the next wider one keeps every value the narrower layer sets.
///
/// Implementations list their fields by hand:
///
/// ```
/// # use thanos_receiver_operator::config::merge::Merge;
/// #[derive(Debug, PartialEq, Eq)]
/// struct Ports {
///     grpc: Option<u16>,
///     http: Option<u16>,
/// }
///
/// impl Merge for Ports {
///     fn merge(&mut self, defaults: &Self) {
///         self.grpc.merge(&defaults.grpc);
///         self.http.merge(&defaults.http);
///     }
/// }
///
/// let mut group = Ports { grpc: Some(20901), http: None };
/// group.merge(&Ports { grpc: Some(10901), http: Some(10902) });
/// assert_eq!(group, Ports { grpc: Some(20901), http: Some(10902) });
/// ```
///
/// Leaf values are wrapped in [`Option`] and must be [`Atomic`]. Nested sections are plain
/// structs that implement `Merge` themselves.
pub trait Merge {
    /// Sets every field of `self` that is unset to its value in `defaults`.
    fn merge(&mut self, defaults: &Self);
}

/// Returns `overrides` merged with `defaults`.
pub fn merge<T: Merge>(mut overrides: T, defaults: &T) -> T {
    overrides.merge(defaults);
    overrides
}

/// [`Merge::merge`] that hands `this` back, so several layers can be folded in a row.
///
/// ```
/// # use thanos_receiver_operator::config::merge::{Merge, chainable_merge};
/// # #[derive(Clone)]
/// # struct Replicas(Option<u16>);
/// # impl Merge for Replicas {
/// #     fn merge(&mut self, defaults: &Self) {
/// #         self.0.merge(&defaults.0);
/// #     }
/// # }
/// let operator = Replicas(Some(1));
/// let mut receiver = Replicas(Some(3));
/// let mut group = Replicas(None);
///
/// chainable_merge(&mut receiver, &operator);
/// assert_eq!(chainable_merge(&mut group, &receiver).0, Some(3));
/// ```
pub fn chainable_merge<'a, T: Merge>(this: &'a mut T, defaults: &T) -> &'a mut T {
    this.merge(defaults);
    this
}

/// A value that is taken as a whole from a single layer, never combined from several.
pub trait Atomic: Clone {}
impl Atomic for u16 {}
impl Atomic for bool {}
impl Atomic for String {}
impl Atomic for Quantity {}
impl Atomic for Vec<String> {}
impl Atomic for BTreeMap<String, String> {}

impl<T: Atomic> Merge for Option<T> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_none() {
            self.clone_from(defaults);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Merge, chainable_merge, merge};

    #[derive(Debug, PartialEq, Eq, Clone, Default)]
    struct Parent {
        one: Option<u16>,
        child: Child,
    }

    impl Merge for Parent {
        fn merge(&mut self, defaults: &Self) {
            self.one.merge(&defaults.one);
            self.child.merge(&defaults.child);
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone, Default)]
    struct Child {
        two: Option<u16>,
        three: Option<bool>,
    }

    impl Merge for Child {
        fn merge(&mut self, defaults: &Self) {
            self.two.merge(&defaults.two);
            self.three.merge(&defaults.three);
        }
    }

    #[test]
    fn merge_option_prefers_set_value() {
        assert_eq!(merge(Some(0u16), &Some(1)), Some(0));
        assert_eq!(merge(None, &Some(1u16)), Some(1));
        assert_eq!(merge(None::<u16>, &None), None);
    }

    #[test]
    fn merge_nested_struct() {
        assert_eq!(
            merge(
                Parent {
                    one: Some(0),
                    child: Child {
                        two: None,
                        three: Some(true),
                    }
                },
                &Parent {
                    one: None,
                    child: Child {
                        two: Some(1),
                        three: Some(false),
                    }
                },
            ),
            Parent {
                one: Some(0),
                child: Child {
                    two: Some(1),
                    three: Some(true)
                },
            }
        );
    }

    #[test]
    fn merge_does_not_touch_defaults() {
        let defaults = Parent {
            one: Some(5),
            child: Child {
                two: Some(6),
                three: None,
            },
        };
        let snapshot = defaults.clone();

        let mut merged = merge(Parent::default(), &defaults);
        merged.one = Some(42);
        merged.child.three = Some(true);

        assert_eq!(defaults, snapshot);
    }

    #[test]
    fn merge_vec_is_atomic() {
        assert_eq!(
            merge(
                Some(vec!["a".to_string()]),
                &Some(vec!["b".to_string(), "c".to_string()])
            ),
            Some(vec!["a".to_string()])
        );
    }

    #[test]
    fn chainable_merge_layers() {
        let mut group = Parent {
            one: None,
            child: Child {
                two: Some(2),
                three: None,
            },
        };
        let mut cluster = Parent {
            one: None,
            child: Child {
                two: Some(20),
                three: Some(false),
            },
        };
        let operator = Parent {
            one: Some(100),
            child: Child::default(),
        };

        chainable_merge(&mut cluster, &operator);
        let merged = chainable_merge(&mut group, &cluster).clone();

        assert_eq!(
            merged,
            Parent {
                one: Some(100),
                child: Child {
                    two: Some(2),
                    three: Some(false),
                },
            }
        );
    }
}
