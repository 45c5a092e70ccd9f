//! Layered configuration of receiver groups.
//!
//! A receiver group is configured on up to three levels:
//!
//! ```yaml
//! operator defaults:      # ReceiverGroupDefaults, loaded once at startup
//!   ThanosReceiver.spec.defaults:
//!     ThanosReceiver.spec.receiverGroups[*]:
//! ```
//!
//! Only the groups are realized into running receivers, but every level inherits the
//! configuration of the levels above it, unless it overrides them.
//!
//! The system is split into two parts: [`merge`] fills unset fields from a wider scope, and
//! [`fragment`] validates the merged, still partial configuration into a fully populated type.
//! User code should never read the contents of fragments directly: merge, then validate as soon
//! as possible.

pub mod fragment;
pub mod merge;
