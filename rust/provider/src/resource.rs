//! Resources managed by the provider

use serde::Serialize;
use strum::Display;

pub mod role;

/// The change made to the cluster to reconcile a declared resource
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApplyOutcome {
    /// The resource did not exist and was created.
    Created,

    /// The resource existed and its document was replaced.
    Updated,

    /// The identifier changed, so the old resource was deleted and a new one created.
    Replaced,

    /// The resource already matched the declaration.
    Unchanged,
}
