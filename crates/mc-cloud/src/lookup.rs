//! Two-phase lookup for platforms that cannot key instances by a
//! client-assigned unique ID.
//!
//! Instances are first narrowed to candidates by their (non-unique) name,
//! then each candidate is confirmed by comparing the machine UID that was
//! embedded into it at creation time.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;

#[async_trait]
pub trait CorrelatedLookup: Send + Sync {
    type Id: fmt::Debug + Send + Sync;
    type Handle: Send;

    /// IDs of instances carrying `name`.
    async fn candidates(&self, name: &str) -> Result<Vec<Self::Id>>;

    /// The instance behind `id` if its embedded UID equals `uid`. A
    /// candidate without a readable UID is not a match.
    async fn confirm(&self, id: &Self::Id, uid: &str) -> Result<Option<Self::Handle>>;
}

/// The first candidate named `name` whose embedded UID is `uid`.
pub async fn find_by_identity<L>(lookup: &L, name: &str, uid: &str) -> Result<Option<L::Handle>>
where
    L: CorrelatedLookup,
{
    let candidates = lookup.candidates(name).await?;
    debug!(name, candidates = candidates.len(), "identity lookup: narrowed by name");

    for id in &candidates {
        if let Some(handle) = lookup.confirm(id, uid).await? {
            debug!(name, ?id, "identity lookup: confirmed");
            return Ok(Some(handle));
        }
    }

    Ok(None)
}
