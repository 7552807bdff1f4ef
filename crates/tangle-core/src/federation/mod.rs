//! Federated reads across several checkouts.
//!
//! A federated lookup fans out to every connection, merges what comes back,
//! and repeats while the merged identity keeps growing: a document found in
//! one store may carry identifiers that match further documents in another.
//! The loop ends at a fixpoint, when a full round adds no identifier.
//!
//! Connections are given in priority order. Documents are merged in that
//! order with [`FederationSettings::policy`], so under the default
//! `append-new-overwrite-existing` later connections win field clashes.
//!
//! Federated views are read-only. Counts are summed across stores and so
//! over-count entities that live in more than one of them.

mod cursor;
mod store;

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::connection::{Collection, GraphConnection};
use crate::error::{GraphError, Result};
use crate::merge::{MergePolicy, merge_optional};
use crate::model::EntityKeys;

pub use cursor::{FederatedCursor, IdentityCache};
pub use store::FederatedStore;

/// Round cap used when none is configured.
pub const DEFAULT_MAX_ROUNDS: usize = 64;

/// Per-round deadline used when none is configured.
pub const DEFAULT_ROUND_DEADLINE: Duration = Duration::from_secs(5);

/// Tuning for the fixpoint loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationSettings {
    /// Policy used to fold documents from successive connections.
    pub policy: MergePolicy,
    /// Rounds allowed before giving up with `NotConverged`. Zero is treated
    /// as one: the first round always runs.
    pub max_rounds: usize,
    /// Wall-clock budget for one round of store lookups. `None` disables it.
    pub round_deadline: Option<Duration>,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            policy: MergePolicy::AppendNewOverwriteExisting,
            max_rounds: DEFAULT_MAX_ROUNDS,
            round_deadline: Some(DEFAULT_ROUND_DEADLINE),
        }
    }
}

impl FederationSettings {
    #[must_use]
    pub const fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    #[must_use]
    pub const fn with_round_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.round_deadline = deadline;
        self
    }
}

/// Find every document matching `keys` in every connection, in priority
/// order. Single connections are queried inline.
fn fan_out<D: Collection>(conns: &[GraphConnection], keys: &EntityKeys) -> Result<Vec<D>> {
    let per_conn: Vec<Result<Vec<D>>> = if conns.len() <= 1 {
        conns
            .iter()
            .map(|conn| D::store_of(conn).find_all_by_key(keys))
            .collect()
    } else {
        conns
            .par_iter()
            .map(|conn| D::store_of(conn).find_all_by_key(keys))
            .collect()
    };

    let mut found = Vec::new();
    for docs in per_conn {
        found.extend(docs?);
    }
    Ok(found)
}

/// Run the fixpoint loop for `keys` and return the merged document, if any
/// connection holds a match.
///
/// # Errors
///
/// Returns [`GraphError::NotConverged`] if identifiers are still growing
/// after `max_rounds`, [`GraphError::DeadlineExceeded`] if one round takes
/// too long, [`GraphError::Conflict`] if matching documents disagree on
/// type, or any store error.
#[instrument(skip(conns, settings), fields(connections = conns.len(), keys = %keys))]
pub fn resolve<D: Collection>(
    conns: &[GraphConnection],
    keys: &EntityKeys,
    settings: &FederationSettings,
) -> Result<Option<D>> {
    let mut current = keys.clone();
    let max_rounds = settings.max_rounds.max(1);

    for round in 1..=max_rounds {
        let started = Instant::now();
        let found = fan_out::<D>(conns, &current)?;
        let elapsed = started.elapsed();
        if let Some(deadline) = settings.round_deadline.filter(|deadline| elapsed > *deadline) {
            return Err(GraphError::DeadlineExceeded {
                round,
                elapsed,
                deadline,
            });
        }

        let mut grown = current.clone();
        let mut changed = false;
        let mut merged: Option<D> = None;
        for doc in found {
            if doc.keys().is_subset_of(&current) {
                merged = Some(merge_optional(settings.policy, merged, doc)?);
            } else {
                grown = grown.union(doc.keys())?;
                changed = true;
            }
        }

        if !changed {
            debug!(round, found = merged.is_some(), "federated lookup converged");
            return Ok(merged);
        }
        trace!(round, from = %current, to = %grown, "identity grew, querying again");
        current = grown;
    }

    Err(GraphError::NotConverged {
        rounds: max_rounds,
        keys: current,
    })
}

/// Federated lookup with default settings.
///
/// # Errors
///
/// See [`resolve`].
pub fn federated_get<D: Collection>(conns: &[GraphConnection], keys: &EntityKeys) -> Result<Option<D>> {
    resolve(conns, keys, &FederationSettings::default())
}

/// Number of `D` documents summed over every connection.
///
/// Entities present in several stores are counted once per store.
///
/// # Errors
///
/// Returns the first store error.
pub fn federated_count<D: Collection>(conns: &[GraphConnection]) -> Result<u64> {
    conns
        .iter()
        .map(|conn| D::store_of(conn).count())
        .try_fold(0_u64, |total, count| Ok(total.saturating_add(count?)))
}
