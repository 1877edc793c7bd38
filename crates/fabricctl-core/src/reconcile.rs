//! Membership reconciliation
//!
//! Converts a desired membership list and the current one into the minimal
//! set of add/update/remove calls. Members are keyed by a unique identity
//! (an email, a workspace id); two members with the same identity but
//! different fields produce an update, identical members produce nothing.
//!
//! ```text
//! Planned -> Reconciling -> Converged
//!                        \-> PartiallyFailed
//! ```
//!
//! A failed call stops the remaining calls. Mutations already issued are not
//! rolled back; the next plan against the refreshed current state picks up
//! where this one stopped.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;
use tracing::{debug, info, warn};

use crate::error::{FabricError, Result};

/// An entity of a membership set
pub trait Member: Clone + PartialEq + Debug + Send + Sync {
    /// Unique key of the member within its set
    fn identity(&self) -> &str;
}

/// Fails on the first identity that occurs twice in `desired`.
///
/// # Errors
///
/// [`FabricError::DuplicateIdentity`] naming the repeated key.
pub fn check_duplicates<T: Member>(desired: &[T]) -> Result<()> {
    let mut seen = HashSet::with_capacity(desired.len());
    for member in desired {
        if !seen.insert(member.identity()) {
            return Err(FabricError::DuplicateIdentity {
                key: member.identity().to_string(),
            });
        }
    }
    Ok(())
}

/// Members of `a` whose identity is absent from `b`, in the order of `a`.
pub fn difference<T: Member>(a: &[T], b: &[T]) -> Vec<T> {
    let keys = identities(b);
    a.iter()
        .filter(|m| !keys.contains(m.identity()))
        .cloned()
        .collect()
}

/// Members of `a` whose identity is present in `b`, in the order of `a`.
pub fn intersection<T: Member>(a: &[T], b: &[T]) -> Vec<T> {
    let keys = identities(b);
    a.iter()
        .filter(|m| keys.contains(m.identity()))
        .cloned()
        .collect()
}

fn identities<T: Member>(members: &[T]) -> HashSet<&str> {
    members.iter().map(Member::identity).collect()
}

/// Lifecycle of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Desired and current sets are known, nothing issued yet
    Planned,
    /// Calls are being issued
    Reconciling,
    /// Every planned call succeeded
    Converged,
    /// A call failed; earlier calls stay applied
    PartiallyFailed,
}

/// Work batches computed by [`plan`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan<T> {
    pub to_add: Vec<T>,
    /// Desired members whose current record differs
    pub to_update: Vec<T>,
    pub to_remove: Vec<T>,
    /// Number of desired members identical to their current record
    pub unchanged: usize,
}

impl<T> ReconcilePlan<T> {
    /// `Converged` when current already matches desired, `Planned` otherwise
    pub fn state(&self) -> ReconcileState {
        if self.is_empty() {
            ReconcileState::Converged
        } else {
            ReconcileState::Planned
        }
    }

    /// Number of backend calls the plan will issue
    pub fn call_count(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_count() == 0
    }
}

/// Computes the batches that converge `current` to `desired`.
///
/// # Errors
///
/// [`FabricError::DuplicateIdentity`] if `desired` repeats an identity.
pub fn plan<T: Member>(desired: &[T], current: &[T]) -> Result<ReconcilePlan<T>> {
    check_duplicates(desired)?;

    let to_add = difference(desired, current);
    let to_remove = difference(current, desired);

    let mut to_update = Vec::new();
    let mut unchanged = 0;
    for member in intersection(desired, current) {
        let differs = current
            .iter()
            .find(|c| c.identity() == member.identity())
            .is_some_and(|c| *c != member);
        if differs {
            to_update.push(member);
        } else {
            unchanged += 1;
        }
    }

    Ok(ReconcilePlan {
        to_add,
        to_update,
        to_remove,
        unchanged,
    })
}

/// Remote side of a membership set
#[async_trait]
pub trait MembershipBackend<T: Member>: Send + Sync {
    async fn add(&self, member: &T) -> Result<()>;
    async fn update(&self, member: &T) -> Result<()>;
    async fn remove(&self, member: &T) -> Result<()>;
}

/// A call that was issued and succeeded
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    Added(T),
    Updated(T),
    Removed(T),
}

/// Outcome of [`apply`]
#[derive(Debug)]
pub struct ReconcileReport<T> {
    state: ReconcileState,
    applied: Vec<Mutation<T>>,
    unchanged: usize,
    error: Option<FabricError>,
}

impl<T> ReconcileReport<T> {
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn applied(&self) -> &[Mutation<T>] {
        &self.applied
    }

    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    /// The error that stopped a partially failed reconciliation
    pub fn error(&self) -> Option<&FabricError> {
        self.error.as_ref()
    }

    pub fn is_converged(&self) -> bool {
        self.state == ReconcileState::Converged
    }

    /// Applied mutations on convergence, the aborting error otherwise.
    pub fn into_result(self) -> Result<Vec<Mutation<T>>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.applied),
        }
    }
}

/// Issues one backend call per planned item: additions, updates, removals.
///
/// Never returns early with `Err`; a failed call is recorded in the report.
pub async fn apply<T, B>(plan: ReconcilePlan<T>, backend: &B) -> ReconcileReport<T>
where
    T: Member,
    B: MembershipBackend<T> + ?Sized,
{
    debug!(
        state = ?ReconcileState::Reconciling,
        add = plan.to_add.len(),
        update = plan.to_update.len(),
        remove = plan.to_remove.len(),
        unchanged = plan.unchanged,
        "reconciling membership"
    );

    let mut applied = Vec::with_capacity(plan.call_count());
    let result = apply_batches(plan.to_add, plan.to_update, plan.to_remove, backend, &mut applied).await;

    match result {
        Ok(()) => {
            info!(applied = applied.len(), "membership converged");
            ReconcileReport {
                state: ReconcileState::Converged,
                applied,
                unchanged: plan.unchanged,
                error: None,
            }
        }
        Err(e) => {
            warn!(applied = applied.len(), error = %e, "membership partially reconciled");
            ReconcileReport {
                state: ReconcileState::PartiallyFailed,
                applied,
                unchanged: plan.unchanged,
                error: Some(e),
            }
        }
    }
}

async fn apply_batches<T, B>(
    to_add: Vec<T>,
    to_update: Vec<T>,
    to_remove: Vec<T>,
    backend: &B,
    applied: &mut Vec<Mutation<T>>,
) -> Result<()>
where
    T: Member,
    B: MembershipBackend<T> + ?Sized,
{
    for member in to_add {
        backend.add(&member).await?;
        applied.push(Mutation::Added(member));
    }
    for member in to_update {
        backend.update(&member).await?;
        applied.push(Mutation::Updated(member));
    }
    for member in to_remove {
        backend.remove(&member).await?;
        applied.push(Mutation::Removed(member));
    }
    Ok(())
}

/// Plans and applies in one step.
///
/// # Errors
///
/// [`FabricError::DuplicateIdentity`] before any call is issued.
pub async fn reconcile<T, B>(desired: &[T], current: &[T], backend: &B) -> Result<ReconcileReport<T>>
where
    T: Member,
    B: MembershipBackend<T> + ?Sized,
{
    let plan = plan(desired, current)?;
    Ok(apply(plan, backend).await)
}
