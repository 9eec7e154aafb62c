//! Lifecycle of a single cache mutation.
//!
//! ```text
//! Idle ──begin──▶ Optimistic ──commit──────▶ Committed
//!                     │
//!                     ├──roll_back─────────▶ RolledBack
//!                     └──discard───────────▶ Discarded
//! ```
//!
//! The pre-mutation snapshot is captured when the mutation begins and lives in
//! the `Optimistic` state until the mutation settles. Rolling back hands that
//! exact value back, never whatever the cache held in between.
//!
//! A mutation is `Discarded` when it settles without writing to the cache:
//! a newer mutation already committed, the response carried no payload, or a
//! failure could not be rolled back because someone else rewrote the key.

/// Where a mutation is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<V> {
    Idle,
    Optimistic {
        snapshot: Option<V>,
        /// Whether an optimistic projection was written to the cache.
        projected: bool,
    },
    Committed(V),
    RolledBack,
    Discarded,
}

/// One in-progress mutation of a cache key.
///
/// `ticket` orders mutations on the same cache; `previous_writer` is the
/// ticket that wrote the value this mutation's snapshot was taken from, so a
/// rollback can hand ownership of the key back to it.
#[derive(Debug, Clone)]
pub struct Mutation<V> {
    ticket: u64,
    previous_writer: u64,
    state: MutationState<V>,
}

impl<V: Clone> Mutation<V> {
    pub fn new(ticket: u64) -> Self {
        Self {
            ticket,
            previous_writer: 0,
            state: MutationState::Idle,
        }
    }

    pub const fn ticket(&self) -> u64 {
        self.ticket
    }

    pub const fn previous_writer(&self) -> u64 {
        self.previous_writer
    }

    pub const fn state(&self) -> &MutationState<V> {
        &self.state
    }

    /// Idle → Optimistic.
    pub fn begin(&mut self, snapshot: Option<V>, previous_writer: u64, projected: bool) {
        debug_assert!(matches!(self.state, MutationState::Idle));
        self.previous_writer = previous_writer;
        self.state = MutationState::Optimistic {
            snapshot,
            projected,
        };
    }

    /// The value captured when the mutation began.
    pub fn snapshot(&self) -> Option<&V> {
        match &self.state {
            MutationState::Optimistic { snapshot, .. } => snapshot.as_ref(),
            _ => None,
        }
    }

    pub fn projected(&self) -> bool {
        matches!(self.state, MutationState::Optimistic { projected: true, .. })
    }

    /// Optimistic → Committed.
    pub fn commit(&mut self, value: V) {
        debug_assert!(matches!(self.state, MutationState::Optimistic { .. }));
        self.state = MutationState::Committed(value);
    }

    /// Optimistic → RolledBack, yielding the snapshot to restore.
    pub fn roll_back(&mut self) -> Option<V> {
        debug_assert!(matches!(self.state, MutationState::Optimistic { .. }));
        match std::mem::replace(&mut self.state, MutationState::RolledBack) {
            MutationState::Optimistic { snapshot, .. } => snapshot,
            _ => None,
        }
    }

    /// Optimistic → Discarded.
    pub fn discard(&mut self) {
        self.state = MutationState::Discarded;
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.state,
            MutationState::Committed(_) | MutationState::RolledBack | MutationState::Discarded
        )
    }
}
