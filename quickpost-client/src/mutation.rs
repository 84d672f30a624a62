use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    api::{Comment, CommentId, CommentPages, Error, NewComment, RemoteCommentStore, User},
    key, ClientIdGenerator, QueryCache, QueryKey,
};

/// Lifecycle of one optimistic submission. `Reconciled` and `RolledBack` are
/// terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationPhase {
    Idle,
    CancellingRefetches,
    Snapshotting,
    OptimisticallyApplied,
    AwaitingRemote,
    Reconciled,
    RolledBack,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingMutation {
    pub client_id: CommentId,
    pub text: String,
    pub phase: MutationPhase,
}

/// Everything needed to undo or confirm one optimistic write. Produced by
/// `on_mutate`, consumed by exactly one of `rollback` or `reconcile`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MutationSnapshot {
    /// Cached value as it was right before the placeholder went in
    pub previous: Option<CommentPages>,
    pub client_id: CommentId,

    /// Coordinator write counter right after the placeholder went in
    pub write_seq: u64,
}

#[derive(Clone, Debug)]
pub struct CoordinatorOptions {
    /// Identity sent to the remote store
    pub author: User,

    /// Identity displayed on the placeholder
    pub provisional_author: User,

    /// Mark the key stale once a submission reaches a terminal state
    pub invalidate_on_settle: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> CoordinatorOptions {
        CoordinatorOptions {
            author: User::default_author(),
            provisional_author: User::provisional(),
            invalidate_on_settle: false,
        }
    }
}

/// Posts comments while displaying them right away in the cached comment
/// list.
///
/// Each submission cancels the fetches running for the list, snapshots it,
/// puts a placeholder on top of the first page and only then calls the remote
/// store. On success the placeholder is swapped for the server's comment,
/// keeping its `client_id`; on failure the list is rolled back to the
/// snapshot.
///
/// Rollback restores the snapshot verbatim unless the coordinator wrote to the
/// list since it was taken (another placeholder went in, or another submission
/// settled), in which case only this submission's placeholder is taken out so
/// the others' entries survive. A snapshot taken while an earlier submission
/// is still pending contains that submission's placeholder, and restoring it
/// keeps the placeholder.
pub struct OptimisticMutationCoordinator<C, S> {
    cache: C,
    store: S,
    key: QueryKey,
    options: CoordinatorOptions,

    /// Number of writes done to the list, held while checking and writing
    writes: Mutex<u64>,
    pending: Mutex<BTreeMap<CommentId, PendingMutation>>,
}

impl<C, S> OptimisticMutationCoordinator<C, S>
where
    C: QueryCache<CommentPages>,
    S: RemoteCommentStore,
{
    pub fn new(cache: C, store: S) -> OptimisticMutationCoordinator<C, S> {
        OptimisticMutationCoordinator {
            cache,
            store,
            key: key::comments::all(),
            options: CoordinatorOptions::default(),
            writes: Mutex::new(0),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_key(mut self, key: QueryKey) -> OptimisticMutationCoordinator<C, S> {
        self.key = key;
        self
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> OptimisticMutationCoordinator<C, S> {
        self.options = options;
        self
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Submissions that did not reach a terminal state yet, oldest first
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.pending.lock().values().cloned().collect()
    }

    /// `Idle` for submissions that are unknown or already settled
    pub fn phase(&self, client_id: CommentId) -> MutationPhase {
        self.pending
            .lock()
            .get(&client_id)
            .map_or(MutationPhase::Idle, |m| m.phase)
    }

    /// Posts `text`, which the caller must have checked is not empty.
    ///
    /// Returns the comment as confirmed by the server, carrying the client id
    /// its placeholder had.
    pub async fn submit(&self, text: String) -> Result<Comment, Error> {
        let client_id = ClientIdGenerator::global().next();
        let mut unresolved = Unresolved {
            coordinator: self,
            client_id,
            snapshot: None,
        };
        unresolved.snapshot = Some(self.on_mutate(client_id, &text).await);

        self.set_phase(client_id, MutationPhase::AwaitingRemote);
        let payload = NewComment::new(text, self.options.author.clone(), Utc::now());
        let res = self.store.create_comment(payload).await;

        unresolved.resolve(res)
    }

    /// Cancels fetches for the comment list, snapshots it and puts the
    /// placeholder for `client_id` on top of its first page.
    ///
    /// Nothing is inserted if the list was never loaded.
    pub async fn on_mutate(&self, client_id: CommentId, text: &str) -> MutationSnapshot {
        self.pending.lock().insert(
            client_id,
            PendingMutation {
                client_id,
                text: String::from(text),
                phase: MutationPhase::CancellingRefetches,
            },
        );
        tracing::debug!(?client_id, key = %self.key, "cancelling refetches");
        self.cache.cancel_in_flight(&self.key).await;

        // no await from here on: nothing can write between snapshot and apply
        self.set_phase(client_id, MutationPhase::Snapshotting);
        let mut writes = self.writes.lock();
        let previous = self.cache.get(&self.key);
        let placeholder = Comment::placeholder(
            client_id,
            String::from(text),
            self.options.provisional_author.clone(),
            Utc::now(),
        );
        self.cache.set(&self.key, |old| {
            let old = old?;
            if old.find_by_key(client_id).is_some() {
                tracing::warn!(?client_id, "placeholder already present, not inserting it twice");
                return None;
            }
            old.with_prepended(placeholder)
        });
        *writes += 1;
        let write_seq = *writes;
        drop(writes);
        self.set_phase(client_id, MutationPhase::OptimisticallyApplied);
        tracing::debug!(?client_id, write_seq, "placeholder applied");

        MutationSnapshot {
            previous,
            client_id,
            write_seq,
        }
    }

    /// Undoes the optimistic write of `snapshot`
    pub fn rollback(&self, snapshot: MutationSnapshot) {
        let client_id = snapshot.client_id;
        let mut writes = self.writes.lock();
        if snapshot.previous.is_none() {
            // no list to insert into, so no placeholder went in: whatever got
            // loaded meanwhile stays
        } else if *writes == snapshot.write_seq {
            // a repeated `on_mutate` snapshots this submission's own placeholder
            let previous = snapshot
                .previous
                .as_ref()
                .and_then(|p| p.without_placeholder(client_id))
                .or(snapshot.previous);
            self.cache.restore(&self.key, previous);
        } else {
            tracing::debug!(
                ?client_id,
                "list changed by other submissions since the snapshot, only removing the placeholder"
            );
            self.cache
                .set(&self.key, |old| old?.without_placeholder(client_id));
        }
        *writes += 1;
        drop(writes);
        self.settle(client_id, MutationPhase::RolledBack);
    }

    /// Swaps the placeholder of `snapshot` for `saved`, keeping the
    /// placeholder's client id. Does nothing if the placeholder is gone, so
    /// calling it twice is harmless.
    pub fn reconcile(&self, snapshot: &MutationSnapshot, saved: &Comment) -> Comment {
        let client_id = snapshot.client_id;
        let confirmed = Comment {
            client_id: Some(client_id),
            ..saved.clone()
        };
        {
            let mut writes = self.writes.lock();
            self.cache.set(&self.key, |old| {
                old?.with_placeholder_replaced(client_id, confirmed.clone())
            });
            *writes += 1;
        }
        tracing::info!(?client_id, id = ?confirmed.id, "comment confirmed");
        self.settle(client_id, MutationPhase::Reconciled);
        confirmed
    }

    fn set_phase(&self, client_id: CommentId, phase: MutationPhase) {
        if let Some(m) = self.pending.lock().get_mut(&client_id) {
            tracing::trace!(?client_id, from = ?m.phase, to = ?phase, "mutation phase");
            m.phase = phase;
        }
    }

    fn settle(&self, client_id: CommentId, phase: MutationPhase) {
        self.pending.lock().remove(&client_id);
        tracing::debug!(?client_id, ?phase, "mutation settled");
        if self.options.invalidate_on_settle {
            self.cache.invalidate(&self.key);
        }
    }
}

/// Rolls back a submission whose future got dropped before the remote store
/// answered
struct Unresolved<'a, C, S>
where
    C: QueryCache<CommentPages>,
    S: RemoteCommentStore,
{
    coordinator: &'a OptimisticMutationCoordinator<C, S>,
    client_id: CommentId,
    snapshot: Option<MutationSnapshot>,
}

impl<'a, C, S> Unresolved<'a, C, S>
where
    C: QueryCache<CommentPages>,
    S: RemoteCommentStore,
{
    fn resolve(mut self, res: Result<Comment, Error>) -> Result<Comment, Error> {
        let snapshot = match self.snapshot.take() {
            Some(s) => s,
            // dropped before the placeholder went in, there is nothing to settle
            None => return res,
        };
        let client_id = self.client_id;
        match res {
            Ok(saved) => Ok(self.coordinator.reconcile(&snapshot, &saved)),
            Err(err) => {
                tracing::warn!(?client_id, %err, "comment submission failed, rolling back");
                self.coordinator.rollback(snapshot);
                Err(err)
            }
        }
    }
}

impl<'a, C, S> Drop for Unresolved<'a, C, S>
where
    C: QueryCache<CommentPages>,
    S: RemoteCommentStore,
{
    fn drop(&mut self) {
        match self.snapshot.take() {
            Some(snapshot) => {
                tracing::warn!(client_id = ?self.client_id, "comment submission abandoned, rolling back");
                self.coordinator.rollback(snapshot);
            }
            None => {
                // either resolved, or dropped before the placeholder went in
                self.coordinator.pending.lock().remove(&self.client_id);
            }
        }
    }
}

/// Posts comments without any optimistic display: the list only changes once
/// the server answered
pub struct CreateCommentMutation<C, S> {
    cache: C,
    store: S,
    key: QueryKey,
    author: User,
}

impl<C, S> CreateCommentMutation<C, S>
where
    C: QueryCache<CommentPages>,
    S: RemoteCommentStore,
{
    pub fn new(cache: C, store: S) -> CreateCommentMutation<C, S> {
        CreateCommentMutation {
            cache,
            store,
            key: key::comments::all(),
            author: User::default_author(),
        }
    }

    pub fn with_key(mut self, key: QueryKey) -> CreateCommentMutation<C, S> {
        self.key = key;
        self
    }

    pub async fn submit(&self, text: String) -> Result<Comment, Error> {
        let payload = NewComment::new(text, self.author.clone(), Utc::now());
        let saved = self.store.create_comment(payload).await?;
        self.cache
            .set(&self.key, |old| old?.with_prepended(saved.clone()));
        tracing::info!(id = ?saved.id, "comment created");
        Ok(saved)
    }
}
