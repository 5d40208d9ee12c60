//! Actor loop that owns one deal and serializes every change to it.
//!
//! The actor runs on its own thread and processes messages from an `mpsc`
//! channel one at a time. It exclusively owns the in-memory [`Deal`], so a
//! read-modify-write on a deal can never interleave with another one on the
//! same deal.
//!
//! Public API: [`DealHandle`] (cloneable async handle). Actors are spawned
//! by the repository through [`spawn_actor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::clock::Clock;
use crate::deal::Deal;
use crate::error::{DealError, ExecuteError, StateError, StoreError};
use crate::event::{Actor, DealEvent, RecordedEvent};
use crate::status::TransitionPolicy;
use crate::storage::DealStore;

/// Inbox capacity of every deal actor.
const INBOX_CAPACITY: usize = 32;

/// Configuration for the actor loop.
///
/// Internal to the crate -- callers configure it through
/// [`DealRepositoryBuilder`](crate::DealRepositoryBuilder).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActorConfig {
    /// How long the actor waits for a message before shutting down.
    pub idle_timeout: Duration,
    /// Policy every produced event is admitted under.
    pub policy: TransitionPolicy,
}

/// A decision function run against the actor's current deal.
///
/// Returns the events to record; an empty vector is a no-op. Each event is
/// still admitted by the actor, see [`Deal::admit`].
pub(crate) type Transition =
    Box<dyn FnOnce(&Deal) -> Result<Vec<DealEvent>, DealError> + Send + 'static>;

/// Who is asking for a change, and under which label it is traced.
#[derive(Debug, Clone)]
pub(crate) struct UpdateMeta {
    /// Role stamped on every recorded event.
    pub actor: Actor,
    /// Correlation ID stamped on every recorded event.
    pub correlation_id: Option<String>,
    /// Name used for the `execute` span.
    pub label: &'static str,
}

/// Messages sent from [`DealHandle`] to the actor loop.
pub(crate) enum ActorMessage {
    /// Run a transition and commit its events.
    Update {
        transition: Transition,
        meta: UpdateMeta,
        reply: oneshot::Sender<Result<Deal, ExecuteError>>,
    },

    /// Retrieve the current deal.
    GetState { reply: oneshot::Sender<Deal> },

    /// Gracefully shut down the actor loop.
    Shutdown,
}

// `Transition` is a boxed closure and has no `Debug`.
impl std::fmt::Debug for ActorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update { meta, .. } => f.debug_struct("Update").field("meta", meta).finish(),
            Self::GetState { .. } => f.write_str("GetState"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// State owned by a running actor.
struct DealActor {
    deal: Deal,
    store: Arc<dyn DealStore>,
    clock: Arc<dyn Clock>,
    policy: TransitionPolicy,
}

impl DealActor {
    /// Decide, fold and persist.
    ///
    /// The new deal is built on a copy and only replaces the current one
    /// after the store accepted it. Events are admitted one by one against
    /// the partially folded copy, and a copy that no longer replays from
    /// its log is never saved.
    fn update(&mut self, transition: Transition, meta: &UpdateMeta) -> Result<Deal, ExecuteError> {
        let events = transition(&self.deal).inspect_err(|e| {
            tracing::warn!(error = %e, "transition rejected");
        })?;

        if events.is_empty() {
            tracing::debug!("no-op command, nothing recorded");
            return Ok(self.deal.clone());
        }

        let count = events.len();
        let mut next = self.deal.clone();
        for event in events {
            next.admit(&event, self.policy).inspect_err(|e| {
                tracing::warn!(error = %e, event = event.action(), "event rejected");
            })?;
            // Events stay ordered even if the clock lags the stored log.
            let at = self.clock.now().max(next.updated_at());
            let recorded = RecordedEvent::new(at, meta.actor, event)
                .with_correlation_id(meta.correlation_id.clone());
            next = next.apply(&recorded);
        }

        next.check_consistency().map_err(|reason| StoreError::Corrupt {
            id: next.id.clone(),
            reason,
        })?;

        self.store.save(&next)?;
        self.deal = next;

        tracing::info!(count, status = %self.deal.status, "events recorded");
        Ok(self.deal.clone())
    }
}

/// Runs the deal actor loop on a dedicated thread.
///
/// The loop exits when the channel closes (all senders dropped), a
/// `Shutdown` message is received, or the idle timeout elapses.
///
/// # Arguments
///
/// * `actor` - The deal and its collaborators.
/// * `rx` - Receiving end of the mpsc channel carrying `ActorMessage`s.
/// * `config` - Actor configuration (idle timeout).
fn run_actor(mut actor: DealActor, mut rx: mpsc::Receiver<ActorMessage>, config: ActorConfig) {
    // The actor needs `tokio::time::timeout` for idle eviction, and the
    // caller's runtime may be current-thread, which does not drive timers
    // for foreign threads. A private runtime keeps the actor self-contained.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            // Dropping `rx` makes every pending and future call see
            // `ActorGone`.
            tracing::error!(deal_id = %actor.deal.id, error = %e, "failed to start actor runtime");
            return;
        }
    };

    loop {
        // Build the timeout inside `block_on` so the timer registers with
        // the local runtime's time driver.
        let idle_timeout = config.idle_timeout;
        let msg = rt.block_on(async { tokio::time::timeout(idle_timeout, rx.recv()).await });

        match msg {
            Ok(Some(ActorMessage::Update {
                transition,
                meta,
                reply,
            })) => {
                let _span = tracing::info_span!(
                    "execute",
                    deal_id = %actor.deal.id,
                    command = meta.label,
                )
                .entered();
                let result = actor.update(transition, &meta);
                // The caller may have stopped waiting; that is fine.
                let _ = reply.send(result);
            }
            Ok(Some(ActorMessage::GetState { reply })) => {
                let _ = reply.send(actor.deal.clone());
            }
            Ok(Some(ActorMessage::Shutdown)) | Ok(None) => break,
            Err(_elapsed) => {
                tracing::info!(deal_id = %actor.deal.id, "actor idle, shutting down");
                break;
            }
        }
    }
}

/// Async handle to a running deal actor.
///
/// Lightweight, cloneable, and `Send + Sync`.
#[derive(Debug, Clone)]
pub struct DealHandle {
    sender: mpsc::Sender<ActorMessage>,
}

impl DealHandle {
    /// Run `transition` inside the actor and wait for the committed deal.
    ///
    /// # Errors
    ///
    /// * [`ExecuteError::Domain`] -- the transition rejected the change.
    /// * [`ExecuteError::Store`] -- the new document could not be saved;
    ///   the previous deal is still current.
    /// * [`ExecuteError::ActorGone`] -- the actor thread has exited.
    pub(crate) async fn update(
        &self,
        transition: Transition,
        meta: UpdateMeta,
    ) -> Result<Deal, ExecuteError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Update {
                transition,
                meta,
                reply: tx,
            })
            .await
            .map_err(|_| ExecuteError::ActorGone)?;
        rx.await.map_err(|_| ExecuteError::ActorGone)?
    }

    /// Read a snapshot of the current deal.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ActorGone`] if the actor thread has exited.
    pub async fn state(&self) -> Result<Deal, StateError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::GetState { reply: tx })
            .await
            .map_err(|_| StateError::ActorGone)?;
        rx.await.map_err(|_| StateError::ActorGone)
    }

    /// Check whether the actor backing this handle is still running.
    ///
    /// Returns `false` once the actor has exited (idle timeout or
    /// shutdown). The repository uses this to evict stale handles and
    /// respawn the actor on the next access.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Stop the actor after the messages already queued and wait for it
    /// to exit.
    pub(crate) async fn shutdown(&self) {
        // A closed channel means the actor is already gone.
        let _ = self.sender.send(ActorMessage::Shutdown).await;
        self.sender.closed().await;
    }
}

/// Spawn an actor owning `deal`.
///
/// # Arguments
///
/// * `deal` - The deal as last persisted.
/// * `store` - Where committed documents are written.
/// * `clock` - Source of event timestamps.
/// * `config` - Actor configuration (idle timeout, transition policy).
///
/// # Returns
///
/// A [`DealHandle`] for sending updates and reading state.
pub(crate) fn spawn_actor(
    deal: Deal,
    store: Arc<dyn DealStore>,
    clock: Arc<dyn Clock>,
    config: ActorConfig,
) -> DealHandle {
    let (tx, rx) = mpsc::channel::<ActorMessage>(INBOX_CAPACITY);
    let actor = DealActor {
        deal,
        store,
        clock,
        policy: config.policy,
    };

    std::thread::spawn(move || run_actor(actor, rx, config));

    DealHandle { sender: tx }
}
