//! Top-level entry point that composes actor spawning, handle caching and
//! storage into a single [`DealRepository`].
//!
//! The repository is built via [`DealRepositoryBuilder`]. Every
//! read-modify-write on a deal runs inside that deal's actor, so operations
//! on one deal are linearized while different deals proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::actor::{ActorConfig, DealHandle, Transition, UpdateMeta, spawn_actor};
use crate::clock::{Clock, IdGenerator, RandomIds, SystemClock};
use crate::command::{CommandContext, DealCommand};
use crate::deal::{Deal, DealPayload};
use crate::error::{DealError, ExecuteError, StateError, StoreError};
use crate::event::DealEvent;
use crate::fixtures::SeedDeal;
use crate::status::TransitionPolicy;
use crate::storage::{DealStore, MemoryStore};

/// Default idle timeout for actors: 5 minutes.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// How many fresh ids `create` draws before giving up on collisions.
const MAX_ID_ATTEMPTS: usize = 16;

/// Live actor handles keyed by deal id.
type HandleCache = HashMap<String, DealHandle>;

/// Authoritative map of deal id to [`Deal`].
///
/// `Clone` is cheap -- all internal state is `Arc`-wrapped.
#[derive(Clone)]
pub struct DealRepository {
    store: Arc<dyn DealStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    cache: Arc<RwLock<HandleCache>>,
    seed: Arc<Vec<SeedDeal>>,
    policy: TransitionPolicy,
    idle_timeout: Duration,
}

// Manual `Debug` because the trait objects are not `Debug`.
impl std::fmt::Debug for DealRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DealRepository")
            .field("policy", &self.policy)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl DealRepository {
    /// Start configuring a repository.
    pub fn builder() -> DealRepositoryBuilder {
        DealRepositoryBuilder::new()
    }

    /// The transition policy commands are checked against.
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Get a handle to a deal's actor, spawning it if needed.
    ///
    /// # Returns
    ///
    /// `None` if no deal with `id` is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the deal document cannot be loaded.
    async fn handle(&self, id: &str) -> Result<Option<DealHandle>, StoreError> {
        // Fast path: check cache with read lock.
        {
            let cache = self.cache.read().await;
            if let Some(handle) = cache.get(id)
                && handle.is_alive()
            {
                return Ok(Some(handle.clone()));
            }
        }

        // Slow path: re-check under the write lock so only one actor is
        // ever spawned per deal.
        let mut cache = self.cache.write().await;
        if let Some(handle) = cache.get(id)
            && handle.is_alive()
        {
            return Ok(Some(handle.clone()));
        }
        cache.remove(id);

        let Some(deal) = self.store.load(id)? else {
            return Ok(None);
        };

        tracing::debug!(deal_id = %id, "spawning actor");
        let handle = spawn_actor(
            deal,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            ActorConfig {
                idle_timeout: self.idle_timeout,
                policy: self.policy,
            },
        );
        cache.insert(id.to_owned(), handle.clone());
        Ok(Some(handle))
    }

    /// Create a new draft deal.
    ///
    /// Assigns a fresh id, mints the handover credential and records the
    /// seed event attributed to `ctx.actor` (the dealer by default).
    ///
    /// # Errors
    ///
    /// * [`ExecuteError::Domain`] with [`DealError::Validation`] -- the
    ///   payload is incomplete. Nothing is stored.
    /// * [`ExecuteError::Store`] -- the document could not be saved, or no
    ///   unused id could be drawn.
    pub async fn create(
        &self,
        payload: DealPayload,
        ctx: CommandContext,
    ) -> Result<Deal, ExecuteError> {
        payload.validate()?;

        // Holding the write lock keeps the id check and the first save
        // atomic with respect to other creates and actor spawns.
        let cache = self.cache.write().await;

        let mut id = self.ids.deal_id();
        let mut attempts = 1;
        while cache.contains_key(&id) || self.store.load(&id)?.is_some() {
            if attempts == MAX_ID_ATTEMPTS {
                return Err(StoreError::IdExhausted { id }.into());
            }
            tracing::debug!(deal_id = %id, "deal id taken, drawing another");
            id = self.ids.deal_id();
            attempts += 1;
        }

        let deal = Deal::draft(id, payload, self.ids.otp(), self.clock.now(), &ctx)?;
        self.store.save(&deal)?;
        drop(cache);

        tracing::info!(deal_id = %deal.id, total = deal.total(), "deal created");
        Ok(deal)
    }

    /// Read a snapshot of a deal.
    ///
    /// # Returns
    ///
    /// `None` if no deal with `id` exists.
    ///
    /// # Errors
    ///
    /// * [`StateError::Store`] -- the document could not be loaded.
    /// * [`StateError::ActorGone`] -- the deal's actor exited mid-request.
    pub async fn get(&self, id: &str) -> Result<Option<Deal>, StateError> {
        match self.handle(id).await? {
            Some(handle) => handle.state().await.map(Some),
            None => Ok(None),
        }
    }

    /// Atomically read-modify-write a deal.
    ///
    /// `transition` runs inside the deal's actor against the current state
    /// and returns the events to record, attributed to `ctx.actor` (the
    /// dealer by default). Every event must pass [`Deal::admit`] under the
    /// repository's policy, so `update` can do nothing the commands cannot. The folded result is persisted before it becomes
    /// visible; if the store write fails the previous deal stays current.
    ///
    /// # Returns
    ///
    /// The committed deal, or `None` if no deal with `id` exists.
    ///
    /// # Errors
    ///
    /// * [`ExecuteError::Domain`] -- `transition` rejected the change, or
    ///   one of its events was not admitted. Nothing is recorded.
    /// * [`ExecuteError::Store`] -- the document could not be loaded or
    ///   saved.
    /// * [`ExecuteError::ActorGone`] -- the deal's actor exited mid-request.
    pub async fn update<F>(
        &self,
        id: &str,
        ctx: CommandContext,
        transition: F,
    ) -> Result<Option<Deal>, ExecuteError>
    where
        F: FnOnce(&Deal) -> Result<Vec<DealEvent>, DealError> + Send + 'static,
    {
        let meta = UpdateMeta {
            actor: ctx.actor.unwrap_or_default(),
            correlation_id: ctx.correlation_id,
            label: "update",
        };
        self.run(id, Box::new(transition), meta).await
    }

    /// Apply a typed command to a deal under the repository's policy.
    ///
    /// # Returns
    ///
    /// The deal after the command, or `None` if no deal with `id` exists.
    /// A no-op command returns the unchanged deal.
    ///
    /// # Errors
    ///
    /// Same as [`update`](DealRepository::update).
    pub async fn execute(
        &self,
        id: &str,
        command: DealCommand,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        let policy = self.policy;
        let meta = UpdateMeta {
            actor: ctx.actor_for(command),
            correlation_id: ctx.correlation_id,
            label: command.as_str(),
        };
        let transition: Transition = Box::new(move |deal: &Deal| deal.handle(command, policy));
        self.run(id, transition, meta).await
    }

    async fn run(
        &self,
        id: &str,
        transition: Transition,
        meta: UpdateMeta,
    ) -> Result<Option<Deal>, ExecuteError> {
        match self.handle(id).await? {
            Some(handle) => handle.update(transition, meta).await.map(Some),
            None => {
                tracing::debug!(deal_id = %id, "deal not found");
                Ok(None)
            }
        }
    }

    /// Every deal, newest first by creation time (ties broken by id,
    /// descending).
    ///
    /// Deals with a running actor are read from it; the rest come straight
    /// from the store, which only ever holds committed documents. No actor
    /// is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if any document cannot be read.
    pub async fn list(&self) -> Result<Vec<Deal>, StateError> {
        let ids = self.store.list_ids()?;
        let mut deals = Vec::with_capacity(ids.len());
        for id in ids {
            let live = self
                .cache
                .read()
                .await
                .get(&id)
                .filter(|h| h.is_alive())
                .cloned();
            let deal = match live {
                Some(handle) => match handle.state().await {
                    Ok(deal) => Some(deal),
                    // Went idle after the check; its last commit is stored.
                    Err(StateError::ActorGone) => self.store.load(&id)?,
                    Err(e) => return Err(e),
                },
                None => self.store.load(&id)?,
            };
            if let Some(deal) = deal {
                deals.push(deal);
            }
        }
        deals.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(deals)
    }

    /// Wipe every deal and recreate the configured seed deals.
    ///
    /// Running actors are stopped before the store is cleared.
    ///
    /// # Returns
    ///
    /// The seeded deals, in seed order.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] if the store cannot be cleared or a seed
    /// deal cannot be recreated.
    pub async fn reset_demo(&self) -> Result<Vec<Deal>, ExecuteError> {
        {
            let mut cache = self.cache.write().await;
            for (_, handle) in cache.drain() {
                handle.shutdown().await;
            }
            self.store.clear()?;
        }
        tracing::info!(seeds = self.seed.len(), "store cleared, reseeding");

        let mut deals = Vec::with_capacity(self.seed.len());
        for seed in self.seed.iter() {
            let mut deal = self
                .create(seed.payload.clone(), CommandContext::default())
                .await?;
            for &command in &seed.steps {
                if let Some(next) = self
                    .execute(&deal.id, command, CommandContext::default())
                    .await?
                {
                    deal = next;
                }
            }
            deals.push(deal);
        }
        Ok(deals)
    }

    // -----------------------------------------------------------------------
    // Inbound operations
    // -----------------------------------------------------------------------

    /// Assign the quotation number. A no-op if one already exists.
    pub async fn generate_quotation(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::GenerateQuotation, ctx).await
    }

    /// Send the deal to the buyer.
    pub async fn send_to_buyer(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::SendToBuyer, ctx).await
    }

    /// Record the buyer's acceptance.
    pub async fn confirm_by_buyer(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::ConfirmByBuyer, ctx).await
    }

    /// Record a cleared payment; funds move into escrow and the invoice
    /// number and order id are assigned.
    pub async fn pay_success(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::PaySuccess, ctx).await
    }

    /// Record a failed payment; the deal returns to `Sent`.
    pub async fn pay_fail(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::PayFail, ctx).await
    }

    /// Mark the item ready for handover.
    pub async fn mark_ready(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::MarkReady, ctx).await
    }

    /// Record that the handover credential was checked.
    ///
    /// Normally reached through
    /// [`HandoverVerifier::confirm`](crate::HandoverVerifier::confirm).
    pub async fn confirm_handover(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::ConfirmHandover, ctx).await
    }

    /// Release escrow to the dealer.
    pub async fn mark_released(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::MarkReleased, ctx).await
    }

    /// Return held funds to the buyer.
    pub async fn refund(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::Refund, ctx).await
    }

    /// Withdraw the deal before payment.
    pub async fn cancel(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::Cancel, ctx).await
    }

    /// Lapse the deal before payment.
    pub async fn expire(
        &self,
        id: &str,
        ctx: CommandContext,
    ) -> Result<Option<Deal>, ExecuteError> {
        self.execute(id, DealCommand::Expire, ctx).await
    }
}

/// Builder for configuring a [`DealRepository`].
///
/// Every collaborator has a default: an in-memory store, the system clock,
/// random ids, the guarded transition policy and a 5 minute idle timeout.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use escrowfold::{DealRepository, FileStore, TransitionPolicy};
///
/// let repo = DealRepository::builder()
///     .store(Arc::new(FileStore::new("/tmp/escrowfold")))
///     .policy(TransitionPolicy::Recorded)
///     .idle_timeout(Duration::from_secs(30))
///     .build();
/// assert_eq!(repo.policy(), TransitionPolicy::Recorded);
/// ```
pub struct DealRepositoryBuilder {
    store: Option<Arc<dyn DealStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    policy: TransitionPolicy,
    idle_timeout: Duration,
    seed: Vec<SeedDeal>,
}

impl DealRepositoryBuilder {
    /// Create a builder with every option at its default.
    pub fn new() -> Self {
        Self {
            store: None,
            clock: None,
            ids: None,
            policy: TransitionPolicy::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            seed: Vec::new(),
        }
    }

    /// Set the durable store. Defaults to a fresh [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn DealStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the timestamp source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the id and OTP source. Defaults to [`RandomIds`].
    pub fn ids(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Set the transition policy. Defaults to
    /// [`TransitionPolicy::Guarded`].
    pub fn policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the idle timeout for actor eviction.
    ///
    /// Actors that receive no messages for this duration shut down. The
    /// next access transparently respawns the actor from the store.
    ///
    /// Defaults to 5 minutes.
    ///
    /// # Arguments
    ///
    /// * `timeout` - How long an idle actor waits before shutting down.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the deals recreated by
    /// [`reset_demo`](DealRepository::reset_demo). Defaults to none.
    pub fn seed(mut self, seed: Vec<SeedDeal>) -> Self {
        self.seed = seed;
        self
    }

    /// Build the repository.
    ///
    /// Nothing is read from the store until the first operation.
    pub fn build(self) -> DealRepository {
        DealRepository {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            ids: self.ids.unwrap_or_else(|| Arc::new(RandomIds)),
            cache: Arc::new(RwLock::new(HashMap::new())),
            seed: Arc::new(self.seed),
            policy: self.policy,
            idle_timeout: self.idle_timeout,
        }
    }
}

impl Default for DealRepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
