//! Single-flight dispatcher delivering each action to every registered store.
//!
//! Stores are pure reducers over immutable `Arc` snapshots. Before any
//! reducer runs, the stores an action makes wait on each other are ordered
//! topologically; a store that ignores an action returns the same `Arc`, and
//! only stores whose snapshot pointer changed notify their subscribers.

use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, ThreadId},
};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

type AnyState = Arc<dyn Any + Send + Sync>;

/// Names a registered store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreToken(&'static str);

impl StoreToken {
    /// Token for a store that may not be registered yet, for wiring wait-for
    /// edges ahead of registration.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StoreToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("cannot dispatch while a dispatch is in progress")]
    Reentrant,
    #[error("wait-for cycle between stores: {}", join_tokens(.cycle))]
    CyclicWaitFor { cycle: Vec<StoreToken> },
    #[error("store '{waiting}' waits for unknown store '{token}'")]
    UnknownToken {
        token: &'static str,
        waiting: StoreToken,
    },
    #[error("store '{0}' is already registered")]
    DuplicateStore(StoreToken),
    #[error("store '{token}' does not hold the requested state type")]
    StateTypeMismatch { token: StoreToken },
    #[error("no store named '{0}'")]
    NoSuchStore(&'static str),
}

fn join_tokens(tokens: &[StoreToken]) -> String {
    tokens
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A reducer over one slice of client state.
pub trait Store<A>: Send + Sync + 'static {
    type State: Send + Sync + 'static;

    fn initial_state(&self) -> Arc<Self::State>;

    /// Stores whose new state for `action` must exist before this store
    /// reduces it.
    fn wait_for(&self, _action: &A) -> Vec<StoreToken> {
        Vec::new()
    }

    /// Returns `state` itself (same `Arc`) for actions the store ignores.
    fn reduce(
        &self,
        state: &Arc<Self::State>,
        action: &A,
        ctx: &ReduceContext<'_>,
    ) -> Arc<Self::State>;
}

/// What a reducer can see of stores already settled in this dispatch.
pub struct ReduceContext<'a> {
    tokens: &'a [StoreToken],
    settled: &'a [Option<AnyState>],
}

impl ReduceContext<'_> {
    /// New state of `token` for the current action, if it has already been
    /// reduced.
    pub fn settled<S: Send + Sync + 'static>(&self, token: StoreToken) -> Option<Arc<S>> {
        let idx = self.tokens.iter().position(|t| *t == token)?;
        let state = self.settled[idx].clone()?;
        state.downcast::<S>().ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Stores whose snapshot changed, in reduce order.
    pub changed: Vec<StoreToken>,
}

impl DispatchOutcome {
    pub fn changed(&self, token: StoreToken) -> bool {
        self.changed.contains(&token)
    }
}

trait ErasedStore<A>: Send + Sync {
    fn initial(&self) -> AnyState;
    fn wait_for(&self, action: &A) -> Vec<StoreToken>;
    fn reduce(
        &self,
        token: StoreToken,
        state: &AnyState,
        action: &A,
        ctx: &ReduceContext<'_>,
    ) -> Result<AnyState, DispatchError>;
}

struct Erased<S>(S);

impl<A, S: Store<A>> ErasedStore<A> for Erased<S> {
    fn initial(&self) -> AnyState {
        let initial: AnyState = self.0.initial_state();
        initial
    }

    fn wait_for(&self, action: &A) -> Vec<StoreToken> {
        self.0.wait_for(action)
    }

    fn reduce(
        &self,
        token: StoreToken,
        state: &AnyState,
        action: &A,
        ctx: &ReduceContext<'_>,
    ) -> Result<AnyState, DispatchError> {
        let typed = Arc::clone(state)
            .downcast::<S::State>()
            .map_err(|_| DispatchError::StateTypeMismatch { token })?;
        let next: AnyState = self.0.reduce(&typed, action, ctx);
        Ok(next)
    }
}

struct Entry<A> {
    token: StoreToken,
    store: Box<dyn ErasedStore<A>>,
    notify: watch::Sender<AnyState>,
}

pub struct Dispatcher<A> {
    entries: Vec<Entry<A>>,
    tokens: Vec<StoreToken>,
    states: Mutex<Vec<AnyState>>,
    dispatching: AtomicBool,
    /// Thread running the dispatch in flight.
    owner: Mutex<Option<ThreadId>>,
    /// Set when a reducer dispatched; fails the dispatch in flight.
    reentered: AtomicBool,
}

impl<A> Default for Dispatcher<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stores", &self.tokens)
            .field("dispatching", &self.is_dispatching())
            .finish()
    }
}

/// Clears the in-flight state when a dispatch ends, including by panic.
struct FlightGuard<'a, A>(&'a Dispatcher<A>);

impl<A> Drop for FlightGuard<'_, A> {
    fn drop(&mut self) {
        *self.0.lock_owner() = None;
        self.0.reentered.store(false, Ordering::Release);
        self.0.dispatching.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl<A> Dispatcher<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            tokens: Vec::new(),
            states: Mutex::new(Vec::new()),
            dispatching: AtomicBool::new(false),
            owner: Mutex::new(None),
            reentered: AtomicBool::new(false),
        }
    }

    pub fn register<S: Store<A>>(
        &mut self,
        name: &'static str,
        store: S,
    ) -> Result<StoreToken, DispatchError> {
        let token = StoreToken(name);
        if self.tokens.contains(&token) {
            return Err(DispatchError::DuplicateStore(token));
        }
        let store: Box<dyn ErasedStore<A>> = Box::new(Erased(store));
        let initial = store.initial();
        let (notify, _) = watch::channel(Arc::clone(&initial));
        self.states
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(initial);
        self.entries.push(Entry {
            token,
            store,
            notify,
        });
        self.tokens.push(token);
        debug!(store = name, "store registered");
        Ok(token)
    }

    pub fn token(&self, name: &'static str) -> Result<StoreToken, DispatchError> {
        self.tokens
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or(DispatchError::NoSuchStore(name))
    }

    pub fn tokens(&self) -> &[StoreToken] {
        &self.tokens
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    /// Current snapshot of a store.
    pub fn state<S: Send + Sync + 'static>(&self, token: StoreToken) -> Result<Arc<S>, DispatchError> {
        let idx = self.index_of(token)?;
        let state = Arc::clone(&self.lock_states()[idx]);
        state
            .downcast::<S>()
            .map_err(|_| DispatchError::StateTypeMismatch { token })
    }

    pub fn subscribe<S: Send + Sync + 'static>(
        &self,
        token: StoreToken,
    ) -> Result<Subscription<S>, DispatchError> {
        let idx = self.index_of(token)?;
        // reject mismatched types up front rather than on first change
        self.state::<S>(token)?;
        Ok(Subscription {
            token,
            rx: self.entries[idx].notify.subscribe(),
            _state: PhantomData,
        })
    }

    /// Delivers `action` to every store and commits the new snapshots.
    /// Nothing is committed when this fails. A dispatch from inside a
    /// reducer is rejected, and the dispatch running that reducer then fails
    /// with [`DispatchError::Reentrant`] as well.
    pub fn dispatch(&self, action: &A) -> Result<DispatchOutcome, DispatchError>
    where
        A: fmt::Debug,
    {
        if self
            .dispatching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if *self.lock_owner() == Some(thread::current().id()) {
                self.reentered.store(true, Ordering::Release);
            }
            warn!(?action, "re-entrant dispatch rejected");
            return Err(DispatchError::Reentrant);
        }
        let _guard = FlightGuard(self);
        *self.lock_owner() = Some(thread::current().id());
        trace!(?action, "dispatch");

        let order = self.resolve_order(action)?;
        let previous = self.lock_states().clone();
        let mut settled: Vec<Option<AnyState>> = vec![None; self.entries.len()];
        for &idx in &order {
            let entry = &self.entries[idx];
            let next = {
                let ctx = ReduceContext {
                    tokens: &self.tokens,
                    settled: &settled,
                };
                entry
                    .store
                    .reduce(entry.token, &previous[idx], action, &ctx)?
            };
            settled[idx] = Some(next);
        }
        if self.reentered.load(Ordering::Acquire) {
            warn!(?action, "reducer dispatched during dispatch; nothing committed");
            return Err(DispatchError::Reentrant);
        }

        let mut changed = Vec::new();
        {
            let mut states = self.lock_states();
            for &idx in &order {
                let Some(next) = settled[idx].take() else { continue };
                if !same_state(&previous[idx], &next) {
                    states[idx] = Arc::clone(&next);
                    changed.push((idx, next));
                }
            }
        }
        for (idx, next) in &changed {
            self.entries[*idx].notify.send_replace(Arc::clone(next));
        }

        let changed: Vec<StoreToken> = changed.iter().map(|(idx, _)| self.tokens[*idx]).collect();
        debug!(changed = %join_tokens(&changed), "dispatch settled");
        Ok(DispatchOutcome { changed })
    }

    /// Reduce order for `action`: registration order, with every store after
    /// the stores it waits for.
    fn resolve_order(&self, action: &A) -> Result<Vec<usize>, DispatchError> {
        let mut deps = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let waits = entry
                .store
                .wait_for(action)
                .into_iter()
                .map(|token| {
                    self.index_of(token)
                        .map_err(|_| DispatchError::UnknownToken {
                            token: token.name(),
                            waiting: entry.token,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            deps.push(waits);
        }

        let mut marks = vec![Mark::Unvisited; deps.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(deps.len());
        for idx in 0..deps.len() {
            visit(idx, &deps, &mut marks, &mut path, &mut order).map_err(|cycle| {
                DispatchError::CyclicWaitFor {
                    cycle: cycle.into_iter().map(|i| self.tokens[i]).collect(),
                }
            })?;
        }
        Ok(order)
    }

    fn index_of(&self, token: StoreToken) -> Result<usize, DispatchError> {
        self.tokens
            .iter()
            .position(|t| *t == token)
            .ok_or(DispatchError::NoSuchStore(token.name()))
    }

    fn lock_owner(&self) -> std::sync::MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, Vec<AnyState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn visit(
    idx: usize,
    deps: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match marks[idx] {
        Mark::Done => return Ok(()),
        Mark::Visiting => {
            let start = path.iter().position(|p| *p == idx).unwrap_or(0);
            return Err(path[start..].to_vec());
        }
        Mark::Unvisited => {}
    }
    marks[idx] = Mark::Visiting;
    path.push(idx);
    for &dep in &deps[idx] {
        visit(dep, deps, marks, path, order)?;
    }
    path.pop();
    marks[idx] = Mark::Done;
    order.push(idx);
    Ok(())
}

fn same_state(a: &AnyState, b: &AnyState) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Change notifications for one store.
pub struct Subscription<S> {
    token: StoreToken,
    rx: watch::Receiver<AnyState>,
    _state: PhantomData<fn() -> S>,
}

impl<S: Send + Sync + 'static> Subscription<S> {
    pub fn token(&self) -> StoreToken {
        self.token
    }

    /// Whether the store changed since the last [`Subscription::changed`] or
    /// [`Subscription::current`] call.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next change and returns the new snapshot. `None` once
    /// the dispatcher is gone.
    pub async fn changed(&mut self) -> Option<Arc<S>> {
        self.rx.changed().await.ok()?;
        self.current()
    }

    /// Latest snapshot, marking it seen.
    pub fn current(&mut self) -> Option<Arc<S>> {
        let state = Arc::clone(&*self.rx.borrow_and_update());
        state.downcast::<S>().ok()
    }
}

pub fn action_queue<A>() -> (ActionSender<A>, ActionQueue<A>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ActionSender { tx }, ActionQueue { rx })
}

/// Cloneable handle asynchronous work uses to feed actions back in.
pub struct ActionSender<A> {
    tx: mpsc::UnboundedSender<A>,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<A> ActionSender<A> {
    /// Queues an action; returns false once the queue has been dropped.
    pub fn send(&self, action: impl Into<A>) -> bool {
        if self.tx.send(action.into()).is_err() {
            debug!("action queue closed; dropping action");
            return false;
        }
        true
    }
}

pub struct ActionQueue<A> {
    rx: mpsc::UnboundedReceiver<A>,
}

impl<A: fmt::Debug> ActionQueue<A> {
    pub async fn next(&mut self) -> Option<A> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<A> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next queued action and dispatches it.
    pub async fn pump(
        &mut self,
        dispatcher: &Dispatcher<A>,
    ) -> Option<Result<DispatchOutcome, DispatchError>> {
        let action = self.next().await?;
        Some(dispatcher.dispatch(&action))
    }

    /// Dispatches everything already queued without waiting.
    pub fn drain(&mut self, dispatcher: &Dispatcher<A>) -> Result<usize, DispatchError> {
        let mut count = 0;
        while let Some(action) = self.try_next() {
            dispatcher.dispatch(&action)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
