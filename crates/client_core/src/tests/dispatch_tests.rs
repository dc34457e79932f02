use super::*;
use std::sync::{atomic::AtomicUsize, OnceLock};

#[derive(Debug, Clone, PartialEq)]
enum Act {
    Bump,
    Other,
}

#[derive(Default)]
struct Counter {
    calls: Arc<AtomicUsize>,
}

impl Store<Act> for Counter {
    type State = u32;

    fn initial_state(&self) -> Arc<u32> {
        Arc::new(0)
    }

    fn reduce(&self, state: &Arc<u32>, action: &Act, _ctx: &ReduceContext<'_>) -> Arc<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match action {
            Act::Bump => Arc::new(**state + 1),
            Act::Other => Arc::clone(state),
        }
    }
}

/// Mirrors the counter times ten, reading it from the current dispatch.
struct Follower {
    counter: StoreToken,
}

impl Store<Act> for Follower {
    type State = u32;

    fn initial_state(&self) -> Arc<u32> {
        Arc::new(0)
    }

    fn wait_for(&self, action: &Act) -> Vec<StoreToken> {
        match action {
            Act::Bump => vec![self.counter],
            Act::Other => Vec::new(),
        }
    }

    fn reduce(&self, state: &Arc<u32>, action: &Act, ctx: &ReduceContext<'_>) -> Arc<u32> {
        match action {
            Act::Bump => match ctx.settled::<u32>(self.counter) {
                Some(counter) => Arc::new(*counter * 10),
                None => Arc::clone(state),
            },
            Act::Other => Arc::clone(state),
        }
    }
}

struct Waits {
    on: StoreToken,
}

impl Store<Act> for Waits {
    type State = ();

    fn initial_state(&self) -> Arc<()> {
        Arc::new(())
    }

    fn wait_for(&self, action: &Act) -> Vec<StoreToken> {
        match action {
            Act::Bump => vec![self.on],
            Act::Other => Vec::new(),
        }
    }

    fn reduce(&self, state: &Arc<()>, _action: &Act, _ctx: &ReduceContext<'_>) -> Arc<()> {
        Arc::clone(state)
    }
}

/// Dispatches again from inside its reducer and records what happened.
struct Reentrant {
    dispatcher: Arc<OnceLock<Arc<Dispatcher<Act>>>>,
    inner: Arc<Mutex<Option<Result<DispatchOutcome, DispatchError>>>>,
}

impl Store<Act> for Reentrant {
    type State = ();

    fn initial_state(&self) -> Arc<()> {
        Arc::new(())
    }

    fn reduce(&self, state: &Arc<()>, action: &Act, _ctx: &ReduceContext<'_>) -> Arc<()> {
        if *action == Act::Bump {
            if let Some(dispatcher) = self.dispatcher.get() {
                let result = dispatcher.dispatch(&Act::Other);
                *self.inner.lock().expect("lock") = Some(result);
            }
        }
        Arc::clone(state)
    }
}

fn counter_dispatcher() -> (Dispatcher<Act>, StoreToken, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = Dispatcher::new();
    let token = dispatcher
        .register(
            "counter",
            Counter {
                calls: Arc::clone(&calls),
            },
        )
        .expect("register");
    (dispatcher, token, calls)
}

#[test]
fn ignored_action_keeps_the_same_snapshot() {
    let (dispatcher, counter, _) = counter_dispatcher();
    let before = dispatcher.state::<u32>(counter).expect("state");

    let outcome = dispatcher.dispatch(&Act::Other).expect("dispatch");

    assert!(outcome.changed.is_empty());
    let after = dispatcher.state::<u32>(counter).expect("state");
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn changed_store_is_committed_and_reported() {
    let (dispatcher, counter, calls) = counter_dispatcher();

    let outcome = dispatcher.dispatch(&Act::Bump).expect("dispatch");

    assert!(outcome.changed(counter));
    assert_eq!(*dispatcher.state::<u32>(counter).expect("state"), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn waiting_store_sees_the_settled_state() {
    let mut dispatcher = Dispatcher::new();
    // registered first, so only wait-for puts it after the counter
    let follower = dispatcher
        .register(
            "follower",
            Follower {
                counter: StoreToken("counter"),
            },
        )
        .expect("register");
    let counter = dispatcher
        .register("counter", Counter::default())
        .expect("register");

    let outcome = dispatcher.dispatch(&Act::Bump).expect("dispatch");

    assert_eq!(outcome.changed, vec![counter, follower]);
    assert_eq!(*dispatcher.state::<u32>(follower).expect("state"), 10);
}

#[test]
fn dispatch_from_inside_a_reducer_is_rejected() {
    let slot = Arc::new(OnceLock::new());
    let inner = Arc::new(Mutex::new(None));
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(
            "reentrant",
            Reentrant {
                dispatcher: Arc::clone(&slot),
                inner: Arc::clone(&inner),
            },
        )
        .expect("register");
    let dispatcher = Arc::new(dispatcher);
    assert!(slot.set(Arc::clone(&dispatcher)).is_ok());

    let err = dispatcher.dispatch(&Act::Bump).expect_err("outer dispatch");

    assert_eq!(err, DispatchError::Reentrant);
    let inner = inner.lock().expect("lock").clone();
    assert_eq!(inner, Some(Err(DispatchError::Reentrant)));
    assert!(!dispatcher.is_dispatching());
}

#[test]
fn reentrant_dispatch_commits_nothing() {
    let slot = Arc::new(OnceLock::new());
    let inner = Arc::new(Mutex::new(None));
    let (mut dispatcher, counter, _) = counter_dispatcher();
    dispatcher
        .register(
            "reentrant",
            Reentrant {
                dispatcher: Arc::clone(&slot),
                inner: Arc::clone(&inner),
            },
        )
        .expect("register");
    let dispatcher = Arc::new(dispatcher);
    assert!(slot.set(Arc::clone(&dispatcher)).is_ok());
    let sub = dispatcher.subscribe::<u32>(counter).expect("subscribe");

    assert_eq!(
        dispatcher.dispatch(&Act::Bump),
        Err(DispatchError::Reentrant)
    );
    assert_eq!(*dispatcher.state::<u32>(counter).expect("state"), 0);
    assert!(!sub.has_changed());

    // the failure does not leak into the next dispatch
    let outcome = dispatcher.dispatch(&Act::Other).expect("dispatch");
    assert!(outcome.changed.is_empty());
}

#[test]
fn cycle_is_reported_before_any_reducer_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = Dispatcher::new();
    let a = dispatcher
        .register("a", Waits { on: StoreToken("b") })
        .expect("register");
    let b = dispatcher
        .register("b", Waits { on: StoreToken("a") })
        .expect("register");
    let counter = dispatcher
        .register(
            "counter",
            Counter {
                calls: Arc::clone(&calls),
            },
        )
        .expect("register");

    let err = dispatcher.dispatch(&Act::Bump).expect_err("cycle");

    assert_eq!(err, DispatchError::CyclicWaitFor { cycle: vec![a, b] });
    assert_eq!(err.to_string(), "wait-for cycle between stores: a -> b");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(*dispatcher.state::<u32>(counter).expect("state"), 0);

    // the guard was released and other actions still go through
    dispatcher.dispatch(&Act::Other).expect("dispatch");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn waiting_for_an_unknown_store_fails() {
    let mut dispatcher = Dispatcher::new();
    let waiting = dispatcher
        .register(
            "waiting",
            Waits {
                on: StoreToken("ghost"),
            },
        )
        .expect("register");

    let err = dispatcher.dispatch(&Act::Bump).expect_err("unknown");
    assert_eq!(
        err,
        DispatchError::UnknownToken {
            token: "ghost",
            waiting
        }
    );
}

#[test]
fn registration_and_lookup_errors() {
    let (mut dispatcher, counter, _) = counter_dispatcher();

    let err = dispatcher
        .register("counter", Counter::default())
        .expect_err("duplicate");
    assert_eq!(err, DispatchError::DuplicateStore(counter));

    assert_eq!(dispatcher.token("counter"), Ok(counter));
    assert_eq!(
        dispatcher.token("missing"),
        Err(DispatchError::NoSuchStore("missing"))
    );
    assert_eq!(
        dispatcher.state::<String>(counter).map(|_| ()),
        Err(DispatchError::StateTypeMismatch { token: counter })
    );
    assert_eq!(dispatcher.tokens(), &[counter]);
}

#[test]
fn subscribers_hear_only_about_changes() {
    let (dispatcher, counter, _) = counter_dispatcher();
    let mut sub = dispatcher.subscribe::<u32>(counter).expect("subscribe");
    assert_eq!(sub.token(), counter);
    assert!(!sub.has_changed());

    dispatcher.dispatch(&Act::Other).expect("dispatch");
    assert!(!sub.has_changed());

    dispatcher.dispatch(&Act::Bump).expect("dispatch");
    assert!(sub.has_changed());
    assert_eq!(sub.current().as_deref(), Some(&1));
    assert!(!sub.has_changed());

    assert!(dispatcher.subscribe::<String>(counter).is_err());
}

#[tokio::test]
async fn subscription_wakes_on_change() {
    let (dispatcher, counter, _) = counter_dispatcher();
    let mut sub = dispatcher.subscribe::<u32>(counter).expect("subscribe");
    let waiter = tokio::spawn(async move { sub.changed().await });

    tokio::task::yield_now().await;
    dispatcher.dispatch(&Act::Bump).expect("dispatch");

    let seen = waiter.await.expect("join");
    assert_eq!(seen.as_deref(), Some(&1));
}

#[test]
fn queued_actions_drain_in_order() {
    let (dispatcher, counter, _) = counter_dispatcher();
    let (sender, mut queue) = action_queue::<Act>();

    assert!(sender.send(Act::Bump));
    assert!(sender.clone().send(Act::Other));
    assert!(sender.send(Act::Bump));

    assert_eq!(queue.drain(&dispatcher), Ok(3));
    assert_eq!(*dispatcher.state::<u32>(counter).expect("state"), 2);
    assert_eq!(queue.drain(&dispatcher), Ok(0));

    drop(queue);
    assert!(!sender.send(Act::Bump));
}

#[tokio::test]
async fn pump_dispatches_actions_sent_from_tasks() {
    let (dispatcher, counter, _) = counter_dispatcher();
    let (sender, mut queue) = action_queue::<Act>();

    tokio::spawn(async move {
        sender.send(Act::Bump);
    });

    let outcome = queue
        .pump(&dispatcher)
        .await
        .expect("queued action")
        .expect("dispatch");
    assert!(outcome.changed(counter));
    assert!(queue.pump(&dispatcher).await.is_none());
}
