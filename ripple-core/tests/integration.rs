//! Integration Tests for Reactive System
//!
//! These tests verify that observables, computeds, reactions and actions work
//! together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripple_core::{
    autorun, autorun_named, bind_action, run_in_action, runtime_is_idle, untracked, Computed,
    GraphSnapshot, NodeKind, NodeState, Observable, ReactiveError, Result,
};

/// A shared call counter.
fn calls() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

/// Test that a reaction re-runs on change and ignores equal writes.
#[test]
fn reaction_reruns_once_per_change() {
    let title = Observable::named("title", String::new());
    let observer_calls = calls();

    let t = title.clone();
    let counter = observer_calls.clone();
    let disposer = autorun(move || {
        bump(&counter);
        t.get();
        Ok(())
    })
    .unwrap();

    // The reaction runs immediately to learn what it reads.
    assert_eq!(observer_calls.get(), 1);

    title.set("yeah".into()).unwrap();
    assert_eq!(observer_calls.get(), 2);

    // Same value: no re-run.
    title.set("yeah".into()).unwrap();
    assert_eq!(observer_calls.get(), 2);

    disposer.dispose();
    assert!(runtime_is_idle());
}

/// Test that a computed is lazy, memoized and recomputes on change.
#[test]
fn computed_area_is_memoized() {
    let width = Observable::named("width", 0);
    let compute_calls = calls();

    let w = width.clone();
    let counter = compute_calls.clone();
    let area = Computed::named("area", move || {
        bump(&counter);
        Ok(w.get() * w.get())
    });

    run_in_action(|| width.set(2)).unwrap();
    assert_eq!(area.get().unwrap(), 4);
    assert_eq!(compute_calls.get(), 1);

    run_in_action(|| width.set(2)).unwrap();
    assert_eq!(area.get().unwrap(), 4);
    assert_eq!(compute_calls.get(), 1);

    run_in_action(|| width.set(3)).unwrap();
    assert_eq!(area.get().unwrap(), 9);
    assert_eq!(compute_calls.get(), 2);
}

/// Test that a reaction over a computed only re-runs on real changes.
#[test]
fn reaction_over_computed() {
    let width = Observable::new(0);
    let reaction_calls = calls();

    let w = width.clone();
    let area = Computed::new(move || Ok(w.get() * w.get()));

    let a = area.clone();
    let counter = reaction_calls.clone();
    let disposer = autorun(move || {
        bump(&counter);
        a.get()?;
        Ok(())
    })
    .unwrap();
    assert_eq!(reaction_calls.get(), 1);

    width.set(2).unwrap();
    assert_eq!(reaction_calls.get(), 2);

    width.set(2).unwrap();
    assert_eq!(reaction_calls.get(), 2);

    // The area does not change, so the reaction is left alone.
    width.set(-2).unwrap();
    assert_eq!(reaction_calls.get(), 2);
    assert_eq!(area.get().unwrap(), 4);

    disposer.dispose();
}

/// Test reaction disposal stops execution.
#[test]
fn disposed_reaction_does_not_run() {
    let title = Observable::new("");
    let observer_calls = calls();

    let t = title.clone();
    let counter = observer_calls.clone();
    let disposer = autorun(move || {
        bump(&counter);
        t.get();
        Ok(())
    })
    .unwrap();

    title.set("yeah").unwrap();
    assert_eq!(observer_calls.get(), 2);

    disposer.dispose();
    title.set("great").unwrap();
    assert_eq!(observer_calls.get(), 2);

    disposer.dispose();
    assert_eq!(title.observer_count(), 0);
}

struct Order {
    cancellations: Observable<u32>,
}

impl Order {
    fn cancel(&self, _: ()) -> Result<()> {
        self.cancellations.update(|n| n + 1)
    }
}

/// Test that a bound action keeps its receiver and its transaction.
#[test]
fn bound_action_keeps_its_owner() {
    let order = Rc::new(Order {
        cancellations: Observable::new(0),
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    let cancellations = order.cancellations.clone();
    let log = seen.clone();
    let disposer = autorun(move || {
        log.borrow_mut().push(cancellations.get());
        Ok(())
    })
    .unwrap();

    let cancel = bind_action(&order, Order::cancel);
    drop(order);

    cancel(()).unwrap();
    cancel(()).unwrap();
    assert_eq!(*seen.borrow(), vec![0, 1, 2]);

    disposer.dispose();
}

/// Test that N writes inside an action cause one re-run.
#[test]
fn action_batches_writes() {
    let first = Observable::new("Ada");
    let last = Observable::new("Lovelace");
    let names = Rc::new(RefCell::new(Vec::new()));

    let (f, l, log) = (first.clone(), last.clone(), names.clone());
    let disposer = autorun(move || {
        log.borrow_mut().push(format!("{} {}", f.get(), l.get()));
        Ok(())
    })
    .unwrap();

    run_in_action(|| {
        first.set("Grace")?;
        last.set("Hopper")?;
        first.set("Grace")?;
        run_in_action(|| last.set("Murray Hopper"))
    })
    .unwrap();

    assert_eq!(
        *names.borrow(),
        vec!["Ada Lovelace".to_string(), "Grace Murray Hopper".to_string()]
    );
    disposer.dispose();
}

/// Test that nested actions flush only at the outermost exit.
#[test]
fn nested_actions_flush_once() {
    let count = Observable::new(0);
    let runs = calls();

    let c = count.clone();
    let counter = runs.clone();
    let disposer = autorun(move || {
        bump(&counter);
        c.get();
        Ok(())
    })
    .unwrap();

    run_in_action(|| {
        count.set(1)?;
        run_in_action(|| count.set(2))?;
        assert_eq!(runs.get(), 1, "inner action must not flush");
        count.set(3)
    })
    .unwrap();

    assert_eq!(runs.get(), 2);
    disposer.dispose();
}

/// Test that dependencies follow conditional reads.
#[test]
fn conditional_dependencies_are_rediscovered() {
    let show_detail = Observable::new(true);
    let detail = Observable::new("first");
    let runs = calls();

    let (s, d, counter) = (show_detail.clone(), detail.clone(), runs.clone());
    let disposer = autorun(move || {
        bump(&counter);
        if s.get() {
            d.get();
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(disposer.dependency_count(), 2);

    detail.set("second").unwrap();
    assert_eq!(runs.get(), 2);

    show_detail.set(false).unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(detail.observer_count(), 0);

    detail.set("third").unwrap();
    assert_eq!(runs.get(), 3, "detail is no longer read");

    show_detail.set(true).unwrap();
    assert_eq!(runs.get(), 4);

    detail.set("fourth").unwrap();
    assert_eq!(runs.get(), 5);

    disposer.dispose();
}

/// Test that reactions run in the order they were first invalidated.
#[test]
fn reactions_run_in_first_invalidated_order() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let (rb, log) = (b.clone(), order.clone());
    let reads_b = autorun(move || {
        rb.get();
        log.borrow_mut().push("reads b");
        Ok(())
    })
    .unwrap();

    let (ra, log) = (a.clone(), order.clone());
    let reads_a = autorun(move || {
        ra.get();
        log.borrow_mut().push("reads a");
        Ok(())
    })
    .unwrap();

    order.borrow_mut().clear();
    run_in_action(|| {
        a.set(1)?;
        b.set(1)?;
        a.set(2)
    })
    .unwrap();

    assert_eq!(*order.borrow(), vec!["reads a", "reads b"]);
    reads_a.dispose();
    reads_b.dispose();
}

/// Test that reactions behind computeds keep the order they subscribed in.
#[test]
fn reactions_behind_computeds_run_in_subscription_order() {
    let base = Observable::new(1);
    let order = Rc::new(RefCell::new(Vec::new()));

    let b = base.clone();
    let doubled = Computed::new(move || Ok(b.get() * 2));
    let b = base.clone();
    let tripled = Computed::new(move || Ok(b.get() * 3));

    let (d, log) = (doubled.clone(), order.clone());
    let first = autorun(move || {
        d.get()?;
        log.borrow_mut().push("doubled");
        Ok(())
    })
    .unwrap();

    let (t, log) = (tripled.clone(), order.clone());
    let second = autorun(move || {
        t.get()?;
        log.borrow_mut().push("tripled");
        Ok(())
    })
    .unwrap();

    order.borrow_mut().clear();
    base.set(5).unwrap();
    assert_eq!(*order.borrow(), vec!["doubled", "tripled"]);

    first.dispose();
    second.dispose();
}

/// Test that a reaction behind a computed is not overtaken by a later
/// direct reader of the same observable.
#[test]
fn computed_path_keeps_its_place_before_direct_readers() {
    let base = Observable::new(1);
    let order = Rc::new(RefCell::new(Vec::new()));

    let b = base.clone();
    let doubled = Computed::new(move || Ok(b.get() * 2));

    let (d, log) = (doubled.clone(), order.clone());
    let through_computed = autorun(move || {
        d.get()?;
        log.borrow_mut().push("through computed");
        Ok(())
    })
    .unwrap();

    let (b, log) = (base.clone(), order.clone());
    let direct = autorun(move || {
        b.get();
        log.borrow_mut().push("direct");
        Ok(())
    })
    .unwrap();

    order.borrow_mut().clear();
    base.set(2).unwrap();
    assert_eq!(*order.borrow(), vec!["through computed", "direct"]);

    through_computed.dispose();
    direct.dispose();
}

/// Test that a reaction reachable through several paths runs once.
#[test]
fn diamond_runs_reaction_once() {
    let base = Observable::new(1);
    let runs = calls();

    let b = base.clone();
    let doubled = Computed::new(move || Ok(b.get() * 2));
    let b = base.clone();
    let tripled = Computed::new(move || Ok(b.get() * 3));

    let (d, t, b, counter) = (doubled.clone(), tripled.clone(), base.clone(), runs.clone());
    let disposer = autorun(move || {
        bump(&counter);
        let _ = d.get()? + t.get()? + b.get();
        Ok(())
    })
    .unwrap();

    base.set(2).unwrap();
    assert_eq!(runs.get(), 2);
    disposer.dispose();
}

/// Test that computeds can depend on other computeds.
#[test]
fn computed_depends_on_computed() {
    let base = Observable::new(5);

    let b = base.clone();
    let doubled = Computed::new(move || Ok(b.get() * 2));

    let d = doubled.clone();
    let plus_ten = Computed::new(move || Ok(d.get()? + 10));

    assert_eq!(doubled.get().unwrap(), 10);
    assert_eq!(plus_ten.get().unwrap(), 20);

    base.set(10).unwrap();
    assert_eq!(plus_ten.get().unwrap(), 30);
    assert_eq!(doubled.get().unwrap(), 20);
    assert_eq!(plus_ten.dependency_count(), 1);
}

/// Test that mutually recursive computeds are reported, not looped.
#[test]
fn mutual_cycle_is_an_error() {
    let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

    let s = slot.clone();
    let ping = Computed::named("ping", move || {
        let pong = s.borrow().clone().expect("pong installed");
        pong.get()
    });
    let p = ping.clone();
    let pong = Computed::named("pong", move || p.get());
    *slot.borrow_mut() = Some(pong.clone());

    match ping.get() {
        Err(ReactiveError::CyclicComputation { computed }) => assert_eq!(computed, "ping"),
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(runtime_is_idle());

    slot.borrow_mut().take();
}

/// Test that writes made by a reaction cascade within the same flush.
#[test]
fn reaction_writes_cascade() {
    let celsius = Observable::new(0.0_f64);
    let fahrenheit = Observable::new(32.0_f64);
    let printed = Rc::new(RefCell::new(Vec::new()));

    let (c, f) = (celsius.clone(), fahrenheit.clone());
    let convert = autorun(move || f.set(c.get() * 9.0 / 5.0 + 32.0)).unwrap();

    let (f, log) = (fahrenheit.clone(), printed.clone());
    let print = autorun(move || {
        log.borrow_mut().push(f.get());
        Ok(())
    })
    .unwrap();

    celsius.set(100.0).unwrap();
    assert_eq!(*printed.borrow(), vec![32.0, 212.0]);

    convert.dispose();
    print.dispose();
}

/// Test that a failing reaction surfaces from the write that triggered it,
/// while reactions before it stay committed and later ones stay queued.
#[test]
fn failing_reaction_leaves_partial_flush() {
    let value = Observable::new(0);
    let (before, after) = (calls(), calls());

    let (v, counter) = (value.clone(), before.clone());
    let first = autorun(move || {
        v.get();
        bump(&counter);
        Ok(())
    })
    .unwrap();

    let v = value.clone();
    let failing = autorun_named("validator", move || {
        if v.get() > 0 {
            return Err(ReactiveError::reaction("validator", "value must stay at zero"));
        }
        Ok(())
    })
    .unwrap();

    let (v, counter) = (value.clone(), after.clone());
    let last = autorun(move || {
        v.get();
        bump(&counter);
        Ok(())
    })
    .unwrap();

    let err = value.set(1).unwrap_err();
    assert!(matches!(err, ReactiveError::Reaction { ref reaction, .. } if reaction == "validator"));
    assert_eq!(value.get(), 1, "the write itself is kept");
    assert_eq!(before.get(), 2);
    assert_eq!(after.get(), 1);
    assert!(!runtime_is_idle());

    // The next flush picks up the reaction that was still queued.
    run_in_action(|| Ok(())).unwrap();
    assert_eq!(after.get(), 2);
    assert!(runtime_is_idle());

    first.dispose();
    failing.dispose();
    last.dispose();
}

/// Test that a reaction invalidating itself forever is stopped.
#[test]
fn runaway_reaction_is_stopped() {
    let counter = Observable::new(0);

    let c = counter.clone();
    let disposer = autorun(move || {
        let n = c.get();
        c.set(n + 1)
    })
    .unwrap();

    let err = counter.set(10).unwrap_err();
    assert!(matches!(err, ReactiveError::ReactionLoop { iterations: 100 }));
    assert!(runtime_is_idle());

    disposer.dispose();
}

/// Test that untracked reads do not subscribe.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = Observable::new(0);
    let ignored = Observable::new(0);
    let runs = calls();

    let (t, i, counter) = (tracked.clone(), ignored.clone(), runs.clone());
    let disposer = autorun(move || {
        bump(&counter);
        t.get();
        untracked(|| i.get());
        Ok(())
    })
    .unwrap();

    ignored.set(1).unwrap();
    assert_eq!(runs.get(), 1);
    tracked.set(1).unwrap();
    assert_eq!(runs.get(), 2);
    disposer.dispose();
}

/// Test that the graph snapshot reflects live edges.
#[test]
fn snapshot_reflects_the_graph() {
    let width = Observable::named("width", 2);
    let w = width.clone();
    let area = Computed::named("area", move || Ok(w.get() * w.get()));

    let a = area.clone();
    let disposer = autorun_named("render", move || {
        a.get()?;
        Ok(())
    })
    .unwrap();

    let snapshot = GraphSnapshot::capture();
    let render = snapshot.node(disposer.id()).unwrap();
    assert_eq!(render.kind, NodeKind::Reaction);
    assert_eq!(render.state, NodeState::Clean);
    assert_eq!(snapshot.dependency_names(disposer.id()), vec!["area"]);
    assert_eq!(snapshot.dependency_names(area.id()), vec!["width"]);
    assert!(snapshot.to_json().unwrap().contains("\"render\""));

    disposer.dispose();
    let snapshot = GraphSnapshot::capture();
    assert!(snapshot.node(disposer.id()).is_none());
    assert!(snapshot.node(area.id()).unwrap().observers.is_empty());
}

/// Test that a reaction behind a failing computed recovers once it succeeds.
#[test]
fn reaction_recovers_after_computed_failure() {
    let divisor = Observable::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let d = divisor.clone();
    let quotient = Computed::new(move || match d.get() {
        0 => Err(ReactiveError::reaction("quotient", "division by zero")),
        n => Ok(100 / n),
    });

    let (q, log) = (quotient.clone(), seen.clone());
    let disposer = autorun(move || {
        let text = match q.get() {
            Ok(value) => value.to_string(),
            Err(_) => "undefined".to_string(),
        };
        log.borrow_mut().push(text);
        Ok(())
    })
    .unwrap();

    divisor.set(4).unwrap();
    divisor.set(0).unwrap();
    assert_eq!(*seen.borrow(), vec!["undefined", "25", "undefined"]);

    disposer.dispose();
}
