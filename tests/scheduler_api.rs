use keel::prelude::*;
use keel::{AggregateError, ManualClock, TaskResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn millis(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn wake_times_follow_the_yielded_delay() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let clock = ManualClock::new();
    let mut scheduler = Scheduler::with_clock(clock.clone());
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);

    scheduler.start_keyed(
        "pulse",
        move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Step::Sleep(millis(500)))
        },
        false,
    );

    scheduler.update().unwrap(); // t = 0
    assert_eq!(1, count.load(Ordering::SeqCst));

    clock.advance(millis(100)); // t = 100ms: before the wake time
    scheduler.update().unwrap();
    assert_eq!(1, count.load(Ordering::SeqCst));

    clock.advance(millis(500)); // t = 600ms: past it
    scheduler.update().unwrap();
    assert_eq!(2, count.load(Ordering::SeqCst));
}

#[test]
fn a_task_may_stop_itself() {
    let mut scheduler = Scheduler::new();
    let handle = scheduler.handle();

    scheduler.start_keyed(
        "k",
        move || {
            handle.stop("k");
            Ok(Step::Done)
        },
        false,
    );

    scheduler.update().unwrap();
    scheduler.update().unwrap();
    assert_eq!(0, scheduler.len());
}

#[test]
fn mid_tick_starts_and_stops_take_effect_next_tick() {
    let mut scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);

    scheduler.start_keyed(
        "outer",
        move || {
            let inner_ran = Arc::clone(&r);
            handle.start_keyed(
                "inner",
                move || {
                    inner_ran.fetch_add(1, Ordering::SeqCst);
                    Ok(Step::Done)
                },
                false,
            );
            Ok(Step::Done)
        },
        false,
    );

    scheduler.update().unwrap();
    assert_eq!(0, ran.load(Ordering::SeqCst)); // deferred past this tick
    scheduler.update().unwrap();
    assert_eq!(1, ran.load(Ordering::SeqCst));
}

#[test]
fn all_failures_in_a_tick_surface_as_one_aggregate() {
    let mut scheduler = Scheduler::new();
    let survivors = Arc::new(AtomicUsize::new(0));

    for i in 0..3 {
        scheduler.start_keyed(
            format!("bad{}", i),
            move || -> TaskResult { Err(format!("failure {}", i).into()) },
            false,
        );
    }
    let s = Arc::clone(&survivors);
    scheduler.start_keyed(
        "good",
        move || {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(Step::Yield)
        },
        false,
    );

    let error: AggregateError = scheduler.update().unwrap_err();
    assert_eq!(3, error.0.len());
    assert_eq!(1, survivors.load(Ordering::SeqCst));

    // the accumulator was drained with the throw
    scheduler.update().unwrap();
}

#[test]
fn parallel_tasks_complete_on_worker_threads() {
    let mut scheduler = Scheduler::new();
    let (sender, receiver) = crossbeam_channel::unbounded();

    for i in 0..8 {
        let sender = sender.clone();
        scheduler.start_parallel(move || {
            sender.send(i).unwrap();
            Ok(Step::Done)
        });
    }

    let mut guard = 0;
    while !scheduler.is_empty() {
        scheduler.update().unwrap();
        std::thread::sleep(millis(1));
        guard += 1;
        assert!(guard < 10_000, "parallel tasks never drained");
    }

    let mut seen: Vec<i32> = receiver.try_iter().collect();
    seen.sort_unstable();
    assert_eq!((0..8).collect::<Vec<_>>(), seen);
}

#[test]
fn stopping_a_parallel_task_lets_it_finish() {
    let mut scheduler = Scheduler::new();
    let finished = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&finished);

    scheduler.start_keyed(
        "worker",
        move || {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(Step::Done)
        },
        true,
    );
    scheduler.update().unwrap(); // spawns the worker
    scheduler.stop("worker"); // a request, not a preemption

    // the body always runs to completion
    let mut guard = 0;
    while finished.load(Ordering::SeqCst) == 0 {
        std::thread::sleep(millis(1));
        guard += 1;
        assert!(guard < 10_000, "worker never finished");
    }

    let mut guard = 0;
    while !scheduler.is_empty() {
        scheduler.update().unwrap();
        std::thread::sleep(millis(1));
        guard += 1;
        assert!(guard < 10_000);
    }
    assert_eq!(1, finished.load(Ordering::SeqCst));
}

#[test]
fn starts_land_from_other_threads() {
    let mut scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let count = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            let count = Arc::clone(&count);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    let c = Arc::clone(&count);
                    handle.start(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(Step::Done)
                    });
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(40, scheduler.len());
    scheduler.update().unwrap();
    assert_eq!(40, count.load(Ordering::SeqCst));
}

#[test]
fn event_channel_defers_delivery_to_the_pump() {
    let mut events: EventChannel<&'static str> = EventChannel::new();
    let publisher = events.publisher();
    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    events.subscribe(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    let worker = std::thread::spawn(move || {
        for _ in 0..16 {
            publisher.publish("key-pressed");
        }
    });
    worker.join().unwrap();

    assert_eq!(0, seen.load(Ordering::SeqCst));
    assert_eq!(16, events.pump());
    assert_eq!(16, seen.load(Ordering::SeqCst));
}
