use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagepipe::error::Error;
use stagepipe::prelude::*;
use tokio::sync::Notify;

mod common;
use common::{collect, seq};

#[tokio::test]
async fn retries_succeed_after_n_failures() {
    let cancel = CancelToken::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_op = attempts.clone();

    let retry = RetryPolicy::new(4)
        .backoff(Backoff::Fixed(Duration::from_millis(1)))
        .retry_if(|err| format!("{err}").contains("transient"));

    let stage = try_map("double", move |value: u32| {
        let attempts = attempts_in_op.clone();
        async move {
            let current = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if current <= 2 {
                Err(Error::pipeline("transient"))
            } else {
                Ok(value * 2)
            }
        }
    })
    .with_retry(retry);

    let out = Executor::new().run(&cancel, seq(vec![5u32]), stage);
    let items = collect(out).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(items.len(), 1);
    assert_eq!(*items[0].as_ref().unwrap(), 10);
}

#[tokio::test]
async fn retries_stop_after_max_attempts_and_close_stage() {
    let cancel = CancelToken::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_op = attempts.clone();

    let retry = RetryPolicy::new(3)
        .backoff(Backoff::Fixed(Duration::from_millis(1)))
        .retry_if(|_| true);

    let stage = try_map("always_fail", move |_: u32| {
        let attempts = attempts_in_op.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<u32, Error>(Error::pipeline("transient"))
        }
    })
    .with_retry(retry);

    let out = Executor::new().run(&cancel, seq(vec![1u32, 2, 3]), stage);
    let items = collect(out).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3, "only the first item is tried");
    assert_eq!(items.len(), 1);
    assert!(matches!(
        items[0],
        Err(Error::RetryExhausted {
            stage: "always_fail",
            attempts: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn default_policy_does_not_retry() {
    let cancel = CancelToken::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_op = attempts.clone();

    let stage = try_map("once", move |_: u32| {
        let attempts = attempts_in_op.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<u32, Error>(Error::pipeline("boom"))
        }
    })
    .with_retry(RetryPolicy::new(5));

    let out = Executor::new().run(&cancel, seq(vec![1u32]), stage);
    let items = collect(out).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    let err = items[0].as_ref().unwrap_err();
    assert!(format!("{err}").contains("boom"));
}

#[tokio::test]
async fn on_error_skip_drops_failing_items() {
    let cancel = CancelToken::new();

    let stage = try_map("odd_only", |x: u32| async move {
        if x % 2 == 0 {
            Err(Error::pipeline("even"))
        } else {
            Ok(x)
        }
    })
    .on_error(|_| ErrorAction::Skip);

    let out = Executor::new().run(&cancel, seq(vec![1u32, 2, 3, 4, 5]), stage);
    let items: Vec<u32> = collect(out).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(items, vec![1, 3, 5]);
}

#[tokio::test]
async fn on_error_chooses_per_error() {
    let cancel = CancelToken::new();
    let busy_calls = Arc::new(AtomicUsize::new(0));
    let busy_in_op = busy_calls.clone();

    let stage = try_map("strict", move |x: u32| {
        let busy = busy_in_op.clone();
        async move {
            match x {
                1 if busy.fetch_add(1, Ordering::SeqCst) == 0 => Err(Error::pipeline("busy")),
                2 => Err(Error::pipeline("bad input")),
                3 => Err(Error::pipeline("fatal")),
                _ => Ok(x),
            }
        }
    })
    .with_retry(RetryPolicy::new(3).backoff(Backoff::Immediate))
    .on_error(|err| match err {
        Error::Pipeline { context: "busy" } => ErrorAction::Retry,
        Error::Pipeline { context: "bad input" } => ErrorAction::Skip,
        _ => ErrorAction::Fail,
    });

    let out = Executor::new().run(&cancel, seq(vec![1u32, 2, 3, 4]), stage);
    let items = collect(out).await;

    assert_eq!(busy_calls.load(Ordering::SeqCst), 2);
    assert_eq!(items.len(), 2, "2 is skipped, 3 fails and closes the stage");
    assert_eq!(*items[0].as_ref().unwrap(), 1);
    let err = items[1].as_ref().unwrap_err();
    assert!(matches!(err, Error::Stage { stage: "strict", .. }));
    assert!(format!("{err}").contains("fatal"));
}

#[tokio::test]
async fn on_error_fail_wraps_the_original_error() {
    let cancel = CancelToken::new();

    let stage = try_map("strict", |_: u32| async move {
        Err::<u32, Error>(Error::pipeline("raw"))
    })
    .on_error(|err| {
        assert!(format!("{err}").contains("raw"));
        ErrorAction::Fail
    });

    let out = Executor::new().run(&cancel, seq(vec![1u32, 2]), stage);
    let items = collect(out).await;

    assert_eq!(items.len(), 1);
    let err = items[0].as_ref().unwrap_err();
    assert!(matches!(err, Error::Stage { stage: "strict", .. }));
    assert!(format!("{err}").contains("raw"));
}

#[tokio::test]
async fn chained_try_map_accepts_retry_policy() {
    let cancel = CancelToken::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_op = attempts.clone();

    let pipeline = map("inc", |x: u32| x + 1)
        .try_map("flaky", move |x: u32| {
            let attempts = attempts_in_op.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::pipeline("transient"))
                } else {
                    Ok(x)
                }
            }
        })
        .with_retry(
            RetryPolicy::new(2)
                .backoff(Backoff::Immediate)
                .retry_if(|_| true),
        );

    let out = Executor::new().run(&cancel, seq(vec![1u32, 2]), pipeline);
    let items: Vec<u32> = collect(out).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(items, vec![2, 3]);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_without_advancing_time() {
    let cancel = CancelToken::new();
    let entered = Arc::new(Notify::new());
    let entered_in_op = entered.clone();

    let retry = RetryPolicy::new(10)
        .backoff(Backoff::Fixed(Duration::from_secs(60)))
        .retry_if(|_| true);

    let stage = try_map("cancel_backoff", move |_: u32| {
        let entered = entered_in_op.clone();
        async move {
            entered.notify_one();
            Err::<u32, Error>(Error::pipeline("transient"))
        }
    })
    .with_retry(retry);

    let mut out = Executor::new().run(&cancel, seq(vec![1u32]), stage);
    entered.notified().await;
    cancel.cancel();

    let mut closed = false;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::ZERO, out.recv()).await {
            Ok(None) => {
                closed = true;
                break;
            }
            Ok(Some(item)) => panic!("unexpected item {item:?}"),
            Err(_) => tokio::task::yield_now().await,
        }
    }
    assert!(closed, "stage did not stop after cancellation");
}

#[tokio::test(start_paused = true)]
async fn backoff_waits_for_the_clock() {
    let cancel = CancelToken::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_op = attempts.clone();

    let retry = RetryPolicy::new(2)
        .backoff(Backoff::Exponential {
            base: Duration::from_secs(5),
            max: Duration::from_secs(60),
        })
        .retry_if(|_| true);

    let stage = try_map("slow_retry", move |x: u32| {
        let attempts = attempts_in_op.clone();
        async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::pipeline("transient"))
            } else {
                Ok(x)
            }
        }
    })
    .with_retry(retry);

    let start = tokio::time::Instant::now();
    let mut out = Executor::new().run(&cancel, seq(vec![9u32]), stage);

    // The paused clock only moves forward once every task is idle, so the
    // item can't arrive before the backoff has fully elapsed.
    let item = out.recv().await.unwrap();
    assert_eq!(*item.as_ref().unwrap(), 9);
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn exponential_backoff_doubles_and_caps() {
    let backoff = Backoff::Exponential {
        base: Duration::from_millis(10),
        max: Duration::from_millis(35),
    };

    assert_eq!(backoff.delay(1), Duration::from_millis(10));
    assert_eq!(backoff.delay(2), Duration::from_millis(20));
    assert_eq!(backoff.delay(3), Duration::from_millis(35));
    assert_eq!(backoff.delay(64), Duration::from_millis(35));
}

#[test]
fn fixed_and_immediate_backoff_ignore_the_retry_count() {
    let fixed = Backoff::Fixed(Duration::from_millis(7));
    assert_eq!(fixed.delay(1), Duration::from_millis(7));
    assert_eq!(fixed.delay(9), Duration::from_millis(7));
    assert_eq!(Backoff::Immediate.delay(3), Duration::ZERO);
}

#[test]
fn zero_max_attempts_is_clamped() {
    assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    assert_eq!(RetryPolicy::default().max_attempts(), 1);
}
