use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagepipe::error::Error;
use stagepipe::prelude::*;
use stagepipe::source::from_iter;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stagepipe=debug")),
        )
        .init();

    let cancel = CancelToken::new();
    let input = from_iter(0u64.., 16, &cancel);

    // Every fifth call reports a transient failure that succeeds on retry.
    let calls = Arc::new(AtomicU64::new(0));

    let pipeline = map("square", |x: u64| x * x)
        .filter("skip_thirds", |x: &u64| x % 3 != 0)
        .try_map("check", move |x: u64| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::Relaxed) % 5 == 4 {
                    Err(Error::pipeline("busy"))
                } else if x > 1_000_000 {
                    Err(Error::pipeline("too large"))
                } else {
                    Ok(x)
                }
            }
        })
        .with_retry(
            RetryPolicy::new(3)
                .backoff(Backoff::Fixed(Duration::from_millis(5)))
                .retry_if(|err| matches!(err, Error::Pipeline { context: "busy" })),
        );

    let mut out = Executor::new()
        .buffer(8)
        .concurrency_stage("check", 4)
        .run(&cancel, input, pipeline);

    let mut read = 0usize;
    while let Some(item) = out.recv().await {
        match item {
            Ok(value) => {
                read += 1;
                if read == 10 {
                    println!("read {read} items, last = {value}; cancelling");
                    cancel.cancel();
                }
            }
            Err(err) => {
                println!("stage failed: {err}");
                break;
            }
        }
    }

    println!("output closed after {read} items");
}
