//! Concurrent fan-out of independent drive requests.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

use drivekv_common::{Error, Result};

/// Run `op` for every item concurrently and collect results in completion
/// order.
///
/// Each request runs on its own task. The first failure is returned as soon
/// as it settles; the remaining tasks are detached and run to completion in
/// the background, their results discarded. With `limit` set, at most that
/// many requests are in flight at once.
pub(crate) async fn fan_out<I, F, Fut, T>(limit: Option<usize>, items: I, op: F) -> Result<Vec<T>>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let permits = limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut tasks = FuturesUnordered::new();

    for item in items {
        let request = op(item);
        let permits = permits.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = match permits {
                Some(permits) => permits.acquire_owned().await.ok(),
                None => None,
            };
            request.await
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::transport(0, format!("Request task aborted: {}", e))),
        };
        results.push(outcome?);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_collects_in_completion_order() {
        let results = fan_out(None, [30u64, 10, 20], |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        })
        .await
        .unwrap();

        assert_eq!(results, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_first_error_wins_and_siblings_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();

        let result: Result<Vec<u32>> = fan_out(None, 0..4u32, move |i| {
            let counter = counter.clone();
            async move {
                if i == 0 {
                    return Err(Error::transport(500, "Internal Server Error"));
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(500));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_limit_caps_in_flight_requests() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (in_flight.clone(), peak.clone());

        let results = fan_out(Some(2), 0..6, move |i| {
            let (current, max) = (current.clone(), max.clone());
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
