use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};

/// Runs a batch of deferred tasks with at most `limit` in flight at once.
/// Up to `limit` slots are filled eagerly and every settled task immediately
/// hands its slot to the next unstarted one. Results come back positionally,
/// one per task in submission order.
///
/// The batch itself never fails: a fallible task makes its output a `Result`
/// and the caller reads the failure out of that slot.
pub async fn run_limited<T, F, Fut>(tasks: Vec<F>, limit: usize) -> Vec<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let limit = limit.max(1);
    let total = tasks.len();
    let mut results: Vec<Option<T>> = Vec::with_capacity(total);
    results.resize_with(total, || None);

    let mut queue = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let start = |index: usize, task: F| async move { (index, task().await) };

    for (index, task) in queue.by_ref().take(limit) {
        in_flight.push(start(index, task));
    }

    while let Some((index, output)) = in_flight.next().await {
        results[index] = Some(output);
        if let Some((index, task)) = queue.next() {
            in_flight.push(start(index, task));
        }
    }

    results
        .into_iter()
        .map(|slot| slot.expect("every task settles exactly once"))
        .collect()
}
