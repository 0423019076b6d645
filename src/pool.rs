/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A bounded pool of scoped worker threads for the per-node stages of a run.
//!
//! Units of work are independent of each other. They are claimed in order from a shared counter, so at
//! most `workers` of them run at any one time. Once a unit fails, workers stop claiming new units; units
//! already running are allowed to finish.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

/// Apply `task` to every item of `items` on at most `workers` threads and collect the outputs in the order of
/// `items`. If any task fails, the first failure (in the order of `items`) is returned.
pub(crate) fn run_bounded<T, O, E, F>(workers: usize, items: &[T], task: F) -> Result<Vec<O>, E>
where
    T: Sync,
    O: Send,
    E: Send,
    F: Fn(&T) -> Result<O, E> + Sync,
{
    let workers = workers.clamp(1, items.len().max(1));
    if workers == 1 {
        return items.iter().map(&task).collect();
    }

    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let results: Mutex<Vec<Option<Result<O, E>>>> =
        Mutex::new((0..items.len()).map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if failed.load(Ordering::Acquire) {
                    return;
                }
                let i = next.fetch_add(1, Ordering::AcqRel);
                let Some(item) = items.get(i) else {
                    return;
                };
                let result = task(item);
                if result.is_err() {
                    failed.store(true, Ordering::Release);
                }
                // A poisoned lock means another worker panicked; the scope re-raises that panic.
                if let Ok(mut results) = results.lock() {
                    results[i] = Some(result);
                }
            });
        }
    });

    let results = results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut outputs = Vec::with_capacity(items.len());
    let mut first_err = None;
    for result in results {
        match result {
            Some(Ok(output)) => outputs.push(output),
            Some(Err(err)) => {
                first_err.get_or_insert(err);
            }
            // Never claimed because an earlier unit failed.
            None => (),
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}
