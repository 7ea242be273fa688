//! Fan-out of the link matcher across all trips.
//!
//! Trips are independent: each one is owned by the worker matching it and
//! the link table is only read. Results come back in input order, so any
//! per-index data held elsewhere (see [`crate::ProbeAuxiliary`]) stays aligned.
//!
//! A trip whose matching fails or panics is logged and left unmatched; the
//! other trips are unaffected.

use serde::{Deserialize, Serialize};

use std::panic::{self, AssertUnwindSafe};

use crate::matching::match_trip;
use crate::{LinkTable, Result, Trip, TripMatch};

#[cfg(feature = "parallel")]
use crate::ProbeMatchError;

/// Matched trips in input order, with per-status counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub trips: Vec<Trip>,
    /// Trips committed to a link
    pub matched: usize,
    /// Trips without candidates
    pub unmatchable: usize,
    /// Trips whose matching returned an error
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TripStatus {
    Matched,
    Unmatchable,
    Failed,
}

fn evaluate(trip: Trip, links: &LinkTable) -> (Trip, TripStatus) {
    evaluate_with(trip, links, match_trip)
}

/// Run `matcher` on one trip. Errors and panics both leave the trip unmatched.
fn evaluate_with<F>(mut trip: Trip, links: &LinkTable, matcher: F) -> (Trip, TripStatus)
where
    F: Fn(&Trip, &LinkTable) -> Result<Option<TripMatch>>,
{
    if !trip.has_candidates() {
        return (trip, TripStatus::Unmatchable);
    }
    let result = panic::catch_unwind(AssertUnwindSafe(|| matcher(&trip, links)));
    match result {
        Ok(Ok(Some(mapping))) => {
            trip.mapping = Some(mapping);
            (trip, TripStatus::Matched)
        }
        Ok(Ok(None)) => (trip, TripStatus::Unmatchable),
        Ok(Err(e)) => {
            log::warn!("[Matcher] Trip {} left unmatched: {}", trip.sample_id, e);
            (trip, TripStatus::Failed)
        }
        Err(_) => {
            log::error!("[Matcher] Trip {} left unmatched: matcher panicked", trip.sample_id);
            (trip, TripStatus::Failed)
        }
    }
}

fn gather(results: Vec<(Trip, TripStatus)>) -> EvaluationOutcome {
    let mut outcome = EvaluationOutcome {
        trips: Vec::with_capacity(results.len()),
        ..Default::default()
    };
    for (trip, status) in results {
        match status {
            TripStatus::Matched => outcome.matched += 1,
            TripStatus::Unmatchable => outcome.unmatchable += 1,
            TripStatus::Failed => outcome.failed += 1,
        }
        outcome.trips.push(trip);
    }
    log::info!(
        "[Matcher] {} trips: {} matched, {} unmatchable, {} failed",
        outcome.trips.len(),
        outcome.matched,
        outcome.unmatchable,
        outcome.failed
    );
    outcome
}

/// Match every trip sequentially.
pub fn match_trips(trips: Vec<Trip>, links: &LinkTable) -> EvaluationOutcome {
    let results = trips
        .into_iter()
        .map(|trip| evaluate(trip, links))
        .collect();
    gather(results)
}

/// Number of workers used when none is configured.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Match every trip on a fixed-size worker pool.
///
/// `workers` defaults to the available parallelism. The pool lives for the
/// duration of this call only.
#[cfg(feature = "parallel")]
pub fn match_trips_parallel(
    trips: Vec<Trip>,
    links: &LinkTable,
    workers: Option<usize>,
) -> Result<EvaluationOutcome> {
    use rayon::prelude::*;

    let num_threads = workers.unwrap_or_else(default_worker_count);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("probe-match-{}", i))
        .build()
        .map_err(|e| ProbeMatchError::ConfigError {
            message: format!("failed to build worker pool: {}", e),
        })?;

    log::info!(
        "[Matcher] Matching {} trips on {} workers",
        trips.len(),
        num_threads
    );

    // Indexed collect keeps input order regardless of completion order
    let results: Vec<(Trip, TripStatus)> = pool.install(|| {
        trips
            .into_par_iter()
            .map(|trip| evaluate(trip, links))
            .collect()
    });

    Ok(gather(results))
}
