//! Slope accuracy against surveyed link slopes.
//!
//! Every fix of every matched trip counts towards the total. A fix is
//! compared only when its link has an average slope; the squared difference
//! between the link's average slope and the fix's derived slope is added to
//! the running sum.
//!
//! The RMSE denominator is a policy ([`RmseDenominator`]): the number of
//! compared fixes, or every fix considered. The second reproduces figures
//! produced by earlier tooling, which divided by all fixes.

use serde::{Deserialize, Serialize};

use crate::{LinkTable, RmseDenominator, Trip};

/// Running totals for the slope RMSE.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccuracyAggregator {
    sum_of_squares: f64,
    compared: u64,
    total: u64,
}

/// Final accuracy figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub sum_of_squares: f64,
    /// Fixes with a link average slope
    pub compared_fixes: u64,
    /// All fixes of matched trips
    pub total_fixes: u64,
    pub denominator: RmseDenominator,
    /// `None` when the chosen denominator is zero
    pub rmse: Option<f64>,
}

impl AccuracyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fix: its derived slope and the link's average slope, if any.
    pub fn record(&mut self, derived_slope: f64, link_slope: Option<f64>) {
        self.total += 1;
        if let Some(reference) = link_slope {
            let diff = reference - derived_slope;
            self.sum_of_squares += diff * diff;
            self.compared += 1;
        }
    }

    /// Record every fix of a matched trip. Unmatched trips are ignored.
    pub fn add_trip(&mut self, trip: &Trip, links: &LinkTable) {
        let Some(mapping) = &trip.mapping else {
            return;
        };
        let link_slope = links
            .get(&mapping.link_id)
            .and_then(|link| link.average_slope());
        for &slope in &mapping.slopes {
            self.record(slope, link_slope);
        }
    }

    /// Fold another aggregator's totals into this one.
    pub fn merge(&mut self, other: &AccuracyAggregator) {
        self.sum_of_squares += other.sum_of_squares;
        self.compared += other.compared;
        self.total += other.total;
    }

    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    pub fn compared(&self) -> u64 {
        self.compared
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn report(&self, denominator: RmseDenominator) -> AccuracyReport {
        let count = match denominator {
            RmseDenominator::ComparedFixes => self.compared,
            RmseDenominator::AllFixes => self.total,
        };
        let rmse = (count > 0).then(|| (self.sum_of_squares / count as f64).sqrt());
        AccuracyReport {
            sum_of_squares: self.sum_of_squares,
            compared_fixes: self.compared,
            total_fixes: self.total,
            denominator,
            rmse,
        }
    }
}

/// Aggregate slope accuracy over all matched trips.
pub fn aggregate<'a>(trips: impl IntoIterator<Item = &'a Trip>, links: &LinkTable) -> AccuracyAggregator {
    let mut aggregator = AccuracyAggregator::new();
    for trip in trips {
        aggregator.add_trip(trip, links);
    }
    aggregator
}
