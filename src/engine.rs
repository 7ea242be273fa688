//! # Matching Engine
//!
//! Stateful engine that owns the road network and runs the matching phases
//! over it, plus [`run_pipeline`], which wires a full run together:
//!
//! 1. Ingest links and build the geohash index
//! 2. Ingest probes and group them into traces
//! 3. Select candidates and match every trip
//! 4. Aggregate slope accuracy
//! 5. Write the reports and `summary.json`
//!
//! With the `persistence` feature and a snapshot database configured, the
//! network, the parsed probes and the match results are cached between runs.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::accuracy::aggregate;
use crate::ingest::{self, IngestStats, ProbeData};
use crate::report::{ReportStats, ReportWriter};
use crate::{
    select_candidates, AccuracyReport, EvaluationOutcome, Link, LinkTable, MatchConfig,
    ProbeTrace, Result, RmseDenominator, SpatialIndex, Trip,
};

#[cfg(not(feature = "parallel"))]
use crate::match_trips;

#[cfg(feature = "parallel")]
use crate::match_trips_parallel;

#[cfg(feature = "persistence")]
use crate::persistence::{SnapshotKind, SnapshotStore};

// ============================================================================
// Road Network
// ============================================================================

/// Link table plus the geohash index over it. Read-only once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoadNetwork {
    pub links: LinkTable,
    pub index: SpatialIndex,
}

impl RoadNetwork {
    /// Build the network from links in ingestion order.
    ///
    /// Every row is indexed, repeats included. In the link table a repeated
    /// id keeps its last occurrence.
    pub fn build(links: Vec<Link>, fine_precision: usize, coarse_precision: usize) -> Self {
        let index = SpatialIndex::build(&links, fine_precision, coarse_precision);
        let rows = links.len();
        let links: LinkTable = links.into_iter().map(|l| (l.id.clone(), l)).collect();
        if links.len() < rows {
            log::debug!(
                "[Engine] {} repeated link ids, later rows replace earlier ones",
                rows - links.len()
            );
        }
        Self { links, index }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

// ============================================================================
// Matching Engine
// ============================================================================

/// Owns a road network and a configuration, and matches trips against them.
pub struct MatchingEngine {
    network: RoadNetwork,
    config: MatchConfig,

    // Counts from the most recent evaluation
    trip_count: usize,
    matched_count: usize,
    unmatchable_count: usize,
    failed_count: usize,
}

impl MatchingEngine {
    /// Create an engine from an already-built network.
    pub fn new(network: RoadNetwork, config: MatchConfig) -> Self {
        Self {
            network,
            config,
            trip_count: 0,
            matched_count: 0,
            unmatchable_count: 0,
            failed_count: 0,
        }
    }

    /// Build the network from links and create an engine over it.
    ///
    /// An invalid precision leaves both index tiers without the affected
    /// links; [`MatchingEngine::load_network`] rejects such a config instead.
    pub fn from_links(links: Vec<Link>, config: MatchConfig) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("[Engine] {}", e);
        }
        let network = RoadNetwork::build(links, config.fine_precision, config.coarse_precision);
        Self::new(network, config)
    }

    /// Read the link file at `path` and create an engine over it.
    pub fn load_network(path: &Path, config: MatchConfig) -> Result<(Self, IngestStats)> {
        config.validate()?;
        let (links, stats) = ingest::load_links(path)?;
        Ok((Self::from_links(links, config), stats))
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn links(&self) -> &LinkTable {
        &self.network.links
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Select candidate links for every trace, producing unmatched trips in input order.
    pub fn prepare_trips(&self, traces: Vec<ProbeTrace>) -> Vec<Trip> {
        let start = Instant::now();
        let trips: Vec<Trip> = traces
            .into_iter()
            .map(|trace| {
                let candidates = select_candidates(
                    &trace.fixes,
                    &self.network.index,
                    self.config.min_fine_candidates,
                );
                Trip::from_trace(trace, candidates)
            })
            .collect();

        let without = trips.iter().filter(|t| !t.has_candidates()).count();
        log::info!(
            "[Engine] Selected candidates for {} trips in {:?} ({} without candidates)",
            trips.len(),
            start.elapsed(),
            without
        );
        trips
    }

    /// Match every trip, preserving input order.
    pub fn run(&mut self, trips: Vec<Trip>) -> Result<EvaluationOutcome> {
        let start = Instant::now();

        #[cfg(feature = "parallel")]
        let outcome = match_trips_parallel(trips, &self.network.links, self.config.worker_threads)?;

        #[cfg(not(feature = "parallel"))]
        let outcome = match_trips(trips, &self.network.links);

        log::info!("[Engine] Matching finished in {:?}", start.elapsed());
        self.record(&outcome);
        Ok(outcome)
    }

    fn record(&mut self, outcome: &EvaluationOutcome) {
        self.trip_count = outcome.trips.len();
        self.matched_count = outcome.matched;
        self.unmatchable_count = outcome.unmatchable;
        self.failed_count = outcome.failed;
    }

    /// Slope accuracy over the matched trips, using the configured denominator.
    pub fn accuracy(&self, trips: &[Trip]) -> AccuracyReport {
        aggregate(trips, &self.network.links).report(self.config.rmse_denominator)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            link_count: self.network.link_count(),
            fine_bucket_count: self.network.index.fine.len(),
            coarse_bucket_count: self.network.index.coarse.len(),
            trip_count: self.trip_count,
            matched_count: self.matched_count,
            unmatchable_count: self.unmatchable_count,
            failed_count: self.failed_count,
        }
    }
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub link_count: usize,
    pub fine_bucket_count: usize,
    pub coarse_bucket_count: usize,
    pub trip_count: usize,
    pub matched_count: usize,
    pub unmatchable_count: usize,
    pub failed_count: usize,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Input and output locations for a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePaths {
    pub link_file: PathBuf,
    pub probe_file: PathBuf,
    pub output_dir: PathBuf,
    /// SQLite snapshot cache; ignored without the `persistence` feature
    pub snapshot_db: Option<PathBuf>,
}

/// Everything a run reports, also written as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub link_rows: IngestStats,
    pub probe_rows: IngestStats,
    pub engine: EngineStats,
    pub report: ReportStats,
    pub accuracy: AccuracyReport,
    pub elapsed_secs: f64,
}

fn build_network(paths: &PipelinePaths, config: &MatchConfig) -> Result<(RoadNetwork, IngestStats)> {
    let (links, stats) = ingest::load_links(&paths.link_file)?;
    let network = RoadNetwork::build(links, config.fine_precision, config.coarse_precision);
    Ok((network, stats))
}

fn read_probes(paths: &PipelinePaths, config: &MatchConfig) -> Result<ProbeData> {
    ingest::load_probes(&paths.probe_file, &config.timestamp_format)
}

#[cfg(feature = "persistence")]
fn open_snapshots(paths: &PipelinePaths) -> Option<SnapshotStore> {
    let path = paths.snapshot_db.as_deref()?;
    match SnapshotStore::open(path) {
        Ok(store) => Some(store),
        Err(e) => {
            log::warn!(
                "[Snapshot] Cannot open {}, running without cache: {}",
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(feature = "persistence")]
fn fingerprint(store: Option<&SnapshotStore>, source: &Path, extra: &str) -> Option<String> {
    store?;
    match SnapshotStore::file_fingerprint(source) {
        Ok(fp) => Some(format!("{}|{}", fp, extra)),
        Err(e) => {
            log::warn!("[Snapshot] Cannot fingerprint {}: {}", source.display(), e);
            None
        }
    }
}

/// Load `kind` from the cache when its fingerprint matches, otherwise build and store it.
#[cfg(feature = "persistence")]
fn cached<T, F>(
    store: Option<&SnapshotStore>,
    kind: SnapshotKind,
    fingerprint: Option<&str>,
    build: F,
) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    let (Some(store), Some(fingerprint)) = (store, fingerprint) else {
        return build();
    };
    if let Some(hit) = store.load(kind, fingerprint) {
        return Ok(hit);
    }
    let value = build()?;
    store.store(kind, fingerprint, &value);
    Ok(value)
}

/// Run the whole pipeline: ingest, match, aggregate, report.
///
/// Only failing to read the link or probe file (or to write the reports) is
/// an error. Malformed rows, unmatchable trips and per-trip failures are
/// counted in the summary.
pub fn run_pipeline(paths: &PipelinePaths, config: &MatchConfig) -> Result<PipelineSummary> {
    config.validate()?;
    let start = Instant::now();

    #[cfg(feature = "persistence")]
    let store = open_snapshots(paths);
    #[cfg(feature = "persistence")]
    let network_fp = fingerprint(
        store.as_ref(),
        &paths.link_file,
        &format!("{}/{}", config.fine_precision, config.coarse_precision),
    );
    #[cfg(feature = "persistence")]
    let probes_fp = fingerprint(store.as_ref(), &paths.probe_file, &config.timestamp_format);

    #[cfg(not(feature = "persistence"))]
    if paths.snapshot_db.is_some() {
        log::warn!("[Snapshot] Built without the persistence feature, snapshot cache ignored");
    }

    #[cfg(feature = "persistence")]
    let (network, link_rows) = cached(
        store.as_ref(),
        SnapshotKind::Network,
        network_fp.as_deref(),
        || build_network(paths, config),
    )?;
    #[cfg(not(feature = "persistence"))]
    let (network, link_rows) = build_network(paths, config)?;

    #[cfg(feature = "persistence")]
    let probes = cached(
        store.as_ref(),
        SnapshotKind::Probes,
        probes_fp.as_deref(),
        || read_probes(paths, config),
    )?;
    #[cfg(not(feature = "persistence"))]
    let probes = read_probes(paths, config)?;

    let ProbeData {
        traces,
        auxiliary,
        stats: probe_rows,
    } = probes;

    let mut engine = MatchingEngine::new(network, config.clone());
    let trips = engine.prepare_trips(traces);

    #[cfg(feature = "persistence")]
    let outcome = {
        let results_fp = match (&network_fp, &probes_fp) {
            (Some(n), Some(p)) => Some(format!(
                "{}#{}#{}/{}",
                n, p, config.min_fine_candidates, config.rmse_denominator.as_str()
            )),
            _ => None,
        };
        let outcome = cached(
            store.as_ref(),
            SnapshotKind::Results,
            results_fp.as_deref(),
            || engine.run(trips),
        )?;
        engine.record(&outcome);
        outcome
    };
    #[cfg(not(feature = "persistence"))]
    let outcome = engine.run(trips)?;

    let accuracy = engine.accuracy(&outcome.trips);
    match accuracy.rmse {
        Some(rmse) => log::info!(
            "[Engine] Slope RMSE {:.4} over {} {} fixes",
            rmse,
            match config.rmse_denominator {
                RmseDenominator::ComparedFixes => accuracy.compared_fixes,
                RmseDenominator::AllFixes => accuracy.total_fixes,
            },
            config.rmse_denominator.as_str()
        ),
        None => log::info!("[Engine] No fixes to compare slopes on"),
    }

    let writer = ReportWriter::new(&paths.output_dir);
    let report = writer.write(&outcome.trips, &auxiliary, engine.links())?;

    let summary = PipelineSummary {
        link_rows,
        probe_rows,
        engine: engine.stats(),
        report,
        accuracy,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    writer.write_summary(&summary)?;

    log::info!("[Engine] Pipeline finished in {:?}", start.elapsed());
    Ok(summary)
}
