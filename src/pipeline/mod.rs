//! Export pipeline orchestrator
//!
//! Drives every selected realm through `Fetching → Normalizing → Resolving → Loading` and
//! collects the outcome in an [`ExportSummary`].
//!
//! Realms run concurrently through a bounded worker pool. A realm-scoped error fails only that
//! realm. A run-scoped error ([`ErrorScope::Run`]) cancels the shared [`RunControl`]: realms
//! that have not reached their next stage stop there and report `Aborted`. The global timeout
//! cancels the same way but reports `DeadlineExceeded`; batches already in a transaction finish.

mod extract;
pub mod summary;

pub use extract::fetch_realm;
pub use summary::{ExportSummary, RealmReport, RealmState, Stage};

use crate::error::{ErrorScope, ExportError};
use crate::graph::RunId;
use crate::loader::GraphLoader;
use crate::neo4j::{CleanStats, GraphStore};
use crate::normalize::normalize_realm;
use crate::resolve::resolve_realm;
use crate::source::{SourceClient, DEFAULT_MAX_PAGES};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default number of realms exported concurrently
pub const DEFAULT_WORKERS: usize = 4;

/// Options of one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Realm allow-list; empty selects every realm the source lists
    pub realms: Vec<String>,
    /// Delete previously exported data before loading
    pub clean: bool,
    pub workers: usize,
    pub max_pages: usize,
    /// Global deadline for the whole run
    pub timeout: Option<Duration>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            realms: Vec::new(),
            clean: false,
            workers: DEFAULT_WORKERS,
            max_pages: DEFAULT_MAX_PAGES,
            timeout: None,
        }
    }
}

// ============================================================================
// Run control
// ============================================================================

/// Cancellation state shared by every realm of a run.
#[derive(Debug, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    deadline_hit: AtomicBool,
    run_error: Mutex<Option<ExportError>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with the halt reason once the run has been cancelled.
    pub fn check(&self) -> Result<(), ExportError> {
        if self.cancel.is_cancelled() {
            Err(self.halt_reason())
        } else {
            Ok(())
        }
    }

    /// Error attributed to realms stopped by cancellation.
    pub fn halt_reason(&self) -> ExportError {
        if self.deadline_hit.load(Ordering::SeqCst) {
            return ExportError::DeadlineExceeded;
        }
        let reason = self
            .run_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "cancelled".to_string());
        ExportError::Aborted { reason }
    }

    /// Record a run-scoped error and cancel outstanding work. The first error wins.
    pub fn abort(&self, err: ExportError) {
        if let Ok(mut slot) = self.run_error.lock() {
            if slot.is_none() {
                warn!(error = %err, "Aborting export run");
                *slot = Some(err);
            }
        }
        self.cancel.cancel();
    }

    /// Mark the deadline as reached and cancel outstanding work.
    pub fn expire(&self) {
        self.deadline_hit.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn run_error(&self) -> Option<ExportError> {
        self.run_error.lock().ok().and_then(|slot| slot.clone())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct ExportPipeline {
    source: Arc<dyn SourceClient>,
    store: Arc<dyn GraphStore>,
    loader: GraphLoader,
    options: ExportOptions,
}

impl ExportPipeline {
    pub fn new(
        source: Arc<dyn SourceClient>,
        store: Arc<dyn GraphStore>,
        options: ExportOptions,
        batch_size: usize,
    ) -> Self {
        let loader = GraphLoader::new(store.clone(), batch_size);
        Self {
            source,
            store,
            loader,
            options,
        }
    }

    /// Run a complete export.
    pub async fn run(&self) -> ExportSummary {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let control = Arc::new(RunControl::new());

        info!(
            run_id = %run_id,
            workers = self.options.workers,
            batch_size = self.loader.batch_size(),
            clean = self.options.clean,
            "Starting export"
        );

        let watchdog = self.options.timeout.map(|timeout| {
            let control = control.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        warn!(timeout_secs = timeout.as_secs_f64(), "Export deadline reached, draining");
                        control.expire();
                    }
                    _ = control.token().cancelled() => {}
                }
            })
        });

        let (cleaned, mut realms) = self.execute(run_id, &control).await;

        if let Some(handle) = watchdog {
            handle.abort();
        }
        realms.sort_by(|a, b| a.realm.cmp(&b.realm));

        let summary = ExportSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            cleaned,
            realms,
            run_error: control.run_error(),
        };
        info!(
            run_id = %run_id,
            realms = summary.realms.len(),
            failed = summary.failed_realms(),
            success = summary.success(),
            "Export finished"
        );
        summary
    }

    async fn execute(
        &self,
        run_id: RunId,
        control: &RunControl,
    ) -> (Option<CleanStats>, Vec<RealmReport>) {
        let listed = match self.source.list_realms().await {
            Ok(listed) => listed,
            Err(e) => {
                control.abort(e);
                return (None, Vec::new());
            }
        };

        let (selected, mut reports) = self.select_realms(listed);

        if let Err(e) = self.store.init_schema().await {
            let err = ExportError::Store(e.to_string());
            warn!(error = %err, "Schema initialization failed, continuing");
        }

        let mut cleaned = None;
        if self.options.clean {
            match self.store.clean(run_id).await {
                Ok(stats) => {
                    info!(nodes_deleted = stats.nodes_deleted, "Removed previously exported data");
                    cleaned = Some(stats);
                }
                Err(e) => {
                    control.abort(ExportError::CleanFailed {
                        reason: e.to_string(),
                    });
                    let reason = control.halt_reason();
                    reports.extend(selected.iter().map(|(name, _)| {
                        RealmReport::new(name).failed(Stage::Fetching, reason.clone())
                    }));
                    return (None, reports);
                }
            }
        }

        let workers = self.options.workers.max(1);
        let exported: Vec<RealmReport> = stream::iter(selected)
            .map(|(name, realm)| self.export_realm(run_id, name, realm, control))
            .buffer_unordered(workers)
            .collect()
            .await;
        reports.extend(exported);

        (cleaned, reports)
    }

    /// Apply the allow-list. Requested names the source does not know get a failed report.
    fn select_realms(&self, listed: Vec<Value>) -> (Vec<(String, Value)>, Vec<RealmReport>) {
        let by_name: BTreeMap<String, Value> = listed
            .into_iter()
            .filter_map(|realm| {
                let name = realm.get("realm").and_then(Value::as_str)?.to_string();
                Some((name, realm))
            })
            .collect();

        if self.options.realms.is_empty() {
            return (by_name.into_iter().collect(), Vec::new());
        }

        let mut selected = Vec::new();
        let mut unknown = Vec::new();
        let requested: BTreeSet<&String> = self.options.realms.iter().collect();
        for name in requested {
            match by_name.get(name) {
                Some(realm) => selected.push((name.clone(), realm.clone())),
                None => unknown.push(RealmReport::new(name).failed(
                    Stage::Fetching,
                    ExportError::UnknownRealm {
                        realm: name.clone(),
                    },
                )),
            }
        }
        (selected, unknown)
    }

    async fn export_realm(
        &self,
        run_id: RunId,
        name: String,
        realm: Value,
        control: &RunControl,
    ) -> RealmReport {
        let mut report = RealmReport::new(&name);

        // Fetching
        let fetched = match control.check() {
            Ok(()) => fetch_realm(self.source.as_ref(), realm, self.options.max_pages, control).await,
            Err(e) => Err(e),
        };
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if e.scope() == ErrorScope::Run {
                    control.abort(e.clone());
                }
                return report.failed(Stage::Fetching, e);
            }
        };

        // Normalizing
        if let Err(e) = control.check() {
            return report.failed(Stage::Normalizing, e);
        }
        let normalized = match normalize_realm(&snapshot) {
            Ok(normalized) => normalized,
            Err(e) => return report.failed(Stage::Normalizing, e),
        };
        report.issues.extend(normalized.issues);

        // Resolving
        if let Err(e) = control.check() {
            return report.failed(Stage::Resolving, e);
        }
        let resolved = resolve_realm(&name, &normalized.nodes, &normalized.relations);
        report.issues.extend(resolved.issues);

        // Loading
        if let Err(e) = control.check() {
            return report.failed(Stage::Loading, e);
        }
        let load = self
            .loader
            .apply(
                run_id,
                &name,
                normalized.nodes,
                resolved.edges,
                control.token(),
            )
            .await;
        let drained = load.drained_batches > 0;
        let all_failed = load.all_failed();
        let failed_batches = load.failed_batches;
        report.record_load(load);

        if drained {
            return report.failed(Stage::Loading, control.halt_reason());
        }
        if all_failed {
            let err = ExportError::LoadFailed {
                realm: name.clone(),
                reason: format!("all {} batch(es) failed", failed_batches),
            };
            return report.failed(Stage::Loading, err);
        }

        info!(
            realm = %name,
            nodes = report.nodes.applied,
            edges = report.edges.applied,
            issues = report.issues.len(),
            "Realm exported"
        );
        report
    }
}
