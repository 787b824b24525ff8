//! Per-realm reports and the run summary shown to the operator.

use crate::error::{ExportError, Issue, IssueKind};
use crate::graph::RunId;
use crate::loader::{LoadCounts, LoadResult};
use crate::neo4j::CleanStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline stage of a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Fetching,
    Normalizing,
    Resolving,
    Loading,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Normalizing => "normalizing",
            Stage::Resolving => "resolving",
            Stage::Loading => "loading",
        };
        f.write_str(name)
    }
}

/// Terminal state of a realm.
#[derive(Debug, Clone, PartialEq)]
pub enum RealmState {
    Done,
    Failed { stage: Stage, error: ExportError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealmReport {
    pub realm: String,
    pub state: RealmState,
    pub nodes: LoadCounts,
    pub edges: LoadCounts,
    pub issues: Vec<Issue>,
}

impl RealmReport {
    pub fn new(realm: &str) -> Self {
        Self {
            realm: realm.to_string(),
            state: RealmState::Done,
            nodes: LoadCounts::default(),
            edges: LoadCounts::default(),
            issues: Vec::new(),
        }
    }

    pub fn failed(mut self, stage: Stage, error: ExportError) -> Self {
        tracing::error!(realm = %self.realm, stage = %stage, error = %error, "Realm failed");
        self.state = RealmState::Failed { stage, error };
        self
    }

    pub fn record_load(&mut self, load: LoadResult) {
        self.nodes = load.nodes;
        self.edges = load.edges;
        self.issues.extend(load.issues);
    }

    pub fn is_done(&self) -> bool {
        self.state == RealmState::Done
    }

    pub fn issue_counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn issue_count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

/// Result of a whole export run.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cleaned: Option<CleanStats>,
    /// Reports sorted by realm name
    pub realms: Vec<RealmReport>,
    /// A run-scoped error that stopped the export
    pub run_error: Option<ExportError>,
}

impl ExportSummary {
    /// Overall success: no run-scoped error and every realm `Done`.
    pub fn success(&self) -> bool {
        self.run_error.is_none() && self.realms.iter().all(RealmReport::is_done)
    }

    pub fn realm(&self, name: &str) -> Option<&RealmReport> {
        self.realms.iter().find(|r| r.realm == name)
    }

    pub fn failed_realms(&self) -> usize {
        self.realms.iter().filter(|r| !r.is_done()).count()
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        writeln!(
            f,
            "Export run {} ({:.1}s)",
            self.run_id,
            elapsed.num_milliseconds() as f64 / 1000.0
        )?;
        if let Some(stats) = &self.cleaned {
            writeln!(f, "  clean: removed {} previously exported nodes", stats.nodes_deleted)?;
        }
        if let Some(err) = &self.run_error {
            writeln!(f, "  RUN ABORTED [{}]: {}", err.kind(), err)?;
        }

        for report in &self.realms {
            match &report.state {
                RealmState::Done => writeln!(f, "  realm {}: done", report.realm)?,
                RealmState::Failed { stage, error } => writeln!(
                    f,
                    "  realm {}: FAILED while {} [{}]: {}",
                    report.realm,
                    stage,
                    error.kind(),
                    error
                )?,
            }
            writeln!(
                f,
                "    nodes: {} applied, {} skipped, {} failed",
                report.nodes.applied, report.nodes.skipped, report.nodes.failed
            )?;
            writeln!(
                f,
                "    edges: {} applied, {} skipped, {} failed",
                report.edges.applied, report.edges.skipped, report.edges.failed
            )?;
            for (kind, count) in report.issue_counts() {
                writeln!(f, "    {}: {}", kind, count)?;
            }
        }

        let status = if self.success() { "SUCCESS" } else { "FAILURE" };
        write!(
            f,
            "{}: {} realm(s), {} failed",
            status,
            self.realms.len(),
            self.failed_realms()
        )
    }
}
