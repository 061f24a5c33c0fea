//! Ingestion orchestrator.
//!
//! For every requested workout: fetch the three facets, build the TCX
//! document, name it and hand it to the sink. Each workout yields exactly one
//! [`ActivityOutcome`]; a failure is recorded and the batch moves on.

use futures_util::StreamExt;
use peloton_client::PelotonClient;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::ExportError;
use crate::filename;
use crate::sink::Sink;
use crate::tcx;

const OUTCOME_COUNTER: &str = "peloton_export_activities_total";

#[derive(Debug)]
pub enum ActivityOutcome {
    Written {
        activity_id: String,
        filename: String,
    },
    Failed {
        activity_id: String,
        error: ExportError,
    },
}

impl ActivityOutcome {
    pub fn activity_id(&self) -> &str {
        match self {
            ActivityOutcome::Written { activity_id, .. }
            | ActivityOutcome::Failed { activity_id, .. } => activity_id,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, ActivityOutcome::Written { .. })
    }
}

/// Serializable view of one outcome.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub activity_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ActivityOutcome> for OutcomeRecord {
    fn from(outcome: &ActivityOutcome) -> Self {
        match outcome {
            ActivityOutcome::Written {
                activity_id,
                filename,
            } => OutcomeRecord {
                activity_id: activity_id.clone(),
                status: "written",
                filename: Some(filename.clone()),
                error_kind: None,
                error: None,
            },
            ActivityOutcome::Failed { activity_id, error } => OutcomeRecord {
                activity_id: activity_id.clone(),
                status: "failed",
                filename: None,
                error_kind: Some(error.kind()),
                error: Some(error.to_string()),
            },
        }
    }
}

/// Outcomes of one run plus where the files went.
#[derive(Debug, Default)]
pub struct RunReport {
    pub location: String,
    pub outcomes: Vec<ActivityOutcome>,
}

#[derive(Debug, Serialize)]
pub struct RunReportRecord {
    pub location: String,
    pub written: usize,
    pub failed: usize,
    pub outcomes: Vec<OutcomeRecord>,
}

impl RunReport {
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_written()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExportError)> {
        self.outcomes.iter().filter_map(|o| match o {
            ActivityOutcome::Failed { activity_id, error } => Some((activity_id.as_str(), error)),
            ActivityOutcome::Written { .. } => None,
        })
    }

    /// True when there was work and none of it succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.written() == 0
    }

    pub fn to_record(&self) -> RunReportRecord {
        RunReportRecord {
            location: self.location.clone(),
            written: self.written(),
            failed: self.failed(),
            outcomes: self.outcomes.iter().map(OutcomeRecord::from).collect(),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exported {} of {} activities to {}",
            self.written(),
            self.outcomes.len(),
            self.location
        )?;
        for (id, error) in self.failures() {
            write!(f, "\n  activity {id} failed: {error}")?;
        }
        Ok(())
    }
}

/// Fetch, build, name and write one workout.
async fn export_one(
    id: &str,
    source: &dyn PelotonClient,
    sink: &dyn Sink,
) -> Result<String, ExportError> {
    let (activity, summary, samples) = tokio::try_join!(
        source.get_workout(id),
        source.get_workout_summary(id),
        source.get_workout_samples(id),
    )?;
    let doc = tcx::build(&activity, &summary, &samples)?;
    let name = filename::filename(&activity);
    sink.write(&name, doc.as_bytes()).await?;
    Ok(name)
}

async fn process_one(id: String, source: &dyn PelotonClient, sink: &dyn Sink) -> ActivityOutcome {
    match export_one(&id, source, sink).await {
        Ok(filename) => {
            info!(activity_id = %id, %filename, "wrote TCX file");
            metrics::counter!(OUTCOME_COUNTER, "outcome" => "written").increment(1);
            ActivityOutcome::Written {
                activity_id: id,
                filename,
            }
        }
        Err(error) => {
            warn!(activity_id = %id, kind = error.kind(), %error, "failed to export activity");
            metrics::counter!(OUTCOME_COUNTER, "outcome" => "failed").increment(1);
            ActivityOutcome::Failed {
                activity_id: id,
                error,
            }
        }
    }
}

fn cancelled(id: String) -> ActivityOutcome {
    metrics::counter!(OUTCOME_COUNTER, "outcome" => "failed").increment(1);
    ActivityOutcome::Failed {
        activity_id: id,
        error: ExportError::Cancelled,
    }
}

/// Runs exports against one data source and one sink.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn PelotonClient>,
    sink: Arc<dyn Sink>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn PelotonClient>, sink: Arc<dyn Sink>) -> Self {
        Self {
            source,
            sink,
            cancel: None,
        }
    }

    /// Stop starting new activities once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn report(&self, outcomes: Vec<ActivityOutcome>) -> RunReport {
        RunReport {
            location: self.sink.location(),
            outcomes,
        }
    }

    /// Process `ids` one at a time, in order.
    pub async fn run(&self, ids: &[String]) -> RunReport {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            if self.is_cancelled() {
                outcomes.push(cancelled(id.clone()));
                continue;
            }
            info!(activity_id = %id, "exporting activity");
            outcomes.push(process_one(id.clone(), self.source.as_ref(), self.sink.as_ref()).await);
        }
        self.report(outcomes)
    }

    /// Process up to `max_in_flight` activities at once.
    ///
    /// Outcomes come back in completion order; each carries its activity id.
    pub async fn run_concurrent(&self, ids: &[String], max_in_flight: usize) -> RunReport {
        if max_in_flight <= 1 {
            return self.run(ids).await;
        }
        let outcomes = futures_util::stream::iter(ids.iter().cloned())
            .map(|id| {
                let source = self.source.clone();
                let sink = self.sink.clone();
                let cancel = self.cancel.clone();
                async move {
                    // checked when the task is started, not when it is queued
                    if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                        return cancelled(id);
                    }
                    info!(activity_id = %id, "exporting activity");
                    process_one(id, source.as_ref(), sink.as_ref()).await
                }
            })
            .buffer_unordered(max_in_flight)
            .collect::<Vec<_>>()
            .await;
        self.report(outcomes)
    }

    /// List the `count` most recent workouts and export them.
    ///
    /// A listing failure is returned as an error since no activity can be
    /// blamed for it.
    pub async fn export_recent(
        &self,
        count: u32,
        max_in_flight: usize,
    ) -> Result<RunReport, ExportError> {
        info!(count, "fetching latest workouts");
        let ids = self.source.list_recent_workout_ids(count).await?;
        let report = self.run_concurrent(&ids, max_in_flight).await;
        info!(
            written = report.written(),
            failed = report.failed(),
            location = %report.location,
            "export finished"
        );
        Ok(report)
    }
}
