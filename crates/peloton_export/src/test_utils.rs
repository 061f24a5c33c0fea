//! Shared test utilities: an in-process `PelotonClient` and a sink that
//! always fails.
#![cfg(test)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peloton_client::{
    Activity, Instructor, PelotonClient, PelotonError, Sample, SampleSeries, Summary,
};
use std::collections::HashSet;

use crate::error::ExportError;
use crate::sink::Sink;

pub fn workout_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

pub fn sample_activity(id: &str) -> Activity {
    Activity {
        id: id.to_string(),
        start_time: DateTime::<Utc>::from_timestamp(1_672_574_400, 0),
        title: "20 min Power Zone Ride".into(),
        instructor: Some(Instructor {
            first_name: "Matt".into(),
            last_name: "Wilpers".into(),
        }),
        discipline: Some("cycling".into()),
        duration_seconds: 1200.0,
        total_distance_meters: None,
        total_energy_kcal: Some(250.0),
    }
}

pub fn sample_summary() -> Summary {
    Summary {
        avg_heart_rate: Some(140),
        max_heart_rate: Some(170),
        avg_cadence: Some(85),
        max_cadence: Some(110),
        avg_power_watts: Some(180.0),
        max_power_watts: Some(320.0),
        avg_speed: Some(8.0),
        max_speed: Some(11.0),
        distance_meters: Some(9600.0),
        energy_kcal: Some(250.0),
    }
}

pub fn sample_series() -> SampleSeries {
    SampleSeries::new(
        (0..3)
            .map(|t| Sample {
                heart_rate: Some(120 + t),
                cadence: Some(80),
                speed: Some(8.0),
                power_watts: Some(150.0),
                resistance: Some(40.0),
                ..Sample::at(t)
            })
            .collect(),
    )
}

/// Serves the same synthetic workout for every known id. Individual facets
/// can be made to fail per id.
#[derive(Default)]
pub struct MockSource {
    ids: Vec<String>,
    fail_list: bool,
    fail_workout: HashSet<String>,
    fail_summary: HashSet<String>,
    fail_samples: HashSet<String>,
    no_start: HashSet<String>,
}

impl MockSource {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: workout_ids(ids),
            ..Self::default()
        }
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_workout(mut self, id: &str) -> Self {
        self.fail_workout.insert(id.to_string());
        self
    }

    pub fn failing_summary(mut self, id: &str) -> Self {
        self.fail_summary.insert(id.to_string());
        self
    }

    pub fn failing_samples(mut self, id: &str) -> Self {
        self.fail_samples.insert(id.to_string());
        self
    }

    pub fn without_start_time(mut self, id: &str) -> Self {
        self.no_start.insert(id.to_string());
        self
    }

    fn check(&self, set: &HashSet<String>, id: &str) -> Result<(), PelotonError> {
        if set.contains(id) {
            return Err(PelotonError::from_status(500, format!("boom {id}")));
        }
        if !self.ids.iter().any(|known| known == id) {
            return Err(PelotonError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PelotonClient for MockSource {
    async fn list_recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, PelotonError> {
        if self.fail_list {
            return Err(PelotonError::Auth("session expired".into()));
        }
        Ok(self.ids.iter().take(limit as usize).cloned().collect())
    }

    async fn get_workout(&self, workout_id: &str) -> Result<Activity, PelotonError> {
        self.check(&self.fail_workout, workout_id)?;
        let mut activity = sample_activity(workout_id);
        if self.no_start.contains(workout_id) {
            activity.start_time = None;
        }
        Ok(activity)
    }

    async fn get_workout_summary(&self, workout_id: &str) -> Result<Summary, PelotonError> {
        self.check(&self.fail_summary, workout_id)?;
        Ok(sample_summary())
    }

    async fn get_workout_samples(&self, workout_id: &str) -> Result<SampleSeries, PelotonError> {
        self.check(&self.fail_samples, workout_id)?;
        Ok(sample_series())
    }
}

pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn write(&self, name: &str, _content: &[u8]) -> Result<(), ExportError> {
        Err(ExportError::Write(format!("{name}: disk full")))
    }

    fn location(&self) -> String {
        "nowhere".into()
    }
}
