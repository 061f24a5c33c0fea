//! Typed telemetry model for a single workout.
//!
//! Everything the exporter needs is mapped into these types at the client
//! boundary (see [`crate::transforms`]), so downstream code never touches raw
//! API JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instructor attached to a class.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instructor {
    pub first_name: String,
    pub last_name: String,
}

impl Instructor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// One completed workout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    /// Missing start times are representable so the TCX builder can reject them.
    pub start_time: Option<DateTime<Utc>>,
    pub title: String,
    pub instructor: Option<Instructor>,
    /// Raw discipline tag as reported upstream, e.g. `cycling`.
    pub discipline: Option<String>,
    pub duration_seconds: f64,
    pub total_distance_meters: Option<f64>,
    pub total_energy_kcal: Option<f64>,
}

/// Aggregate metrics for a workout.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
    pub avg_cadence: Option<u32>,
    pub max_cadence: Option<u32>,
    pub avg_power_watts: Option<f64>,
    pub max_power_watts: Option<f64>,
    /// m/s
    pub avg_speed: Option<f64>,
    /// m/s
    pub max_speed: Option<f64>,
    pub distance_meters: Option<f64>,
    pub energy_kcal: Option<f64>,
}

/// One telemetry sample, aligned by seconds since the workout started.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub elapsed_seconds: u32,
    pub heart_rate: Option<u32>,
    pub cadence: Option<u32>,
    /// m/s
    pub speed: Option<f64>,
    pub power_watts: Option<f64>,
    /// percent, 0-100
    pub resistance: Option<f64>,
    /// percent grade
    pub incline: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_meters: Option<f64>,
    /// Cumulative distance when the device samples it directly.
    pub distance_meters: Option<f64>,
}

impl Sample {
    pub fn at(elapsed_seconds: u32) -> Self {
        Self {
            elapsed_seconds,
            ..Self::default()
        }
    }

    /// Both coordinates, or nothing.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Ordered samples for one workout. May be empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SampleSeries {
    pub samples: Vec<Sample>,
}

impl SampleSeries {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Index of the first sample whose offset precedes its predecessor's.
    pub fn first_out_of_order(&self) -> Option<usize> {
        self.samples
            .windows(2)
            .position(|w| w[1].elapsed_seconds < w[0].elapsed_seconds)
            .map(|i| i + 1)
    }
}
