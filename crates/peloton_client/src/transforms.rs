//! Mapping from raw Peloton API payloads into the typed model.
//!
//! Upstream responses are loosely shaped and drift over time. Every field is
//! optional here; the mapping decides what is required and converts units
//! (imperial speed/distance/altitude into SI).

use crate::PelotonError;
use crate::model::{Activity, Instructor, Sample, SampleSeries, Summary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

const METERS_PER_MILE: f64 = 1609.344;
const METERS_PER_FOOT: f64 = 0.3048;
const MPS_PER_MPH: f64 = 0.44704;

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkoutListPayload {
    #[serde(default)]
    pub data: Vec<WorkoutRef>,
    pub page_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WorkoutRef {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkoutPayload {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub fitness_discipline: Option<String>,
    pub name: Option<String>,
    pub ride: Option<RidePayload>,
    pub peloton: Option<PelotonPayload>,
}

#[derive(Debug, Deserialize)]
pub struct PelotonPayload {
    pub ride: Option<RidePayload>,
}

#[derive(Debug, Deserialize)]
pub struct RidePayload {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub fitness_discipline: Option<String>,
    pub instructor: Option<InstructorPayload>,
}

#[derive(Debug, Deserialize)]
pub struct InstructorPayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryPayload {
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub avg_cadence: Option<f64>,
    pub max_cadence: Option<f64>,
    pub avg_power: Option<f64>,
    pub max_power: Option<f64>,
    /// mph
    pub avg_speed: Option<f64>,
    /// mph
    pub max_speed: Option<f64>,
    /// miles
    pub distance: Option<f64>,
    pub calories: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PerformanceGraphPayload {
    #[serde(default)]
    pub seconds_since_pedaling_start: Vec<Option<f64>>,
    #[serde(default)]
    pub metrics: Vec<MetricPayload>,
    #[serde(default)]
    pub location_data: Vec<LocationSegment>,
}

#[derive(Debug, Deserialize)]
pub struct MetricPayload {
    pub slug: String,
    pub display_unit: Option<String>,
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct LocationSegment {
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Deserialize)]
pub struct Coordinate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    deserialize_opt_id(deserializer)?.ok_or_else(|| D::Error::custom("missing id"))
}

/// Map a workout payload into an [`Activity`].
///
/// The ride is read from `peloton.ride` when present and from the top-level
/// `ride` otherwise. The instructor is attached only when the payload names one.
pub fn workout_to_activity(
    requested_id: &str,
    payload: WorkoutPayload,
) -> Result<Activity, PelotonError> {
    let id = payload.id.unwrap_or_else(|| requested_id.to_string());

    let start_time = match payload.start_time {
        Some(secs) => Some(epoch_to_utc(secs).ok_or_else(|| PelotonError::Decode {
            what: format!("workout {id}"),
            reason: format!("start_time out of range: {secs}"),
        })?),
        None => None,
    };

    let ride = payload
        .peloton
        .and_then(|p| p.ride)
        .or(payload.ride);

    let (title, ride_duration, ride_discipline, instructor) = match ride {
        Some(r) => (
            r.title,
            r.duration,
            r.fitness_discipline,
            r.instructor.and_then(instructor_from_payload),
        ),
        None => (None, None, None, None),
    };

    let title = title
        .or(payload.name)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Workout".to_string());

    let duration_seconds = match (payload.start_time, payload.end_time) {
        (Some(start), Some(end)) if end > start => (end - start) as f64,
        _ => ride_duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0),
    };

    Ok(Activity {
        id,
        start_time,
        title,
        instructor,
        discipline: payload.fitness_discipline.or(ride_discipline),
        duration_seconds,
        total_distance_meters: None,
        total_energy_kcal: None,
    })
}

fn instructor_from_payload(p: InstructorPayload) -> Option<Instructor> {
    let non_empty = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    match (non_empty(p.first_name), non_empty(p.last_name)) {
        (Some(first_name), Some(last_name)) => Some(Instructor {
            first_name,
            last_name,
        }),
        (Some(first_name), None) => Some(Instructor {
            first_name,
            last_name: String::new(),
        }),
        (None, Some(last_name)) => Some(Instructor {
            first_name: String::new(),
            last_name,
        }),
        (None, None) => {
            let name = non_empty(p.name)?;
            let (first, last) = name.split_once(' ').unwrap_or((name.as_str(), ""));
            Some(Instructor {
                first_name: first.to_string(),
                last_name: last.trim().to_string(),
            })
        }
    }
}

fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

fn non_negative(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x >= 0.0)
}

fn as_count(v: Option<f64>) -> Option<u32> {
    non_negative(v).map(|x| x.round() as u32)
}

pub fn summary_from_payload(p: SummaryPayload) -> Summary {
    Summary {
        avg_heart_rate: as_count(p.avg_heart_rate).filter(|hr| *hr > 0),
        max_heart_rate: as_count(p.max_heart_rate).filter(|hr| *hr > 0),
        avg_cadence: as_count(p.avg_cadence),
        max_cadence: as_count(p.max_cadence),
        avg_power_watts: non_negative(p.avg_power),
        max_power_watts: non_negative(p.max_power),
        avg_speed: non_negative(p.avg_speed).map(|s| s * MPS_PER_MPH),
        max_speed: non_negative(p.max_speed).map(|s| s * MPS_PER_MPH),
        distance_meters: non_negative(p.distance).map(|mi| mi * METERS_PER_MILE),
        energy_kcal: non_negative(p.calories),
    }
}

/// Speed in m/s for a value reported in `unit`.
fn speed_to_mps(value: f64, unit: Option<&str>) -> f64 {
    match unit.map(|u| u.to_ascii_lowercase()) {
        Some(u) if u == "kph" || u == "km/h" || u == "kmh" => value / 3.6,
        Some(u) if u == "m/s" || u == "mps" => value,
        _ => value * MPS_PER_MPH,
    }
}

fn length_to_meters(value: f64, unit: Option<&str>) -> f64 {
    match unit.map(|u| u.to_ascii_lowercase()) {
        Some(u) if u == "ft" || u == "feet" => value * METERS_PER_FOOT,
        Some(u) if u == "mi" || u == "miles" => value * METERS_PER_MILE,
        Some(u) if u == "km" => value * 1000.0,
        _ => value,
    }
}

/// Build a [`SampleSeries`] from a performance graph.
///
/// Samples are aligned by `seconds_since_pedaling_start`; when that array is
/// absent the longest metric defines the length with one sample per second.
/// Location coordinates, when present, are flattened across segments and
/// aligned by index.
pub fn performance_graph_to_samples(
    p: PerformanceGraphPayload,
) -> Result<SampleSeries, PelotonError> {
    let len = if p.seconds_since_pedaling_start.is_empty() {
        p.metrics.iter().map(|m| m.values.len()).max().unwrap_or(0)
    } else {
        p.seconds_since_pedaling_start.len()
    };

    let mut samples: Vec<Sample> = (0..len)
        .map(|i| {
            let elapsed = p
                .seconds_since_pedaling_start
                .get(i)
                .copied()
                .flatten()
                .map(|s| s.max(0.0).round() as u32)
                .unwrap_or(i as u32);
            Sample::at(elapsed)
        })
        .collect();

    for metric in &p.metrics {
        let unit = metric.display_unit.as_deref();
        for (sample, value) in samples.iter_mut().zip(metric.values.iter()) {
            if metric.slug == "incline" {
                // grade can be negative
                sample.incline = value.filter(|v| v.is_finite());
                continue;
            }
            let Some(v) = non_negative(*value) else {
                continue;
            };
            match metric.slug.as_str() {
                "heart_rate" => sample.heart_rate = Some(v.round() as u32),
                "cadence" => sample.cadence = Some(v.round() as u32),
                "output" => sample.power_watts = Some(v),
                "resistance" => sample.resistance = Some(v.min(100.0)),
                "speed" => sample.speed = Some(speed_to_mps(v, unit)),
                "altitude" | "elevation" => sample.altitude_meters = Some(length_to_meters(v, unit)),
                "distance" => sample.distance_meters = Some(length_to_meters(v, unit)),
                _ => {}
            }
        }
    }

    let coordinates = p.location_data.into_iter().flat_map(|s| s.coordinates);
    for (sample, c) in samples.iter_mut().zip(coordinates) {
        if let (Some(lat), Some(lon)) = (c.latitude, c.longitude) {
            sample.latitude = Some(lat);
            sample.longitude = Some(lon);
        }
        if sample.altitude_meters.is_none() {
            sample.altitude_meters = c.altitude.filter(|a| a.is_finite());
        }
    }

    let series = SampleSeries::new(samples);
    if let Some(idx) = series.first_out_of_order() {
        return Err(PelotonError::Decode {
            what: "performance graph".into(),
            reason: format!("sample {idx} goes back in time"),
        });
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workout(value: serde_json::Value) -> WorkoutPayload {
        serde_json::from_value(value).expect("workout payload")
    }

    #[test]
    fn prefers_peloton_ride_over_top_level_ride() {
        let p = workout(json!({
            "id": "w1",
            "start_time": 1672574400,
            "end_time": 1672576200,
            "fitness_discipline": "cycling",
            "ride": {"title": "Top Level"},
            "peloton": {"ride": {
                "title": "Power Zone",
                "duration": 1800,
                "instructor": {"first_name": "Jane", "last_name": "Doe"}
            }}
        }));
        let a = workout_to_activity("w1", p).expect("activity");
        assert_eq!(a.title, "Power Zone");
        assert_eq!(a.instructor.unwrap().full_name(), "Jane Doe");
        assert_eq!(a.duration_seconds, 1800.0);
        assert_eq!(a.start_time.unwrap().timestamp(), 1672574400);
        assert_eq!(a.discipline.as_deref(), Some("cycling"));
    }

    #[test]
    fn null_peloton_falls_back_to_ride_without_instructor() {
        let p = workout(json!({
            "id": 42,
            "start_time": 1672574400,
            "peloton": null,
            "ride": {"title": "Just Ride", "duration": 600, "instructor": null}
        }));
        let a = workout_to_activity("42", p).expect("activity");
        assert_eq!(a.id, "42");
        assert_eq!(a.title, "Just Ride");
        assert!(a.instructor.is_none());
        assert_eq!(a.duration_seconds, 600.0);
    }

    #[test]
    fn missing_start_time_is_kept_as_none() {
        let a = workout_to_activity("x", workout(json!({"name": "Scenic"}))).expect("activity");
        assert_eq!(a.id, "x");
        assert!(a.start_time.is_none());
        assert_eq!(a.title, "Scenic");
    }

    #[test]
    fn instructor_single_name_field_is_split() {
        let i = instructor_from_payload(InstructorPayload {
            first_name: None,
            last_name: None,
            name: Some("Jane Doe".into()),
        })
        .expect("instructor");
        assert_eq!(i.first_name, "Jane");
        assert_eq!(i.last_name, "Doe");
    }

    #[test]
    fn summary_converts_imperial_units() {
        let s = summary_from_payload(SummaryPayload {
            distance: Some(10.0),
            avg_speed: Some(20.0),
            calories: Some(450.0),
            avg_heart_rate: Some(0.0),
            ..SummaryPayload::default()
        });
        assert!((s.distance_meters.unwrap() - 16093.44).abs() < 1e-6);
        assert!((s.avg_speed.unwrap() - 8.9408).abs() < 1e-6);
        assert_eq!(s.energy_kcal, Some(450.0));
        assert_eq!(s.avg_heart_rate, None);
    }

    #[test]
    fn performance_graph_aligns_metrics_by_offset() {
        let p: PerformanceGraphPayload = serde_json::from_value(json!({
            "seconds_since_pedaling_start": [0, 1, 2],
            "metrics": [
                {"slug": "heart_rate", "display_unit": "bpm", "values": [120, null, 130.4]},
                {"slug": "speed", "display_unit": "mph", "values": [10, 10, 10]},
                {"slug": "output", "display_unit": "kj", "values": [150.5, 160, 170]},
                {"slug": "incline", "display_unit": "%", "values": [-1.5, 0, 2]}
            ]
        }))
        .expect("graph");
        let series = performance_graph_to_samples(p).expect("series");
        assert_eq!(series.len(), 3);
        let s = &series.samples;
        assert_eq!(s[0].heart_rate, Some(120));
        assert_eq!(s[1].heart_rate, None);
        assert_eq!(s[2].heart_rate, Some(130));
        assert!((s[0].speed.unwrap() - 4.4704).abs() < 1e-9);
        assert_eq!(s[0].power_watts, Some(150.5));
        assert_eq!(s[0].incline, Some(-1.5));
        assert_eq!(s[2].elapsed_seconds, 2);
    }

    #[test]
    fn performance_graph_without_offsets_uses_index() {
        let p: PerformanceGraphPayload = serde_json::from_value(json!({
            "metrics": [{"slug": "cadence", "values": [80, 81]}]
        }))
        .expect("graph");
        let series = performance_graph_to_samples(p).expect("series");
        assert_eq!(series.samples[1].elapsed_seconds, 1);
        assert_eq!(series.samples[1].cadence, Some(81));
    }

    #[test]
    fn performance_graph_maps_location_pairs() {
        let p: PerformanceGraphPayload = serde_json::from_value(json!({
            "seconds_since_pedaling_start": [0, 5],
            "location_data": [
                {"coordinates": [{"latitude": 40.1, "longitude": -73.9, "altitude": 12.0}]},
                {"coordinates": [{"latitude": 40.2}]}
            ]
        }))
        .expect("graph");
        let series = performance_graph_to_samples(p).expect("series");
        assert_eq!(series.samples[0].position(), Some((40.1, -73.9)));
        assert_eq!(series.samples[0].altitude_meters, Some(12.0));
        assert_eq!(series.samples[1].latitude, None);
        assert_eq!(series.samples[1].longitude, None);
    }

    #[test]
    fn performance_graph_rejects_backwards_offsets() {
        let p: PerformanceGraphPayload = serde_json::from_value(json!({
            "seconds_since_pedaling_start": [0, 5, 3]
        }))
        .expect("graph");
        assert!(matches!(
            performance_graph_to_samples(p),
            Err(PelotonError::Decode { .. })
        ));
    }

    #[test]
    fn empty_performance_graph_yields_empty_series() {
        let series = performance_graph_to_samples(PerformanceGraphPayload::default()).expect("series");
        assert!(series.is_empty());
    }
}
