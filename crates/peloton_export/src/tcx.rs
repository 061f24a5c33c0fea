//! Training Center XML (TCX) serialization.
//!
//! [`build`] turns one workout (metadata, summary and samples) into a TCX v2
//! document with a single lap spanning the whole workout and one trackpoint
//! per sample. Output is deterministic: identical input yields identical bytes.
//!
//! Trackpoint distance is taken from the sample when the device reported it.
//! Otherwise it is the running trapezoidal integral of speed over elapsed
//! time, `d[i] = d[i-1] + (v[i-1] + v[i]) / 2 * (t[i] - t[i-1])`, starting at
//! zero, with a missing speed counted as zero.

use chrono::{DateTime, Duration, Utc};
use peloton_client::{Activity, Sample, SampleSeries, Summary};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::ExportError;

const TCD_NS: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2 http://www.garmin.com/xmlschemas/TrainingCenterDatabasev2.xsd";
const ACTIVITY_EXT_NS: &str = "http://www.garmin.com/xmlschemas/ActivityExtension/v2";
/// Namespace for values the Garmin extension schema has no slot for.
pub const VENDOR_EXT_NS: &str = "urn:peloton-export:extensions:v1";

/// TCX `Sport` attribute values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sport {
    Biking,
    Running,
    Other,
}

impl Sport {
    /// Map an upstream discipline tag, case-insensitively.
    ///
    /// | discipline | sport |
    /// |---|---|
    /// | `cycling`, `bike`, `biking`, `bike_bootcamp` | `Biking` |
    /// | `running`, `run`, `outdoor_running` | `Running` |
    /// | anything else | `Other` |
    pub fn from_discipline(discipline: Option<&str>) -> Self {
        let Some(tag) = discipline else {
            return Sport::Other;
        };
        match tag.trim().to_ascii_lowercase().as_str() {
            "cycling" | "bike" | "biking" | "bike_bootcamp" => Sport::Biking,
            "running" | "run" | "outdoor_running" => Sport::Running,
            _ => Sport::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Biking => "Biking",
            Sport::Running => "Running",
            Sport::Other => "Other",
        }
    }
}

/// A finished TCX document. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcxDocument(String);

impl TcxDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }
}

/// ISO-8601 UTC with a literal `Z`, second precision.
pub fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Fixed-point decimal that never renders as negative zero.
fn fixed(v: f64, places: usize) -> String {
    let s = format!("{v:.places$}");
    match s.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => s,
    }
}

fn whole(v: f64, max: u32) -> String {
    (v.max(0.0).round() as u64).min(max as u64).to_string()
}

fn invalid(msg: impl Into<String>) -> ExportError {
    ExportError::InvalidInput(msg.into())
}

fn xml_err(e: impl std::fmt::Display) -> ExportError {
    ExportError::Xml(e.to_string())
}

/// Thin wrapper over the quick-xml writer mapping its errors into ours.
struct TcxWriter {
    inner: Writer<Vec<u8>>,
}

impl TcxWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn declaration(&mut self) -> Result<(), ExportError> {
        self.inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)
    }

    fn start_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.inner.write_event(Event::Start(el)).map_err(xml_err)
    }

    fn start(&mut self, name: &str) -> Result<(), ExportError> {
        self.start_with(name, &[])
    }

    fn end(&mut self, name: &str) -> Result<(), ExportError> {
        self.inner
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)
    }

    fn empty(&mut self, name: &str) -> Result<(), ExportError> {
        self.inner
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(xml_err)
    }

    fn text(&mut self, name: &str, value: &str) -> Result<(), ExportError> {
        self.start(name)?;
        self.inner
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(xml_err)?;
        self.end(name)
    }

    /// `<name><Value>value</Value></name>`, the TCX heart rate shape.
    fn value(&mut self, name: &str, value: &str) -> Result<(), ExportError> {
        self.start(name)?;
        self.text("Value", value)?;
        self.end(name)
    }

    fn finish(self) -> Result<TcxDocument, ExportError> {
        String::from_utf8(self.inner.into_inner())
            .map(TcxDocument)
            .map_err(xml_err)
    }
}

fn validate(activity: &Activity, samples: &SampleSeries) -> Result<DateTime<Utc>, ExportError> {
    if activity.id.trim().is_empty() {
        return Err(invalid("activity id is empty"));
    }
    let start = activity
        .start_time
        .ok_or_else(|| invalid(format!("activity {} has no start time", activity.id)))?;
    if !activity.duration_seconds.is_finite() || activity.duration_seconds < 0.0 {
        return Err(invalid(format!(
            "activity {} has invalid duration {}",
            activity.id, activity.duration_seconds
        )));
    }
    if let Some(idx) = samples.first_out_of_order() {
        return Err(invalid(format!(
            "sample {idx} of activity {} precedes its predecessor",
            activity.id
        )));
    }
    for (idx, s) in samples.iter().enumerate() {
        let values = [
            s.speed,
            s.power_watts,
            s.resistance,
            s.incline,
            s.altitude_meters,
            s.distance_meters,
            s.latitude,
            s.longitude,
        ];
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(invalid(format!(
                "sample {idx} of activity {} has a non-finite value",
                activity.id
            )));
        }
        if let Some((lat, lon)) = s.position() {
            if lat.abs() > 90.0 || lon.abs() > 180.0 {
                return Err(invalid(format!(
                    "sample {idx} of activity {} has out-of-range coordinates",
                    activity.id
                )));
            }
        }
    }
    Ok(start)
}

/// Running distance per sample, or `None` when the series carries neither
/// speed nor distance.
pub fn cumulative_distances(samples: &[Sample]) -> Option<Vec<f64>> {
    if !samples
        .iter()
        .any(|s| s.speed.is_some() || s.distance_meters.is_some())
    {
        return None;
    }
    let mut out = Vec::with_capacity(samples.len());
    let mut total = 0.0;
    let mut prev: Option<&Sample> = None;
    for s in samples {
        if let Some(d) = s.distance_meters {
            total = d;
        } else if let Some(p) = prev {
            let dt = f64::from(s.elapsed_seconds.saturating_sub(p.elapsed_seconds));
            let v0 = p.speed.unwrap_or(0.0);
            let v1 = s.speed.unwrap_or(0.0);
            total += (v0 + v1) / 2.0 * dt;
        }
        out.push(total);
        prev = Some(s);
    }
    Some(out)
}

fn activity_notes(activity: &Activity) -> String {
    match &activity.instructor {
        Some(i) if !i.full_name().is_empty() => format!("{} with {}", activity.title, i.full_name()),
        _ => activity.title.clone(),
    }
}

/// Build the TCX document for one workout.
///
/// Fails with [`ExportError::InvalidInput`] when a required field is missing
/// or a sample violates the model invariants; optional values that are absent
/// are simply left out.
pub fn build(
    activity: &Activity,
    summary: &Summary,
    samples: &SampleSeries,
) -> Result<TcxDocument, ExportError> {
    let start = validate(activity, samples)?;
    let start_str = format_time(start);
    let sport = Sport::from_discipline(activity.discipline.as_deref());

    let mut w = TcxWriter::new();
    w.declaration()?;
    w.start_with(
        "TrainingCenterDatabase",
        &[
            ("xmlns", TCD_NS),
            ("xmlns:xsi", XSI_NS),
            ("xsi:schemaLocation", SCHEMA_LOCATION),
            ("xmlns:ns3", ACTIVITY_EXT_NS),
            ("xmlns:pel", VENDOR_EXT_NS),
        ],
    )?;
    w.start("Activities")?;
    w.start_with("Activity", &[("Sport", sport.as_str())])?;
    w.text("Id", &start_str)?;

    write_lap(&mut w, sport, activity, summary, samples, start, &start_str)?;

    w.text("Notes", &activity_notes(activity))?;
    w.end("Activity")?;
    w.end("Activities")?;
    w.end("TrainingCenterDatabase")?;
    w.finish()
}

fn write_lap(
    w: &mut TcxWriter,
    sport: Sport,
    activity: &Activity,
    summary: &Summary,
    samples: &SampleSeries,
    start: DateTime<Utc>,
    start_str: &str,
) -> Result<(), ExportError> {
    let distance = summary
        .distance_meters
        .or(activity.total_distance_meters)
        .unwrap_or(0.0);
    let calories = summary
        .energy_kcal
        .or(activity.total_energy_kcal)
        .unwrap_or(0.0);

    w.start_with("Lap", &[("StartTime", start_str)])?;
    w.text("TotalTimeSeconds", &fixed(activity.duration_seconds, 1))?;
    w.text("DistanceMeters", &fixed(distance, 1))?;
    if let Some(max_speed) = summary.max_speed {
        w.text("MaximumSpeed", &fixed(max_speed, 1))?;
    }
    w.text("Calories", &whole(calories, u16::MAX as u32))?;
    if let Some(hr) = summary.avg_heart_rate {
        w.value("AverageHeartRateBpm", &whole(f64::from(hr), 255))?;
    }
    if let Some(hr) = summary.max_heart_rate {
        w.value("MaximumHeartRateBpm", &whole(f64::from(hr), 255))?;
    }
    w.text("Intensity", "Active")?;
    if let Some(cadence) = summary.avg_cadence {
        w.text("Cadence", &whole(f64::from(cadence), 254))?;
    }
    w.text("TriggerMethod", "Manual")?;

    write_track(w, samples, start)?;

    // MaxBikeCadence only makes sense for rides
    let max_bike_cadence = summary.max_cadence.filter(|_| sport == Sport::Biking);
    let has_lap_ext = summary.avg_speed.is_some()
        || max_bike_cadence.is_some()
        || summary.avg_power_watts.is_some()
        || summary.max_power_watts.is_some();
    if has_lap_ext {
        w.start("Extensions")?;
        w.start("ns3:LX")?;
        if let Some(v) = summary.avg_speed {
            w.text("ns3:AvgSpeed", &fixed(v, 1))?;
        }
        if let Some(v) = max_bike_cadence {
            w.text("ns3:MaxBikeCadence", &whole(f64::from(v), 254))?;
        }
        if let Some(v) = summary.avg_power_watts {
            w.text("ns3:AvgWatts", &whole(v, u16::MAX as u32))?;
        }
        if let Some(v) = summary.max_power_watts {
            w.text("ns3:MaxWatts", &whole(v, u16::MAX as u32))?;
        }
        w.end("ns3:LX")?;
        w.end("Extensions")?;
    }
    w.end("Lap")
}

fn write_track(
    w: &mut TcxWriter,
    samples: &SampleSeries,
    start: DateTime<Utc>,
) -> Result<(), ExportError> {
    if samples.is_empty() {
        return w.empty("Track");
    }
    let distances = cumulative_distances(&samples.samples);

    w.start("Track")?;
    for (idx, s) in samples.iter().enumerate() {
        let time = start + Duration::seconds(i64::from(s.elapsed_seconds));
        w.start("Trackpoint")?;
        w.text("Time", &format_time(time))?;
        if let Some((lat, lon)) = s.position() {
            w.start("Position")?;
            w.text("LatitudeDegrees", &fixed(lat, 7))?;
            w.text("LongitudeDegrees", &fixed(lon, 7))?;
            w.end("Position")?;
        }
        if let Some(alt) = s.altitude_meters {
            w.text("AltitudeMeters", &fixed(alt, 1))?;
        }
        if let Some(d) = distances.as_ref().and_then(|d| d.get(idx)) {
            w.text("DistanceMeters", &fixed(*d, 1))?;
        }
        // zero means no strap, and the schema minimum is 1
        if let Some(hr) = s.heart_rate.filter(|hr| *hr > 0) {
            w.value("HeartRateBpm", &whole(f64::from(hr), 255))?;
        }
        if let Some(cadence) = s.cadence {
            w.text("Cadence", &whole(f64::from(cadence), 254))?;
        }
        write_trackpoint_extensions(w, s)?;
        w.end("Trackpoint")?;
    }
    w.end("Track")
}

fn write_trackpoint_extensions(w: &mut TcxWriter, s: &Sample) -> Result<(), ExportError> {
    let has_tpx = s.speed.is_some() || s.power_watts.is_some();
    if !has_tpx && s.resistance.is_none() && s.incline.is_none() {
        return Ok(());
    }
    w.start("Extensions")?;
    if has_tpx {
        w.start("ns3:TPX")?;
        if let Some(v) = s.speed {
            w.text("ns3:Speed", &fixed(v, 1))?;
        }
        if let Some(v) = s.power_watts {
            w.text("ns3:Watts", &whole(v, u16::MAX as u32))?;
        }
        w.end("ns3:TPX")?;
    }
    if let Some(v) = s.resistance {
        w.text("pel:Resistance", &fixed(v, 1))?;
    }
    if let Some(v) = s.incline {
        w.text("pel:Incline", &fixed(v, 1))?;
    }
    w.end("Extensions")
}
