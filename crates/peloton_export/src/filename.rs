//! Deterministic output filenames.
//!
//! `{start_epoch}-{title}{ with First Last}-{id}.tcx`. The activity id makes
//! every name unique even when start time and title collide. Names never
//! exceed [`MAX_FILENAME_BYTES`]; the title part is shortened first.

use peloton_client::Activity;

const REPLACEMENT: char = '-';

/// Below the common 255-byte component limit, leaving room for the
/// `.{name}.partial` staging file of [`crate::sink::LocalDirSink`].
pub const MAX_FILENAME_BYTES: usize = 240;

/// Replace path-hostile characters so the result is safe as a single path
/// component on common filesystems and object stores.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => REPLACEMENT,
            c if c.is_control() => REPLACEMENT,
            c => c,
        })
        .collect()
}

fn instructor_suffix(activity: &Activity) -> String {
    match &activity.instructor {
        Some(i) if !i.full_name().is_empty() => format!(" with {}", sanitize(&i.full_name())),
        _ => String::new(),
    }
}

/// Longest prefix of `text` within `max` bytes, cut at a char boundary.
fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Filename for the TCX document of `activity`. Total over any input.
pub fn filename(activity: &Activity) -> String {
    let epoch = activity.start_time.map_or(0, |t| t.timestamp());
    let head = format!("{epoch}-");
    let id = sanitize(&activity.id);
    // "-" + id + ".tcx" always survives; only absurd ids are cut
    let id = truncate_bytes(&id, MAX_FILENAME_BYTES - head.len() - 5);
    let tail = format!("-{id}.tcx");

    let body = format!(
        "{}{}",
        sanitize(activity.title.trim()),
        instructor_suffix(activity)
    );
    let budget = MAX_FILENAME_BYTES - head.len() - tail.len();
    let body = truncate_bytes(&body, budget).trim_end();

    format!("{head}{body}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use peloton_client::Instructor;

    fn activity(id: &str, title: &str, instructor: Option<(&str, &str)>) -> Activity {
        Activity {
            id: id.into(),
            start_time: DateTime::<Utc>::from_timestamp(1_672_574_400, 0),
            title: title.into(),
            instructor: instructor.map(|(f, l)| Instructor {
                first_name: f.into(),
                last_name: l.into(),
            }),
            discipline: None,
            duration_seconds: 1800.0,
            total_distance_meters: None,
            total_energy_kcal: None,
        }
    }

    #[test]
    fn includes_instructor_suffix() {
        let a = activity("42", "Power Zone", Some(("Jane", "Doe")));
        assert_eq!(filename(&a), "1672574400-Power Zone with Jane Doe-42.tcx");
    }

    #[test]
    fn omits_suffix_without_instructor() {
        let a = activity("42", "Just Ride", None);
        assert_eq!(filename(&a), "1672574400-Just Ride-42.tcx");
    }

    #[test]
    fn sanitizes_slashes_and_colons() {
        assert_eq!(sanitize("Tabata: HIIT/Strength"), "Tabata- HIIT-Strength");
        let a = activity("7", "Tabata: HIIT/Strength", None);
        let name = filename(&a);
        assert_eq!(name, "1672574400-Tabata- HIIT-Strength-7.tcx");
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn sanitize_is_total_over_hostile_input() {
        let hostile = "a\\b*c?d\"e<f>g|h\n\u{0}i";
        let out = sanitize(hostile);
        assert_eq!(out.chars().count(), hostile.chars().count());
        assert!(out.chars().all(|c| !"/\\:*?\"<>|".contains(c) && !c.is_control()));
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("Fahrt über 20 km 🚴"), "Fahrt über 20 km 🚴");
    }

    #[test]
    fn differing_ids_never_collide() {
        let a = activity("1", "Same", Some(("Jane", "Doe")));
        let b = activity("2", "Same", Some(("Jane", "Doe")));
        assert_ne!(filename(&a), filename(&b));
    }

    #[test]
    fn missing_start_time_renders_zero() {
        let mut a = activity("9", "Scenic", None);
        a.start_time = None;
        assert_eq!(filename(&a), "0-Scenic-9.tcx");
    }

    #[test]
    fn long_multibyte_title_is_cut_to_fit() {
        let a = activity("f00dcafe", &"Fahrt über Berge 🚴 ".repeat(20), Some(("Jane", "Doe")));
        let name = filename(&a);
        assert!(name.len() <= MAX_FILENAME_BYTES, "{} bytes", name.len());
        assert!(name.starts_with("1672574400-Fahrt über Berge"));
        assert!(name.ends_with("-f00dcafe.tcx"));
    }

    #[tokio::test]
    async fn long_title_still_writes_to_disk() {
        use crate::sink::{LocalDirSink, Sink};

        let tmp = tempfile::tempdir().expect("tempdir");
        let a = activity("42", &"Power Zone Endurance ".repeat(15), None);
        let name = filename(&a);
        LocalDirSink::new(tmp.path())
            .write(&name, b"<xml/>")
            .await
            .expect("write");
        assert!(tmp.path().join(&name).exists());
    }

    #[test]
    fn oversized_id_keeps_extension() {
        let a = activity(&"9".repeat(400), "Ride", None);
        let name = filename(&a);
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.ends_with(".tcx"));
    }

    #[test]
    fn hostile_instructor_and_id_are_sanitized() {
        let a = activity("a/b", "Ride", Some(("J:", "D")));
        assert_eq!(filename(&a), "1672574400-Ride with J- D-a-b.tcx");
    }
}
