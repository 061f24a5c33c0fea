use peloton_export::{ActivityOutcome, ExportConfig, ExportError, ExportService, SinkTarget};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_peloton(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"user_id": "u1", "session_id": "sess"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/u1/workouts"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "w1"}, {"id": "w2"}],
            "page_count": 1
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/workout/w1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "w1",
            "start_time": 1672574400,
            "end_time": 1672576200,
            "fitness_discipline": "cycling",
            "peloton": {"ride": {
                "title": "Power Zone",
                "duration": 1800,
                "instructor": {"first_name": "Jane", "last_name": "Doe"}
            }}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/workout/w1/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "distance": 10.0,
            "calories": 400,
            "avg_heart_rate": 140,
            "max_heart_rate": 172
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/workout/w1/performance_graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "seconds_since_pedaling_start": [0, 1, 2],
            "metrics": [
                {"slug": "heart_rate", "display_unit": "bpm", "values": [120, 121, 122]},
                {"slug": "output", "display_unit": "watts", "values": [150, 160, 170]},
                {"slug": "speed", "display_unit": "mph", "values": [18.0, 18.0, 18.0]}
            ]
        })))
        .mount(server)
        .await;
    // w2 is gone upstream; 404 is not retried
    Mock::given(method("GET"))
        .and(path("/api/workout/w2"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such workout"))
        .mount(server)
        .await;
    for facet in ["summary", "performance_graph"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/workout/w2/{facet}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }
}

fn service(server: &MockServer, dir: &std::path::Path) -> ExportService {
    ExportService::new(ExportConfig {
        num_activities: 5,
        target: SinkTarget::LocalDir(dir.to_path_buf()),
        base_url: Some(server.uri()),
        ..ExportConfig::default()
    })
}

#[tokio::test]
async fn exports_recent_workouts_to_user_directory() {
    let server = MockServer::start().await;
    mount_peloton(&server).await;
    let tmp = tempfile::tempdir().expect("tempdir");

    let report = service(&server, tmp.path())
        .export("rider@example.com", SecretString::new("pw".into()))
        .await
        .expect("report");

    assert_eq!(report.outcomes.len(), 2);
    let name = match &report.outcomes[0] {
        ActivityOutcome::Written {
            activity_id,
            filename,
        } => {
            assert_eq!(activity_id, "w1");
            filename.clone()
        }
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(name, "1672574400-Power Zone with Jane Doe-w1.tcx");
    assert!(matches!(
        &report.outcomes[1],
        ActivityOutcome::Failed { activity_id, error: ExportError::Fetch(_) } if activity_id == "w2"
    ));

    let xml = std::fs::read_to_string(tmp.path().join("rider@example.com").join(&name))
        .expect("written file");
    assert!(xml.contains("<Id>2023-01-01T12:00:00Z</Id>"));
    assert!(xml.contains("<Activity Sport=\"Biking\">"));
    assert_eq!(xml.matches("<Trackpoint>").count(), 3);
    assert!(xml.contains("<ns3:Watts>160</ns3:Watts>"));
    assert!(xml.contains("<Notes>Power Zone with Jane Doe</Notes>"));

    let dir_entries = std::fs::read_dir(tmp.path().join("rider@example.com"))
        .expect("dir")
        .count();
    assert_eq!(dir_entries, 1);
}

#[tokio::test]
async fn rejected_login_fails_before_any_write() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;
    let tmp = tempfile::tempdir().expect("tempdir");

    let err = service(&server, tmp.path())
        .export("rider@example.com", SecretString::new("wrong".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExportError::Fetch(peloton_client::PelotonError::Auth(_))
    ));
    assert!(!tmp.path().join("rider@example.com").exists());
}
