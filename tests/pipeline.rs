//! Pipeline Integration Tests
//!
//! End-to-end runs against mocked helpdesk, speech, and mail services.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};

use callscribe::adapters::helpdesk::created_in_window_query;
use callscribe::config::{HelpdeskSettings, MailSettings, Settings, SpeechSettings};
use callscribe::domain::ResolutionStrategy;
use callscribe::{CallDuration, DayWindow, PaginationPolicy, Pipeline, RetryPolicy};

const ORG: &str = "Brooklyn Low Voltage Supply";

fn test_settings(base: &str, home: PathBuf) -> Settings {
    Settings {
        helpdesk: HelpdeskSettings {
            subdomain: "example".to_string(),
            email: "agent@example.com".to_string(),
            api_token: "token123".to_string(),
            base_url: base.to_string(),
        },
        speech: SpeechSettings {
            api_key: "sk-test".to_string(),
            base_url: base.to_string(),
            transcription_model: "whisper-1".to_string(),
            completion_model: "gpt-4o".to_string(),
        },
        mail: MailSettings {
            tenant_id: "tenant1".to_string(),
            client_id: "client1".to_string(),
            client_secret: "secret1".to_string(),
            login_base_url: base.to_string(),
            graph_base_url: base.to_string(),
            from: "reports@example.com".to_string(),
            to: "ops@example.com".to_string(),
        },
        organization: ORG.to_string(),
        window_start_hour: 4,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base_secs: 0,
        },
        pagination: PaginationPolicy::SkipOnError,
        resolution: ResolutionStrategy::Phrase,
        home,
        config_file: None,
    }
}

/// Minimal mono 16-bit PCM WAV of the given length, all silence.
fn wav_bytes(sample_rate: u32, seconds: u32) -> Vec<u8> {
    let data_len = sample_rate * seconds * 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);
    bytes
}

/// The run recomputes its window from the clock, so accept the query
/// for either side of a UTC date rollover between setup and run.
fn search_query_matcher(window_start_hour: u32) -> Matcher {
    let now = Utc::now();
    let windows = [now, now + Duration::days(1)]
        .into_iter()
        .map(|anchor| {
            let window = DayWindow::days_back_from(anchor, 1, window_start_hour);
            Matcher::UrlEncoded("query".into(), created_in_window_query(&window))
        })
        .collect();
    Matcher::AllOf(vec![
        Matcher::AnyOf(windows),
        Matcher::UrlEncoded("sort_by".into(), "created_at".into()),
    ])
}

#[tokio::test]
async fn test_run_processes_recordings_and_sends_digest() {
    let mut server = Server::new_async().await;
    let home = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.url(), home.path().to_path_buf());

    let search = server
        .mock("GET", "/search.json")
        .match_query(search_query_matcher(4))
        .with_body(
            serde_json::json!({
                "results": [{ "id": 42 }, { "id": 43 }],
                "next_page": null
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    // Ticket 42: call placed through the account's own line, so the
    // customer is the "to" party.
    let recording_url = format!("{}/recordings/42.mp3", server.url());
    let _comments_42 = server
        .mock("GET", "/tickets/42/comments.json")
        .with_body(
            serde_json::json!({
                "comments": [
                    { "body": "Ticket created" },
                    {
                        "data": {
                            "recording_url": recording_url,
                            "answered_by_name": "Dana"
                        },
                        "via": {
                            "source": {
                                "from": { "name": ORG },
                                "to": { "name": "Jordan Lee" }
                            }
                        }
                    }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    // Ticket 43: no recording comment at all.
    let _comments_43 = server
        .mock("GET", "/tickets/43/comments.json")
        .with_body(serde_json::json!({ "comments": [{ "body": "Caller hung up" }] }).to_string())
        .create_async()
        .await;

    let _recording = server
        .mock("GET", "/recordings/42.mp3")
        .with_body(wav_bytes(8000, 5))
        .create_async()
        .await;

    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .with_body(serde_json::json!({ "text": "Customer call transcript." }).to_string())
        .expect(1)
        .create_async()
        .await;

    let summarize = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(
            "customer Jordan Lee and how agent Dana".to_string(),
        ))
        .with_body(
            serde_json::json!({
                "choices": [{ "message": { "content":
                    "Jordan Lee reported a dead intercom panel. Dana walked them through a replacement. This issue was resolved."
                } }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let company = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(
            "what company does the customer work for".to_string(),
        ))
        .with_body(
            serde_json::json!({
                "choices": [{ "message": { "content": "Acme Corp" } }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let upload = server
        .mock("POST", "/uploads.json")
        .match_query(Matcher::UrlEncoded(
            "filename".into(),
            "transcription_42".into(),
        ))
        .match_header("content-type", "text/plain")
        .with_body(serde_json::json!({ "upload": { "token": "tok123" } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let update = server
        .mock("PUT", "/tickets/42")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("tok123".to_string()),
            Matcher::Regex(r#""public":false"#.to_string()),
        ]))
        .with_body(serde_json::json!({ "ticket": { "id": 42 } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let _token = server
        .mock("POST", "/tenant1/oauth2/v2.0/token")
        .with_body(
            serde_json::json!({
                "access_token": "mail-token",
                "token_type": "Bearer",
                "expires_in": 3599
            })
            .to_string(),
        )
        .create_async()
        .await;

    // Unresolved tickets come first in the digest, so 43 before 42.
    let send_mail = server
        .mock("POST", "/users/reports@example.com/sendMail")
        .match_header("authorization", "Bearer mail-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("(?s)Ticket 43: Not Resolved.*Ticket 42: Resolved".to_string()),
            Matcher::Regex("Acme Corp".to_string()),
            Matcher::Regex("This issue was resolved".to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let pipeline = Pipeline::from_settings(settings);
    let report = pipeline.run(1, false).await.unwrap();

    assert_eq!(report.discovered, 2);
    assert_eq!(report.with_recording, 1);
    assert_eq!(report.transcribed, 1);
    assert_eq!(report.summarized, 1);
    assert_eq!(report.annotated, 1);
    assert_eq!(report.skipped, 0);
    assert!(report.digest_sent);

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].id, 43);
    assert_eq!(report.records[1].id, 42);

    let full = &report.records[1];
    assert_eq!(full.customer, "Jordan Lee");
    assert_eq!(full.agent, "Dana");
    assert_eq!(full.company, "Acme Corp");
    assert_eq!(full.duration, Some(CallDuration::from_seconds(5)));
    assert!(full.resolved);

    // The ticket without a recording stays blank in every field.
    let bare = &report.records[0];
    assert!(bare.summary.is_empty());
    assert!(bare.company.is_empty());
    assert!(bare.duration.is_none());
    assert!(!bare.resolved);

    let run_dir = home.path().join("runs").join(&report.run_id);
    let transcript = std::fs::read_to_string(run_dir.join("transcripts/transcription_42.txt"));
    assert_eq!(transcript.unwrap(), "Customer call transcript.");
    assert!(!run_dir.join("recordings").exists());

    search.assert_async().await;
    transcription.assert_async().await;
    summarize.assert_async().await;
    company.assert_async().await;
    upload.assert_async().await;
    update.assert_async().await;
    send_mail.assert_async().await;
}

#[tokio::test]
async fn test_run_skips_ticket_when_recording_download_fails() {
    let mut server = Server::new_async().await;
    let home = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.url(), home.path().to_path_buf());

    let _search = server
        .mock("GET", "/search.json")
        .match_query(search_query_matcher(4))
        .with_body(serde_json::json!({ "results": [{ "id": 17 }], "next_page": null }).to_string())
        .create_async()
        .await;

    let recording_url = format!("{}/recordings/17.mp3", server.url());
    let _comments = server
        .mock("GET", "/tickets/17/comments.json")
        .with_body(
            serde_json::json!({
                "comments": [{
                    "data": {
                        "recording_url": recording_url,
                        "answered_by_name": "Dana"
                    },
                    "via": {
                        "source": {
                            "from": { "name": "Pat Doe" },
                            "to": { "name": "Support Line" }
                        }
                    }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let download = server
        .mock("GET", "/recordings/17.mp3")
        .with_status(404)
        .with_body("no such recording")
        .expect(1)
        .create_async()
        .await;

    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .expect(0)
        .create_async()
        .await;

    let update = server
        .mock("PUT", "/tickets/17")
        .expect(0)
        .create_async()
        .await;

    let _token = server
        .mock("POST", "/tenant1/oauth2/v2.0/token")
        .with_body(serde_json::json!({ "access_token": "mail-token" }).to_string())
        .create_async()
        .await;

    // The skipped ticket still gets a digest block, fields left blank.
    let send_mail = server
        .mock("POST", "/users/reports@example.com/sendMail")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Ticket 17: Not Resolved".to_string()),
            Matcher::Regex("<p><b>Duration:</b> </p>".to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let pipeline = Pipeline::from_settings(settings);
    let report = pipeline.run(1, false).await.unwrap();

    assert_eq!(report.discovered, 1);
    assert_eq!(report.with_recording, 1);
    assert_eq!(report.transcribed, 0);
    assert_eq!(report.annotated, 0);
    assert_eq!(report.skipped, 1);
    assert!(report.digest_sent);

    let record = &report.records[0];
    assert!(record.duration.is_none());
    assert!(record.summary.is_empty());

    let error_log = home
        .path()
        .join("runs")
        .join(&report.run_id)
        .join("error.log");
    let logged = std::fs::read_to_string(error_log).unwrap();
    assert!(logged.contains("[ticket 17] download failed"));

    download.assert_async().await;
    transcription.assert_async().await;
    update.assert_async().await;
    send_mail.assert_async().await;
}

#[tokio::test]
async fn test_run_skips_malformed_recording_before_transcription() {
    let mut server = Server::new_async().await;
    let home = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.url(), home.path().to_path_buf());

    let _search = server
        .mock("GET", "/search.json")
        .match_query(search_query_matcher(4))
        .with_body(serde_json::json!({ "results": [{ "id": 23 }], "next_page": null }).to_string())
        .create_async()
        .await;

    let recording_url = format!("{}/recordings/23.mp3", server.url());
    let _comments = server
        .mock("GET", "/tickets/23/comments.json")
        .with_body(
            serde_json::json!({
                "comments": [{
                    "data": {
                        "recording_url": recording_url,
                        "answered_by_name": "Dana"
                    },
                    "via": {
                        "source": {
                            "from": { "name": "Pat Doe" },
                            "to": { "name": "Support Line" }
                        }
                    }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    // Downloads fine but holds no audio container.
    let _recording = server
        .mock("GET", "/recordings/23.mp3")
        .with_body("definitely not audio")
        .create_async()
        .await;

    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .expect(0)
        .create_async()
        .await;

    let update = server
        .mock("PUT", "/tickets/23")
        .expect(0)
        .create_async()
        .await;

    let _token = server
        .mock("POST", "/tenant1/oauth2/v2.0/token")
        .with_body(serde_json::json!({ "access_token": "mail-token" }).to_string())
        .create_async()
        .await;

    let send_mail = server
        .mock("POST", "/users/reports@example.com/sendMail")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Ticket 23: Not Resolved".to_string()),
            Matcher::Regex("<p><b>Duration:</b> </p>".to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let pipeline = Pipeline::from_settings(settings);
    let report = pipeline.run(1, false).await.unwrap();

    assert_eq!(report.with_recording, 1);
    assert_eq!(report.transcribed, 0);
    assert_eq!(report.summarized, 0);
    assert_eq!(report.skipped, 1);
    assert!(report.digest_sent);
    assert!(report.records[0].duration.is_none());

    let error_log = home
        .path()
        .join("runs")
        .join(&report.run_id)
        .join("error.log");
    let logged = std::fs::read_to_string(error_log).unwrap();
    assert!(logged.contains("[ticket 23] malformed audio"));

    transcription.assert_async().await;
    update.assert_async().await;
    send_mail.assert_async().await;
}

#[tokio::test]
async fn test_run_empty_window_still_sends_digest() {
    let mut server = Server::new_async().await;
    let home = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.url(), home.path().to_path_buf());

    let _search = server
        .mock("GET", "/search.json")
        .match_query(search_query_matcher(4))
        .with_body(serde_json::json!({ "results": [], "next_page": null }).to_string())
        .create_async()
        .await;

    let _token = server
        .mock("POST", "/tenant1/oauth2/v2.0/token")
        .with_body(serde_json::json!({ "access_token": "mail-token" }).to_string())
        .create_async()
        .await;

    let send_mail = server
        .mock("POST", "/users/reports@example.com/sendMail")
        .match_body(Matcher::Regex(
            "No voice tickets were found".to_string(),
        ))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let pipeline = Pipeline::from_settings(settings);
    let report = pipeline.run(1, false).await.unwrap();

    assert_eq!(report.discovered, 0);
    assert!(report.records.is_empty());
    assert!(report.digest_sent);
    send_mail.assert_async().await;
}

#[tokio::test]
async fn test_run_survives_digest_mail_failure() {
    let mut server = Server::new_async().await;
    let home = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.url(), home.path().to_path_buf());

    let _search = server
        .mock("GET", "/search.json")
        .match_query(search_query_matcher(4))
        .with_body(serde_json::json!({ "results": [], "next_page": null }).to_string())
        .create_async()
        .await;

    let _token = server
        .mock("POST", "/tenant1/oauth2/v2.0/token")
        .with_status(401)
        .with_body(serde_json::json!({ "error": "invalid_client" }).to_string())
        .create_async()
        .await;

    let pipeline = Pipeline::from_settings(settings);
    let report = pipeline.run(1, false).await.unwrap();

    assert!(!report.digest_sent);
    let error_log = home
        .path()
        .join("runs")
        .join(&report.run_id)
        .join("error.log");
    let logged = std::fs::read_to_string(error_log).unwrap();
    assert!(logged.contains("digest mail failed"));
}

#[tokio::test]
async fn test_preview_reads_metadata_without_side_effects() {
    let mut server = Server::new_async().await;
    let home = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.url(), home.path().join("never-created"));

    let _search = server
        .mock("GET", "/search.json")
        .match_query(search_query_matcher(4))
        .with_body(
            serde_json::json!({
                "results": [{ "id": 42 }, { "id": 43 }],
                "next_page": null
            })
            .to_string(),
        )
        .create_async()
        .await;

    let recording_url = format!("{}/recordings/42.mp3", server.url());
    let _comments_42 = server
        .mock("GET", "/tickets/42/comments.json")
        .with_body(
            serde_json::json!({
                "comments": [{
                    "data": {
                        "recording_url": recording_url,
                        "answered_by_name": "Dana"
                    },
                    "via": {
                        "source": {
                            "from": { "name": "Pat Doe" },
                            "to": { "name": "Support Line" }
                        }
                    }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let _comments_43 = server
        .mock("GET", "/tickets/43/comments.json")
        .with_body(serde_json::json!({ "comments": [] }).to_string())
        .create_async()
        .await;

    let download = server
        .mock("GET", "/recordings/42.mp3")
        .expect(0)
        .create_async()
        .await;
    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .expect(0)
        .create_async()
        .await;

    let pipeline = Pipeline::from_settings(settings);
    let records = pipeline.preview(1).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 42);
    assert_eq!(records[0].customer, "Pat Doe");
    assert_eq!(records[0].agent, "Dana");
    assert!(records[0].recording_url.is_some());
    assert!(records[1].recording_url.is_none());

    // Preview downloads nothing and leaves no run directory behind.
    download.assert_async().await;
    transcription.assert_async().await;
    assert!(!home.path().join("never-created").exists());
}
