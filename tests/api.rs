//! API endpoint integration tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use lektor::api::{self, ApiState, Narrator};
use lektor::config::NarrationConfig;
use lektor::library::Library;
use lektor::narration::{NarrationChannel, Sequencer, SettingsStore, Voice, VoiceSettings};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::ScriptedEngine;

const PLACES: &str = r#"[
    {"id": "wawel", "name": "Wawel", "thumbnail": "/img/wawel.jpg", "description": "Zamek królewski"},
    {"id": "rynek", "name": "Rynek Główny", "thumbnail": "", "description": "Plac"}
]"#;

const ARTICLE: &str = r##"{
    "placeId": "wawel",
    "style": "adult_short",
    "ageTarget": "adult",
    "volume": "short",
    "title": "Wawel w skrócie",
    "content": "# Wawel\n\nZamek stoi nad Wisłą. Zbudowano go w XIV wieku!"
}"##;

struct TestApp {
    _dir: tempfile::TempDir,
    state: ApiState,
    spoken: tokio::sync::mpsc::UnboundedReceiver<(lektor::narration::Utterance, lektor::narration::UtteranceEvents)>,
}

/// Build a test API state over a temporary data directory
fn test_app(speech_available: bool) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("places.json"), PLACES).unwrap();
    std::fs::create_dir_all(dir.path().join("articles")).unwrap();
    std::fs::write(dir.path().join("articles/wawel_adult_short.json"), ARTICLE).unwrap();

    let (engine, spoken) = ScriptedEngine::new(speech_available);
    let channel = Arc::new(NarrationChannel::new(engine));
    let settings = Arc::new(SettingsStore::new(VoiceSettings::default()));
    let (sequencer, _sentences) = Sequencer::spawn(channel, settings.subscribe(), &NarrationConfig::default());

    let state = ApiState {
        library: Arc::new(Library::new(dir.path())),
        settings,
        narrator: Arc::new(Narrator::new(sequencer, speech_available)),
        voices: Arc::new(vec![Voice {
            id: "pl".into(),
            name: "Polish".into(),
            language: "pl".into(),
        }]),
    };

    TestApp {
        _dir: dir,
        state,
        spoken,
    }
}

async fn send(state: &ApiState, request: Request<Body>) -> (StatusCode, Value) {
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(state: &ApiState, uri: &str) -> (StatusCode, Value) {
    send(state, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(state: &ApiState, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(state, request).await
}

#[tokio::test]
async fn test_places() {
    let app = test_app(true);

    let (status, body) = get(&app.state, "/places").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get(&app.state, "/places/rynek").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Rynek Główny");

    let (status, body) = get(&app.state, "/places/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_article_with_sentence_spans() {
    let app = test_app(true);

    let (status, body) = get(&app.state, "/articles/wawel/adult_short").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Wawel w skrócie");
    assert_eq!(body["ageTarget"], "adult");
    assert_eq!(body["speechAvailable"], true);

    let html = body["html"].as_str().unwrap();
    assert!(html.contains(r#"<h1><span class="sentence" data-sentence="0">Wawel</span></h1>"#));
    assert!(html.contains(r#"data-sentence="2">Zbudowano go w XIV wieku!</span>"#));
    assert!(!html.contains("highlighted"));

    let entries = body["script"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1], json!({"index": 1, "text": "Zamek stoi nad Wisłą."}));

    let (status, _) = get(&app.state, "/articles/wawel/child_full").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ratings() {
    let app = test_app(true);

    let (status, body) = post(
        &app.state,
        "/rate-single",
        json!({"placeId": "wawel", "articleStyle": "adult_short", "clarity": 5, "length": "too_long"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["id"].as_str().unwrap().to_string();

    let (_, body) = get(&app.state, "/rate-single").await;
    let ratings = body.as_array().unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0]["id"], id.as_str());
    assert_eq!(ratings[0]["length"], "too_long");

    let (status, body) = post(&app.state, "/rate-compare", json!({"placeId": "wawel", "bestOverall": "adult_short"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = get(&app.state, "/rate-compare").await;
    assert_eq!(body[0]["bestOverall"], "adult_short");
}

#[tokio::test]
async fn test_voice_settings() {
    let app = test_app(true);

    let (status, body) = get(&app.state, "/voice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["pauseDurationMs"], 300);
    assert_eq!(body["voices"][0]["id"], "pl");

    let (status, body) = post(&app.state, "/voice", json!({"rate": 1.5, "voice": "pl"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["rate"], 1.5);
    assert_eq!(body["settings"]["voice"], "pl");
    assert_eq!(app.state.settings.get().rate, 1.5);
}

#[tokio::test]
async fn test_narration_unavailable() {
    let app = test_app(false);

    let (status, body) = get(&app.state, "/narration/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speechAvailable"], false);

    let (status, _) = post(&app.state, "/narration/play", json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post(
        &app.state,
        "/narration/load",
        json!({"placeId": "wawel", "style": "adult_short"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, body) = get(&app.state, "/articles/wawel/adult_short").await;
    assert_eq!(body["speechAvailable"], false);
}

#[tokio::test]
async fn test_narration_load_and_play() {
    let mut app = test_app(true);

    let (status, body) = post(
        &app.state,
        "/narration/load",
        json!({"placeId": "wawel", "style": "adult_short"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sentences"], 3);
    assert_eq!(body["placeId"], "wawel");

    let (status, body) = post(&app.state, "/narration/play", json!({"sentence": 2})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPlaying"], true);

    let (utterance, events) = app.spoken.recv().await.unwrap();
    assert_eq!(utterance.text, "Zbudowano go w XIV wieku!");
    events.started();

    let mut status_rx = app.state.narrator.sequencer.subscribe();
    status_rx.wait_for(|s| s.current_index == Some(2)).await.unwrap();

    let (_, body) = get(&app.state, "/articles/wawel/adult_short").await;
    let html = body["html"].as_str().unwrap();
    assert!(html.contains(r#"<span class="sentence highlighted" data-sentence="2">"#));

    let (status, body) = post(&app.state, "/narration/pause", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speechAvailable"], true);
    assert_eq!(body["isPaused"], true);
    assert_eq!(body["isPlaying"], false);
    assert_eq!(body["currentIndex"], 2);

    let (status, body) = post(&app.state, "/narration/stop", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], true);
    assert_eq!(body["isPaused"], false);
    status_rx.wait_for(|s| s.stopped).await.unwrap();

    let (_, body) = get(&app.state, "/narration/status").await;
    assert_eq!(body["stopped"], true);
    assert_eq!(body["currentIndex"], Value::Null);
}

#[tokio::test]
async fn test_play_accepts_empty_body() {
    let mut app = test_app(true);
    post(
        &app.state,
        "/narration/load",
        json!({"placeId": "wawel", "style": "adult_short"}),
    )
    .await;

    let request = Request::builder()
        .method("POST")
        .uri("/narration/play")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.state, request).await;
    assert_eq!(status, StatusCode::OK);

    let (utterance, _) = app.spoken.recv().await.unwrap();
    assert_eq!(utterance.text, "Wawel");
}
