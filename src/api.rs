//! HTTP API server for lektor.
//!
//! Serves the place/article library, collects ratings and drives the
//! read-aloud narrator. Runs on port 8768 (configurable) using axum.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Error;
use crate::library::{Article, CompareRatingInput, Library, SingleRatingInput};
use crate::narration::{NarrationStatus, Sequencer, SettingsStore, SettingsUpdate, Voice, VoiceSettings};
use crate::reader::{align, NarrationScript};

/// The server-side narrator and the article it has loaded.
pub struct Narrator {
    pub sequencer: Sequencer,
    pub available: bool,
    loaded: Mutex<Option<(String, String)>>,
}

impl Narrator {
    pub fn new(sequencer: Sequencer, available: bool) -> Self {
        Self {
            sequencer,
            available,
            loaded: Mutex::new(None),
        }
    }

    fn loaded(&self) -> Option<(String, String)> {
        self.loaded.lock().unwrap().clone()
    }

    /// Current sentence if `place_id`/`style` is the loaded article.
    fn highlight_for(&self, place_id: &str, style: &str) -> Option<usize> {
        let (loaded_place, loaded_style) = self.loaded()?;
        if loaded_place == place_id && loaded_style == style {
            self.sequencer.status().current_index
        } else {
            None
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub library: Arc<Library>,
    pub settings: Arc<SettingsStore>,
    pub narrator: Arc<Narrator>,
    pub voices: Arc<Vec<Voice>>,
}

// --- Request/Response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArticleResponse {
    #[serde(flatten)]
    article: Article,
    html: String,
    script: NarrationScript,
    speech_available: bool,
}

#[derive(Serialize)]
struct SaveResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceResponse {
    settings: VoiceSettings,
    voices: Vec<Voice>,
    speech_available: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadRequest {
    place_id: String,
    style: String,
}

#[derive(Deserialize, Default)]
struct PlayRequest {
    sentence: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NarrationResponse {
    speech_available: bool,
    #[serde(flatten)]
    status: NarrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    place_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sentences: Option<usize>,
}

/// Error body: `{"error": "..."}`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Speech(_) | Error::NarrationClosed => StatusCode::SERVICE_UNAVAILABLE,
            Error::Io(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("API error: {}", self.0);
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/places", get(handle_places))
        .route("/places/{id}", get(handle_place))
        .route("/articles/{place_id}/{style}", get(handle_article))
        .route("/rate-single", get(handle_single_ratings).post(handle_rate_single))
        .route("/rate-compare", get(handle_compare_ratings).post(handle_rate_compare))
        .route("/voice", get(handle_voice).post(handle_set_voice))
        .route("/narration/load", post(handle_narration_load))
        .route("/narration/play", post(handle_narration_play))
        .route("/narration/pause", post(handle_narration_pause))
        .route("/narration/stop", post(handle_narration_stop))
        .route("/narration/status", get(handle_narration_status))
        .with_state(state)
}

/// Bind and serve until the server fails.
pub async fn serve(state: ApiState, host: &str, port: u16) -> std::io::Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {addr}");
    axum::serve(listener, app).await
}

// --- Library handlers ---

async fn handle_places(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.library.places().await?))
}

async fn handle_place(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.library.place(&id).await?))
}

async fn handle_article(
    State(state): State<ApiState>,
    Path((place_id, style)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let article = state.library.article(&place_id, &style).await?;
    let highlighted = state.narrator.highlight_for(&place_id, &style);
    let document = align(&article.content, highlighted);

    Ok(Json(ArticleResponse {
        html: document.to_html(),
        script: document.script,
        speech_available: state.narrator.available,
        article,
    }))
}

async fn handle_single_ratings(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.library.single_ratings().await)
}

async fn handle_compare_ratings(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.library.compare_ratings().await)
}

async fn handle_rate_single(State(state): State<ApiState>, Json(input): Json<SingleRatingInput>) -> Response {
    let saved = state.library.add_single_rating(input).await.map(|r| r.id);
    save_response(saved, "Failed to save rating")
}

async fn handle_rate_compare(State(state): State<ApiState>, Json(input): Json<CompareRatingInput>) -> Response {
    let saved = state.library.add_compare_rating(input).await.map(|r| r.id);
    save_response(saved, "Failed to save comparison")
}

fn save_response(saved: crate::Result<uuid::Uuid>, failure: &str) -> Response {
    match saved {
        Ok(id) => Json(SaveResponse {
            success: true,
            id: Some(id.to_string()),
            error: None,
        })
        .into_response(),
        Err(e) => {
            warn!("{failure}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SaveResponse {
                    success: false,
                    id: None,
                    error: Some(failure.to_string()),
                }),
            )
                .into_response()
        }
    }
}

// --- Voice handlers ---

async fn handle_voice(State(state): State<ApiState>) -> impl IntoResponse {
    Json(VoiceResponse {
        settings: state.settings.get(),
        voices: state.voices.as_ref().clone(),
        speech_available: state.narrator.available,
    })
}

async fn handle_set_voice(State(state): State<ApiState>, Json(update): Json<SettingsUpdate>) -> impl IntoResponse {
    let settings = state.settings.update(&update);
    info!("Voice settings changed: {settings:?}");
    Json(VoiceResponse {
        settings,
        voices: state.voices.as_ref().clone(),
        speech_available: state.narrator.available,
    })
}

// --- Narration handlers ---

fn require_speech(state: &ApiState) -> ApiResult<&Narrator> {
    if state.narrator.available {
        Ok(&state.narrator)
    } else {
        Err(Error::Speech("speech synthesis is not available".into()).into())
    }
}

fn narration_response(narrator: &Narrator, status: NarrationStatus, sentences: Option<usize>) -> NarrationResponse {
    let loaded = narrator.loaded();
    NarrationResponse {
        speech_available: narrator.available,
        status,
        place_id: loaded.as_ref().map(|(p, _)| p.clone()),
        style: loaded.map(|(_, s)| s),
        sentences,
    }
}

async fn handle_narration_load(
    State(state): State<ApiState>,
    Json(request): Json<LoadRequest>,
) -> ApiResult<impl IntoResponse> {
    let narrator = require_speech(&state)?;
    let article = state.library.article(&request.place_id, &request.style).await?;
    let script = NarrationScript::from_markdown(&article.content);
    let sentences = script.len();

    narrator.sequencer.load(script)?;
    *narrator.loaded.lock().unwrap() = Some((request.place_id, request.style));
    info!("Narration loaded: {} ({sentences} sentences)", article.title);

    let status = narrator.sequencer.sync().await?;
    Ok(Json(narration_response(narrator, status, Some(sentences))))
}

async fn handle_narration_play(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let narrator = require_speech(&state)?;
    // The body is optional: an empty POST resumes or starts from the top.
    let request: PlayRequest = if body.is_empty() {
        PlayRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(Error::from)?
    };
    match request.sentence {
        Some(index) => narrator.sequencer.play_from_sentence(index)?,
        None => narrator.sequencer.play()?,
    }
    // Reply with the state after the command, not before it.
    let status = narrator.sequencer.sync().await?;
    Ok(Json(narration_response(narrator, status, None)))
}

async fn handle_narration_pause(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let narrator = require_speech(&state)?;
    narrator.sequencer.pause()?;
    // Reply with the state after the command, not before it.
    let status = narrator.sequencer.sync().await?;
    Ok(Json(narration_response(narrator, status, None)))
}

async fn handle_narration_stop(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let narrator = require_speech(&state)?;
    narrator.sequencer.stop()?;
    // Reply with the state after the command, not before it.
    let status = narrator.sequencer.sync().await?;
    Ok(Json(narration_response(narrator, status, None)))
}

async fn handle_narration_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(narration_response(&state.narrator, state.narrator.sequencer.status(), None))
}
