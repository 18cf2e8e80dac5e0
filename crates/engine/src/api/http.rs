//! HTTP routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;

use parley_shared::{
    ChatTurnRequest, CheckTaskRequest, CheckTaskResponse, DifficultyRequest, ErrorResponse,
    ExamplesRequest, ExamplesResponse, FeedbackRequest, FeedbackResponse, FeedbackStatus,
    GenerateTaskRequest, GenerateTaskResponse, NewSessionResponse, ScenarioRequest,
    SessionContextRequest, SessionContextResponse, SuggestionRequest, SuggestionResponse,
    TranslateRequest, TranslateResponse, VocabListRequest, VocabListResponse,
};

use crate::app::App;
use crate::session::{is_plausible_language, Difficulty};
use crate::use_cases::{ChatTurnError, ChatTurnInput, TranslateError, TurnEvent};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/session/new", post(new_session))
        .route("/api/session", post(session_context))
        .route("/api/chat", post(chat))
        .route("/api/feedback", post(feedback))
        .route("/api/check-task", post(check_task))
        .route("/api/translate", post(translate))
        .route("/api/generate-task", post(generate_task))
        .route("/api/vocab-list", post(vocab_list))
        .route("/api/suggest", post(suggest))
        .route("/api/scenario", post(scenario))
        .route("/api/difficulty", post(difficulty))
        .route("/api/examples", post(examples))
}

async fn health() -> &'static str {
    "OK"
}

async fn new_session(State(app): State<Arc<App>>) -> Json<NewSessionResponse> {
    let handle = app.sessions.create(None);
    let session = app.sessions.summary(&handle).await;
    let session_id = handle.read().await.id.clone();
    tracing::debug!(session_id = %session_id, "Created session");
    Json(NewSessionResponse {
        session_id,
        session,
    })
}

async fn session_context(
    State(app): State<Arc<App>>,
    Json(request): Json<SessionContextRequest>,
) -> Json<SessionContextResponse> {
    let (handle, created) = app.sessions.get_or_create(request.session_id.as_deref());

    {
        let mut session = handle.write().await;
        if let Some(language) = request.language.as_deref() {
            if is_plausible_language(language) {
                session.language = Some(language.trim().to_string());
            }
        }
        if let Some(preset) = request
            .scenario_preset
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            session.scenario_preset = preset.to_string();
        }
        if let Some(custom) = request.scenario_custom.as_deref() {
            session.scenario_custom = custom.trim().to_string();
        }
        if let Some(role) = request.scenario_role.as_deref() {
            session.scenario_role = role.trim().to_string();
        }
        if let Some(start) = request.scenario_start.as_deref() {
            session.scenario_start = start.trim().to_string();
        }
        if let Some(task) = request.task.as_deref() {
            let task = task.trim();
            let new_task = (!task.is_empty()).then(|| task.to_string());
            if new_task != session.task {
                session.task = new_task;
                session.task_completed = false;
            }
        }
        if let Some(difficulty) = request.difficulty.as_ref() {
            session.difficulty = Difficulty::coerce(difficulty);
        }
    }

    let session = app.sessions.summary(&handle).await;
    let session_id = handle.read().await.id.clone();
    Json(SessionContextResponse {
        session_id,
        created,
        session,
    })
}

/// Streamed chat turn. The body is plain text produced chunk-by-chunk;
/// a turn that fails before producing any text yields a 500 with the
/// recorded apology instead of a half-open stream.
async fn chat(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(request): Json<ChatTurnRequest>,
) -> Result<Response, ApiError> {
    let input = ChatTurnInput {
        client_ip: client_ip(&headers),
        request,
    };
    let mut turn = app.use_cases.chat.execute(input).await?;

    // Peek the first event so a turn that failed outright can still be
    // reported as a proper error status.
    let first = turn.events.next().await;
    let first_chunk = match first {
        Some(TurnEvent::Chunk(chunk)) => chunk,
        Some(TurnEvent::Failed { message }) => {
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "reply": message, "error": "Completion failed" })),
            )
                .into_response());
        }
        // Producer ended without any event; nothing useful to stream.
        None => {
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Empty reply".to_string(),
                }),
            )
                .into_response());
        }
    };

    let rest = turn.events.filter_map(|event| async move {
        match event {
            TurnEvent::Chunk(chunk) => Some(Ok::<_, Infallible>(Bytes::from(chunk))),
            TurnEvent::Failed { .. } => None,
        }
    });
    let body = Body::from_stream(
        futures_util::stream::once(async move { Ok::<_, Infallible>(Bytes::from(first_chunk)) })
            .chain(rest),
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-session-id", turn.session_id)
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

async fn feedback(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let Some(handle) = app.sessions.get(&request.session_id) else {
        // Session was lost; skip feedback rather than recreate.
        return Ok(Json(FeedbackResponse {
            status: FeedbackStatus::Ok,
            corrected: String::new(),
        }));
    };
    let language = handle
        .read()
        .await
        .language
        .clone()
        .ok_or_else(|| ApiError::BadRequest("Language not set".to_string()))?;
    if !app.rate.check(&client_ip(&headers), Some(&request.session_id)) {
        return Err(ApiError::RateLimited);
    }
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Empty message".to_string()));
    }

    let verdict = app
        .use_cases
        .feedback
        .execute(&language, message, request.previous_assistant.as_deref())
        .await;
    handle.write().await.last_feedback = Some(verdict.clone());
    Ok(Json(verdict))
}

async fn check_task(
    State(app): State<Arc<App>>,
    Json(request): Json<CheckTaskRequest>,
) -> Result<Json<CheckTaskResponse>, ApiError> {
    if request.task.trim().is_empty()
        || request.language.trim().is_empty()
        || request.messages.is_empty()
    {
        return Err(ApiError::BadRequest(
            "Missing task, language, or messages".to_string(),
        ));
    }
    let completed = app
        .use_cases
        .task_check
        .execute(crate::use_cases::CheckTaskInput {
            task: request.task,
            language: request.language,
            scenario_title: request.scenario_title,
            role_guide: request.role_guide,
            messages: request.messages,
        })
        .await;
    Ok(Json(CheckTaskResponse { completed }))
}

async fn translate(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let (handle, _) = app.sessions.get_or_create(request.session_id.as_deref());
    if !app
        .rate
        .check(&client_ip(&headers), request.session_id.as_deref())
    {
        return Err(ApiError::RateLimited);
    }

    let translation = app
        .use_cases
        .translate
        .execute(&handle, &request.word, request.sentence.as_deref())
        .await?;
    Ok(Json(TranslateResponse {
        translation: translation.translation,
        cached: translation.cached,
    }))
}

async fn generate_task(
    State(app): State<Arc<App>>,
    Json(request): Json<GenerateTaskRequest>,
) -> Result<Json<GenerateTaskResponse>, ApiError> {
    if request.scenario_title.trim().is_empty() || request.language.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Missing scenarioTitle or language".to_string(),
        ));
    }
    let task = app
        .use_cases
        .task_gen
        .execute(&request)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(GenerateTaskResponse { task }))
}

async fn vocab_list(
    State(app): State<Arc<App>>,
    Json(request): Json<VocabListRequest>,
) -> Result<Json<VocabListResponse>, ApiError> {
    if request.language.trim().is_empty() || request.count <= 0 {
        return Err(ApiError::BadRequest(
            "Missing language or count".to_string(),
        ));
    }
    let items = app
        .use_cases
        .vocab
        .execute(&request)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(VocabListResponse { items }))
}

async fn suggest(
    State(app): State<Arc<App>>,
    Json(request): Json<SuggestionRequest>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let handle = app
        .sessions
        .get(&request.session_id)
        .ok_or(ApiError::NotFound)?;
    let language = handle
        .read()
        .await
        .language
        .clone()
        .ok_or_else(|| ApiError::BadRequest("Language not set".to_string()))?;

    let suggestion = app
        .use_cases
        .suggest
        .execute(&language, request.scenario.as_deref(), &request.messages)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(SuggestionResponse { suggestion }))
}

async fn scenario(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(request): Json<ScenarioRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = app
        .sessions
        .get(&request.session_id)
        .ok_or(ApiError::NotFound)?;
    if !app.rate.check(&client_ip(&headers), Some(&request.session_id)) {
        return Err(ApiError::RateLimited);
    }

    let mut session = handle.write().await;
    if let Some(preset) = request.scenario_preset.as_deref() {
        session.scenario_preset = preset.trim().to_string();
    }
    if let Some(custom) = request.scenario_custom.as_deref() {
        session.scenario_custom = custom.trim().to_string();
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn difficulty(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(request): Json<DifficultyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = app
        .sessions
        .get(&request.session_id)
        .ok_or(ApiError::NotFound)?;
    if !app.rate.check(&client_ip(&headers), Some(&request.session_id)) {
        return Err(ApiError::RateLimited);
    }

    let mut session = handle.write().await;
    if let Some(value) = request.difficulty.as_ref() {
        session.difficulty = Difficulty::coerce(value);
    }
    Ok(Json(
        serde_json::json!({ "ok": true, "difficulty": session.difficulty.as_str() }),
    ))
}

async fn examples(
    State(app): State<Arc<App>>,
    Json(request): Json<ExamplesRequest>,
) -> Result<Json<ExamplesResponse>, ApiError> {
    if request.language.trim().is_empty() || request.word.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Missing language or word".to_string(),
        ));
    }
    let lines = app
        .use_cases
        .examples
        .execute(&request.language, &request.word)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ExamplesResponse { lines }))
}

/// First hop of `x-forwarded-for`, or a fixed key when absent so rate
/// limiting still applies behind a proxyless deployment.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    RateLimited,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<ChatTurnError> for ApiError {
    fn from(e: ChatTurnError) -> Self {
        match e {
            ChatTurnError::EmptyMessage | ChatTurnError::LanguageNotSet => {
                ApiError::BadRequest(e.to_string())
            }
            ChatTurnError::RateLimited => ApiError::RateLimited,
        }
    }
}

impl From<TranslateError> for ApiError {
    fn from(e: TranslateError) -> Self {
        match e {
            TranslateError::MissingWord => ApiError::BadRequest("Missing word".to_string()),
            TranslateError::Provider(e) => ApiError::Internal(e.to_string()),
        }
    }
}
