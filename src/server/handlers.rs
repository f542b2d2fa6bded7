use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info};

use super::error::ServerError;
use super::models::{
    CommandResponse, EditRegionRequest, EditorResponse, IngestRequest, LanguagesRequest,
    MoveImageRequest, PassResponse, PointerRequest, RegionResponse, SelectionRequest,
};
use super::state::ServerState;
use crate::compositor;
use crate::ocr;
use crate::region::{PercentRect, RegionId};
use crate::session::SessionSnapshot;

/// Uploads arrive base64-encoded inside JSON, so the default limit is far
/// too small for a chapter of pages.
const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

type Shared = State<Arc<ServerState>>;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session_snapshot))
        .route("/session/images", post(ingest_images))
        .route("/session/images/move", post(move_image))
        .route("/session/images/:index", delete(remove_image))
        .route("/session/merge", post(merge))
        .route("/session/working-image", get(working_image))
        .route("/session/pointer/down", post(pointer_down))
        .route("/session/pointer/move", post(pointer_move))
        .route("/session/pointer/up", post(pointer_up))
        .route("/session/pointer/leave", post(pointer_leave))
        .route("/session/selection", post(select_region))
        .route("/session/regions", post(add_region))
        .route(
            "/session/regions/:id",
            delete(remove_region).patch(edit_region),
        )
        .route("/session/languages", post(set_languages))
        .route("/session/ocr", post(run_ocr))
        .route("/session/translate", post(run_translation))
        .route("/session/export", post(export))
        .route("/session/reset", post(reset))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server(state: ServerState, addr: String) -> Result<()> {
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!(%addr, "session server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("content-disposition"),
    );
}

/// Runs a pass on its own task. A request dropped mid-pass does not cancel
/// it, so the pass always reaches `finish_pass`; a task that dies without
/// getting there is cleaned up here.
async fn detached<T, F>(state: &Arc<ServerState>, pass: F) -> Result<T, ServerError>
where
    F: Future<Output = Result<T, ServerError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(pass).await {
        Ok(result) => result,
        Err(err) => {
            error!("session task failed: {}", err);
            state.session.lock().await.finish_pass();
            Err(ServerError::internal(format!("server task failed: {}", err)))
        }
    }
}

/// Image decoding, stitching and rendering stay off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ServerError::internal(format!("server task failed: {}", err)))
}

async fn snapshot_of(state: &ServerState) -> SessionSnapshot {
    state.session.lock().await.snapshot()
}

async fn session_snapshot(State(state): Shared) -> Json<SessionSnapshot> {
    Json(snapshot_of(&state).await)
}

async fn ingest_images(
    State(state): Shared,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<CommandResponse>, ServerError> {
    let mut files = Vec::with_capacity(payload.images.len());
    for image in payload.images {
        let bytes = BASE64.decode(image.data_base64.trim()).map_err(|err| {
            ServerError::bad_request(format!("{}: invalid base64: {}", image.name, err))
        })?;
        files.push((image.name, bytes));
    }
    let decoded = blocking(move || compositor::decode_all(files)).await??;
    let mut session = state.session.lock().await;
    let added = session.add_sources(decoded)?;
    Ok(Json(CommandResponse {
        changed: added > 0,
        session: session.snapshot(),
    }))
}

async fn move_image(
    State(state): Shared,
    Json(payload): Json<MoveImageRequest>,
) -> Result<Json<CommandResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let changed = session.move_image(payload.from, payload.to)?;
    Ok(Json(CommandResponse {
        changed,
        session: session.snapshot(),
    }))
}

async fn remove_image(
    State(state): Shared,
    Path(index): Path<usize>,
) -> Result<Json<CommandResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let changed = session.remove_image(index)?;
    Ok(Json(CommandResponse {
        changed,
        session: session.snapshot(),
    }))
}

async fn merge(State(state): Shared) -> Result<Json<CommandResponse>, ServerError> {
    detached(&state, merge_task(state.clone())).await
}

async fn merge_task(state: Arc<ServerState>) -> Result<Json<CommandResponse>, ServerError> {
    let sources = state.session.lock().await.begin_merge()?;
    let Some(sources) = sources else {
        return Ok(Json(CommandResponse {
            changed: false,
            session: snapshot_of(&state).await,
        }));
    };

    let merged = blocking(move || compositor::merge_images(&sources)).await;
    let mut session = state.session.lock().await;
    session.finish_pass();
    let changed = match merged?? {
        Some(working) => {
            session.apply_merge(working);
            true
        }
        None => false,
    };
    Ok(Json(CommandResponse {
        changed,
        session: session.snapshot(),
    }))
}

async fn working_image(State(state): Shared) -> Result<Response, ServerError> {
    let session = state.session.lock().await;
    let working = session
        .working_image()
        .ok_or_else(|| ServerError::not_found("no working image; merge images first"))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], working.jpeg.clone()).into_response())
}

async fn pointer_down(
    State(state): Shared,
    Json(payload): Json<PointerRequest>,
) -> Result<Json<EditorResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let event = session.pointer_down(&payload.surface, payload.x, payload.y)?;
    Ok(Json(EditorResponse {
        event,
        session: session.snapshot(),
    }))
}

async fn pointer_move(
    State(state): Shared,
    Json(payload): Json<PointerRequest>,
) -> Result<Json<EditorResponse>, ServerError> {
    let mut session = state.session.lock().await;
    session.pointer_move(&payload.surface, payload.x, payload.y)?;
    Ok(Json(EditorResponse {
        event: None,
        session: session.snapshot(),
    }))
}

async fn pointer_up(State(state): Shared) -> Result<Json<EditorResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let event = session.pointer_up()?;
    Ok(Json(EditorResponse {
        event,
        session: session.snapshot(),
    }))
}

async fn pointer_leave(State(state): Shared) -> Result<Json<EditorResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let event = session.pointer_leave()?;
    Ok(Json(EditorResponse {
        event,
        session: session.snapshot(),
    }))
}

async fn select_region(
    State(state): Shared,
    Json(payload): Json<SelectionRequest>,
) -> Result<Json<EditorResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let event = session.select_region(payload.id)?;
    Ok(Json(EditorResponse {
        event,
        session: session.snapshot(),
    }))
}

async fn add_region(
    State(state): Shared,
    Json(rect): Json<PercentRect>,
) -> Result<Json<RegionResponse>, ServerError> {
    if ![rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|value| value.is_finite())
    {
        return Err(ServerError::bad_request("region coordinates must be finite"));
    }
    let mut session = state.session.lock().await;
    let id = session.add_region(rect)?;
    Ok(Json(RegionResponse {
        id,
        session: session.snapshot(),
    }))
}

async fn remove_region(
    State(state): Shared,
    Path(id): Path<u64>,
) -> Result<Json<CommandResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let changed = session.remove_region(RegionId(id))?;
    Ok(Json(CommandResponse {
        changed,
        session: session.snapshot(),
    }))
}

async fn edit_region(
    State(state): Shared,
    Path(id): Path<u64>,
    Json(payload): Json<EditRegionRequest>,
) -> Result<Json<CommandResponse>, ServerError> {
    let mut session = state.session.lock().await;
    let changed =
        session.edit_region_text(RegionId(id), payload.original_text, payload.translated_text)?;
    Ok(Json(CommandResponse {
        changed,
        session: session.snapshot(),
    }))
}

async fn set_languages(
    State(state): Shared,
    Json(payload): Json<LanguagesRequest>,
) -> Result<Json<CommandResponse>, ServerError> {
    let mut session = state.session.lock().await;
    session.set_languages(&payload.source_lang, &payload.target_lang)?;
    Ok(Json(CommandResponse {
        changed: true,
        session: session.snapshot(),
    }))
}

async fn run_ocr(State(state): Shared) -> Result<Json<PassResponse>, ServerError> {
    detached(&state, ocr_pass(state.clone())).await
}

/// Runs the OCR pass one region at a time, taking the session lock only to
/// record each result so progress stays readable from `GET /session`.
async fn ocr_pass(state: Arc<ServerState>) -> Result<Json<PassResponse>, ServerError> {
    let job = state.session.lock().await.begin_ocr()?;
    let Some(job) = job else {
        return Ok(Json(PassResponse {
            processed: 0,
            session: snapshot_of(&state).await,
        }));
    };

    let total = job.crops.len();
    let mut failure = None;
    for (index, crop) in job.crops.iter().enumerate() {
        match ocr::recognize_crop(state.ocr.as_ref(), crop, &job.language).await {
            Ok(text) => {
                state
                    .session
                    .lock()
                    .await
                    .apply_ocr_text(crop.id, text, index + 1, total);
            }
            Err(err) => {
                failure = Some(err.context(format!("region {} (order {})", crop.id, crop.order)));
                break;
            }
        }
    }

    let mut session = state.session.lock().await;
    session.finish_pass();
    if let Some(err) = failure {
        error!("OCR pass failed: {:#}", err);
        return Err(ServerError::bad_gateway(format!(
            "text recognition failed: {:#}",
            err
        )));
    }
    info!(regions = total, "OCR pass finished");
    Ok(Json(PassResponse {
        processed: total,
        session: session.snapshot(),
    }))
}

async fn run_translation(State(state): Shared) -> Result<Json<PassResponse>, ServerError> {
    detached(&state, translation_pass(state.clone())).await
}

async fn translation_pass(state: Arc<ServerState>) -> Result<Json<PassResponse>, ServerError> {
    let job = state.session.lock().await.begin_translation()?;
    let Some(job) = job else {
        return Ok(Json(PassResponse {
            processed: 0,
            session: snapshot_of(&state).await,
        }));
    };

    let outcome = state.translator.translate(&job.batch).await;
    let mut session = state.session.lock().await;
    let result = outcome.map(|translations| session.apply_translations(&translations));
    session.finish_pass();
    match result {
        Ok(updated) => {
            info!(
                requested = job.batch.items.len(),
                updated, "translation pass finished"
            );
            Ok(Json(PassResponse {
                processed: updated,
                session: session.snapshot(),
            }))
        }
        Err(err) => {
            error!("translation pass failed: {:#}", err);
            Err(ServerError::bad_gateway(format!(
                "translation failed: {:#}",
                err
            )))
        }
    }
}

async fn export(State(state): Shared) -> Result<Response, ServerError> {
    let job = state.session.lock().await.export_job()?;
    let Some(job) = job else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let render_state = state.clone();
    let artifact = blocking(move || {
        job.render(&render_state.export_style, OffsetDateTime::now_utc())
    })
    .await?
    .map_err(|err| ServerError::internal(format!("export failed: {:#}", err)))?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

async fn reset(State(state): Shared) -> Result<Json<CommandResponse>, ServerError> {
    let mut session = state.session.lock().await;
    session.reset()?;
    Ok(Json(CommandResponse {
        changed: true,
        session: session.snapshot(),
    }))
}
