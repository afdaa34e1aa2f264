use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use craft_core::{AssemblyProcedure, PipelineError, PipelineOrchestrator};
use craft_types::{ArtifactKind, FabricationStep, PartSummary, PlanId};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub orch: Arc<PipelineOrchestrator>,
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct Ready {
    ready: bool,
}

pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/upload", post(upload))
        .route("/api/:plan_id/state", get(plan_state))
        .route("/api/:plan_id/parts/ready", get(parts_ready))
        .route("/api/:plan_id/parts", get(parts))
        .route("/api/:plan_id/model/ready", get(model_ready))
        .route("/api/:plan_id/model", get(model))
        .route("/api/:plan_id/parts_creation/ready", get(parts_creation_ready))
        .route("/api/:plan_id/parts_creation", get(parts_creation))
        .route("/api/:plan_id/assembly_parts/ready", get(assembly_ready))
        .route(
            "/api/:plan_id/assembly_parts/procedure_num",
            get(procedure_num),
        )
        .route(
            "/api/:plan_id/assembly_parts/procedure/:procedure_no",
            get(procedure),
        )
        .route("/api/:plan_id/manual_pdf/ready", get(manual_pdf_ready))
        .route("/api/:plan_id/manual_pdf", get(manual_pdf))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

fn reject(e: PipelineError) -> ApiError {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %e, "[api] request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": e.to_string() })))
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": msg.into() })),
    )
}

fn parse_plan(raw: &str) -> ApiResult<PlanId> {
    PipelineOrchestrator::parse_plan(raw).map_err(reject)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), Json(json!({ "error": e.body_text() }))))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let mime = field.content_type().map(str::to_string);
        if file_name.as_deref().map_or(true, str::is_empty) {
            return Err(bad_request("no file selected"));
        }
        let kind = PipelineOrchestrator::image_kind(file_name.as_deref(), mime.as_deref())
            .map_err(reject)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (e.status(), Json(json!({ "error": e.body_text() }))))?;
        let plan_id = state
            .orch
            .submit_image(bytes.to_vec(), kind)
            .await
            .map_err(reject)?;
        info!(plan_id = %plan_id, "[upload] accepted");
        return Ok(Json(json!({ "plan_id": plan_id })));
    }
    Err(bad_request("no file attached"))
}

async fn plan_state(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let plan = parse_plan(&plan_id)?;
    let current = state.orch.state(plan).await.map_err(reject)?;
    Ok(Json(json!({ "plan_id": plan, "state": current })))
}

async fn ready(state: &AppState, plan_id: &str, kind: ArtifactKind) -> ApiResult<Json<Ready>> {
    let plan = parse_plan(plan_id)?;
    let ready = state.orch.is_ready(plan, kind).await.map_err(reject)?;
    info!(plan_id = %plan, artifact = %kind, ready, "[ready] checked");
    Ok(Json(Ready { ready }))
}

async fn parts_ready(State(state): State<AppState>, Path(plan_id): Path<String>) -> ApiResult<Json<Ready>> {
    ready(&state, &plan_id, ArtifactKind::PartsList).await
}

async fn model_ready(State(state): State<AppState>, Path(plan_id): Path<String>) -> ApiResult<Json<Ready>> {
    ready(&state, &plan_id, ArtifactKind::Parts3d).await
}

async fn parts_creation_ready(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Ready>> {
    ready(&state, &plan_id, ArtifactKind::PartsManual).await
}

async fn assembly_ready(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Ready>> {
    ready(&state, &plan_id, ArtifactKind::AssemblyManual).await
}

async fn manual_pdf_ready(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Ready>> {
    ready(&state, &plan_id, ArtifactKind::DesignDocument).await
}

async fn parts(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Vec<PartSummary>>> {
    let plan = parse_plan(&plan_id)?;
    state.orch.parts_list(plan).await.map(Json).map_err(reject)
}

async fn model(State(state): State<AppState>, Path(plan_id): Path<String>) -> ApiResult<Response> {
    let plan = parse_plan(&plan_id)?;
    let text = state.orch.model(plan).await.map_err(reject)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"model.obj\""),
        ],
        text,
    )
        .into_response())
}

async fn parts_creation(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Vec<FabricationStep>>> {
    let plan = parse_plan(&plan_id)?;
    state.orch.parts_manual(plan).await.map(Json).map_err(reject)
}

async fn procedure_num(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let plan = parse_plan(&plan_id)?;
    let num = state.orch.assembly_step_count(plan).await.map_err(reject)?;
    Ok(Json(json!({ "num": num })))
}

async fn procedure(
    State(state): State<AppState>,
    Path((plan_id, procedure_no)): Path<(String, String)>,
) -> ApiResult<Json<AssemblyProcedure>> {
    let plan = parse_plan(&plan_id)?;
    let n: i64 = procedure_no
        .parse()
        .map_err(|_| bad_request("procedure number must be an integer of 1 or greater"))?;
    state.orch.assembly_step(plan, n).await.map(Json).map_err(reject)
}

async fn manual_pdf(State(state): State<AppState>, Path(plan_id): Path<String>) -> ApiResult<Response> {
    let plan = parse_plan(&plan_id)?;
    let bytes = state.orch.document(plan).await.map_err(reject)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"design_document.pdf\"",
            ),
        ],
        bytes,
    )
        .into_response())
}
