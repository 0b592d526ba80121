use aws_config::BehaviorVersion;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use domain::{
    dispatches::{
        self,
        cqrs::{DispatchCqrs, DispatchViewRepository, TableConfig},
        inputs::{
            CancelDispatchInput, CreationRequest, DispatchChanges, FailDispatchInput,
            ReportIncidentInput, UploadPrescriptionInput,
        },
    },
    reports::{self, ReportPeriod},
    roles::{authorize, Operation},
    Actor, ErrorKind, Role,
};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use ulid::Ulid;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";
const UPLOAD_URL_TTL: Duration = Duration::from_secs(3600);

type ApiError = (StatusCode, String);

#[derive(Clone)]
struct AppState {
    dispatches_repo: DispatchViewRepository,
    dispatches_cqrs: Arc<DispatchCqrs>,
    dynamodb_client: aws_sdk_dynamodb::Client,
    s3_client: aws_sdk_s3::Client,
    tables: TableConfig,
    prescriptions_bucket: String,
}

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);
    let s3_client = aws_sdk_s3::Client::new(&config);

    let tables = TableConfig::from_env();
    let dispatches_repo = dispatches::cqrs::init_repo(dynamodb_client.clone(), &tables);
    let dispatches_cqrs =
        dispatches::cqrs::init(dynamodb_client.clone(), dispatches_repo.clone(), &tables);

    let state = AppState {
        dispatches_repo,
        dispatches_cqrs,
        dynamodb_client,
        s3_client,
        tables,
        prescriptions_bucket: std::env::var("PRESCRIPTIONS_BUCKET")
            .unwrap_or("pharmacy-dispatch-prescriptions".to_string()),
    };

    let app = Router::new()
        .route("/dispatches", post(create_dispatch))
        .route("/dispatches/:id", get(get_dispatch).patch(modify_dispatch))
        .route("/dispatches/:id/start", post(start_delivery))
        .route("/dispatches/:id/finalize", post(finalize_dispatch))
        .route("/dispatches/:id/cancel", post(cancel_dispatch))
        .route("/dispatches/:id/fail", post(fail_dispatch))
        .route("/dispatches/:id/incidents", post(report_incident))
        .route(
            "/dispatches/:id/incidents/:incident_id/resolve",
            post(resolve_incident),
        )
        .route(
            "/dispatches/:id/prescription/upload-url",
            post(get_upload_url),
        )
        .route("/reports/daily", get(daily_report))
        .route("/reports/monthly", get(monthly_report))
        .route("/users/:user_id/dispatch-summary", get(creator_summary))
        .with_state(state);

    let app = tower::ServiceBuilder::new()
        .layer(axum_aws_lambda::LambdaLayer::default())
        .service(app);

    lambda_http::run(app).await?;
    Ok(())
}

/// The upstream authorizer forwards the user id and role as headers.
fn actor_from(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing user".to_string()))?;

    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);

    Ok(Actor::new(user_id.to_string(), role))
}

fn domain_error(err: domain::Error) -> ApiError {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::StateConflict | ErrorKind::WriteConflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("{}", err);
    }
    (status, err.to_string())
}

async fn execute(
    state: &AppState,
    id: &str,
    command: dispatches::Command,
) -> Result<(), ApiError> {
    let mut metadata = HashMap::new();
    metadata.insert("command_id".to_string(), Ulid::new().to_string());
    metadata.insert("user_id".to_string(), command.actor().user_id.clone());

    state
        .dispatches_cqrs
        .execute_with_metadata(id, command, metadata)
        .await
        .map_err(|e| domain_error(e.into()))
}

async fn load_view(state: &AppState, id: &str) -> Result<dispatches::View, ApiError> {
    state
        .dispatches_repo
        .load(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}

/// Runs a command against an existing dispatch and returns its updated view.
async fn execute_and_load(
    state: &AppState,
    id: &str,
    command: dispatches::Command,
) -> Result<Json<dispatches::View>, ApiError> {
    execute(state, id, command).await?;
    Ok(Json(load_view(state, id).await?))
}

// Create dispatch (direct, prescription, transfer or resend)
async fn create_dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let aggregate_id = Ulid::new().to_string();

    let command = dispatches::Command::create(&aggregate_id, actor, request);
    execute(&state, &aggregate_id, command).await?;

    let view = load_view(&state, &aggregate_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_dispatch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    authorize(&actor, &Operation::ViewDispatch).map_err(domain_error)?;
    Ok(Json(load_view(&state, &id).await?))
}

async fn modify_dispatch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(changes): Json<DispatchChanges>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    execute_and_load(&state, &id, dispatches::Command::ModifyDispatch { actor, changes }).await
}

async fn start_delivery(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    execute_and_load(&state, &id, dispatches::Command::StartDelivery { actor }).await
}

async fn finalize_dispatch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    execute_and_load(&state, &id, dispatches::Command::FinalizeDispatch { actor }).await
}

async fn cancel_dispatch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CancelDispatchInput>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let command = dispatches::Command::CancelDispatch {
        actor,
        reason: input.reason,
    };
    execute_and_load(&state, &id, command).await
}

async fn fail_dispatch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<FailDispatchInput>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let command = dispatches::Command::FailDispatch {
        actor,
        reason: input.reason,
    };
    execute_and_load(&state, &id, command).await
}

async fn report_incident(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ReportIncidentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let command = dispatches::Command::ReportIncident {
        actor,
        category: input.category,
        description: input.description,
    };
    execute(&state, &id, command).await?;

    let view = load_view(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn resolve_incident(
    Path((id, incident_id)): Path<(String, u32)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let command = dispatches::Command::ResolveIncident { actor, incident_id };
    execute_and_load(&state, &id, command).await
}

fn presigning_config() -> anyhow::Result<aws_sdk_s3::presigning::PresigningConfig> {
    aws_sdk_s3::presigning::PresigningConfig::expires_in(UPLOAD_URL_TTL)
        .context("invalid presigning expiry")
}

// Get S3 presigned URL for the scanned prescription and record its location
async fn get_upload_url(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<UploadPrescriptionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;

    let file_name = input.object_name().map_err(domain_error)?;
    let key = format!("prescriptions/{}/{}-{}", id, Ulid::new(), file_name);
    let document_path = format!("s3://{}/{}", state.prescriptions_bucket, key);

    let config =
        presigning_config().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let presigned = state
        .s3_client
        .put_object()
        .bucket(&state.prescriptions_bucket)
        .key(&key)
        .content_type(&input.content_type)
        .presigned(config)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // The URL is only handed out once the actor may attach the document.
    let command = dispatches::Command::AttachPrescriptionDocument {
        actor,
        document_path: document_path.clone(),
    };
    execute(&state, &id, command).await?;

    Ok(Json(serde_json::json!({
        "upload_url": presigned.uri(),
        "document_path": document_path,
        "key": key,
    })))
}

async fn all_dispatches(state: &AppState) -> Result<Vec<dispatches::Dispatch>, ApiError> {
    dispatches::cqrs::list_dispatches(&state.dynamodb_client, &state.tables)
        .await
        .map_err(domain_error)
}

#[derive(Debug, Deserialize)]
struct DailyReportParams {
    date: Option<NaiveDate>,
}

async fn daily_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DailyReportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let period = ReportPeriod::Day {
        date: params.date.unwrap_or_else(|| Utc::now().date_naive()),
    };

    // Check access before scanning the table.
    authorize(&actor, &Operation::ViewReports).map_err(domain_error)?;
    let dispatches = all_dispatches(&state).await?;
    let report = reports::dispatch_report(&actor, period, &dispatches).map_err(domain_error)?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct MonthlyReportParams {
    year: i32,
    month: u32,
}

async fn monthly_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<MonthlyReportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let period = ReportPeriod::month(params.year, params.month).map_err(domain_error)?;

    authorize(&actor, &Operation::ViewReports).map_err(domain_error)?;
    let dispatches = all_dispatches(&state).await?;
    let report = reports::dispatch_report(&actor, period, &dispatches).map_err(domain_error)?;

    Ok(Json(report))
}

async fn creator_summary(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_from(&headers)?;
    let now = Utc::now();

    authorize(&actor, &Operation::ManageUsers).map_err(domain_error)?;
    let dispatches = all_dispatches(&state).await?;
    let summary =
        reports::creator_summary(&actor, &user_id, now, &dispatches).map_err(domain_error)?;

    Ok(Json(summary))
}
