mod acl;
pub mod auth;
mod config;
pub mod events;

use crate::server::auth::AuthCtx;
use crate::storage::{self, DomainError, StorageError};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use bcrypt::verify;
pub use config::{AppConfig, ConfigError, Role, UserConfig};
use growpromise_shared::api::{self, ServerEvent, error_kind};
use growpromise_shared::domain::AssignmentStatus;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    pub events: events::EventsHub,
    shutdown: tokio_util::sync::CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        Self {
            config,
            store,
            events: events::EventsHub::default(),
            shutdown: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/dependents", get(api_list_dependents))
        .route("/commitments", get(api_list_commitments))
        .route("/commitments", post(api_create_commitment))
        .route("/commitments/{id}", post(api_update_commitment))
        .route("/commitments/{id}/instantiate", post(api_instantiate))
        .route("/approvals", get(api_list_approvals))
        .route("/approvals/count", get(api_approvals_count))
        .route("/approvals/{id}/approve", post(api_approve))
        .route("/approvals/{id}/reject", post(api_reject))
        .route(
            "/dependents/{dependent_id}/assignments",
            get(api_list_dependent_assignments),
        )
        .route(
            "/dependents/{dependent_id}/assignments/{assignment_id}/submit",
            post(api_submit_verification),
        )
        .route("/dependents/{dependent_id}/stickers", get(api_list_stickers))
        .route("/dependents/{dependent_id}/balance", get(api_balance))
        .route("/rewards", get(api_list_rewards))
        .route("/rewards", post(api_create_reward))
        .route("/rewards/{id}/deactivate", post(api_deactivate_reward))
        .route(
            "/dependents/{dependent_id}/rewards/{reward_id}/redeem",
            post(api_redeem),
        )
        .route("/plant-types", get(api_list_plant_types))
        .route("/dependents/{dependent_id}/plant", get(api_get_plant))
        .route("/dependents/{dependent_id}/plant", post(api_create_plant))
        .route("/dependents/{dependent_id}/plant/water", post(api_water))
        .route("/dependents/{dependent_id}/plant/advance", post(api_advance))
        .route("/events", get(events::sse_events))
        // Innermost first: the span recorder and the ACL both need the
        // AuthCtx that require_bearer (outermost) inserts.
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            acl::enforce_acl,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Token renewal is authenticated but not tenant-scoped.
    let authed = Router::new()
        .route("/api/v1/auth/renew", post(api_auth_renew))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            dependent_id = tracing::field::Empty
        )
    });

    let tenant_prefix = format!("/api/v1/family/{}", state.config.tenant_id);
    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/version", get(api_version))
        .route("/api/v1/version", get(api_version))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(authed)
        .nest(&tenant_prefix, private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn api_version() -> Json<api::VersionInfoDto> {
    Json(api::VersionInfoDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    // Call next
    let mut resp = next.run(req).await;
    // Set header on response
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    // General security headers for all responses
    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") || path == "/api" {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("expires"),
            HeaderValue::from_static("0"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        if let Some(dep) = &auth.claims.dependent_id {
            span.record("dependent_id", tracing::field::display(dep));
        }
    }
    Ok(next.run(req).await)
}

// --- auth ---

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    // For dependent role, ensure a dependent binding exists
    if user.role == Role::Dependent && user.dependent_id.is_none() {
        tracing::error!(username=%body.username, "login: dependent user missing dependent_id in config");
        return Err(AppError::internal("dependent user missing dependent_id"));
    }
    let token = auth::issue_jwt_for_user(
        &state,
        &user.username,
        user.role,
        user.dependent_id.clone(),
        &state.config.tenant_id,
    )
    .await?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_auth_renew(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::AuthResp>, AppError> {
    let claims = &auth.claims;
    let token = auth::issue_jwt_for_user(
        &state,
        &claims.sub,
        claims.role,
        claims.dependent_id.clone(),
        &claims.tenant_id,
    )
    .await?;
    Ok(Json(api::AuthResp { token }))
}

// --- dependents ---

async fn api_list_dependents(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::DependentDto>>, AppError> {
    // ACL enforced by middleware
    let rows = state
        .store
        .list_dependents()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|d| api::DependentDto {
            id: d.id,
            display_name: d.display_name,
        })
        .collect();
    Ok(Json(items))
}

// --- commitments ---

async fn api_list_commitments(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::CommitmentDto>>, AppError> {
    let rows = state
        .store
        .list_commitments()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows.into_iter().map(commitment_dto).collect::<Result<_, _>>()?;
    Ok(Json(items))
}

async fn api_create_commitment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateCommitmentReq>,
) -> Result<Json<api::CommitmentDto>, AppError> {
    let start_date = match &body.start_date {
        Some(s) => parse_ts(s)?,
        None => chrono::Utc::now().naive_utc(),
    };
    let end_date = body.end_date.as_deref().map(parse_ts).transpose()?;
    let params = storage::CreateCommitmentParams {
        guardian_id: auth.claims.sub.clone(),
        title: body.title,
        description: body.description,
        recurrence: body.recurrence,
        start_date,
        end_date,
        dependent_ids: body.dependent_ids,
        sticker_image_ref: body.sticker_image_ref,
    };
    let row = state
        .store
        .create_commitment(params)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(commitment_dto(row)?))
}

#[derive(Deserialize)]
struct IdPath {
    id: String,
}

async fn api_update_commitment(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<IdPath>,
    Json(body): Json<api::UpdateCommitmentReq>,
) -> Result<Json<api::CommitmentDto>, AppError> {
    let params = storage::UpdateCommitmentParams {
        title: body.title,
        description: body.description,
        end_date: body.end_date.as_deref().map(parse_ts).transpose()?,
        active: body.active,
    };
    let row = state
        .store
        .update_commitment(&p.id, params)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(commitment_dto(row)?))
}

async fn api_instantiate(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<IdPath>,
    Json(body): Json<api::InstantiateReq>,
) -> Result<Json<api::InstantiateResp>, AppError> {
    let due = parse_ts(&body.due_date)?;
    let created = state
        .store
        .instantiate_assignments(&p.id, due, body.dependent_ids)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(api::InstantiateResp { created }))
}

// --- verification & approvals ---

#[derive(Deserialize)]
struct DependentAssignmentPath {
    dependent_id: String,
    assignment_id: String,
}

#[derive(Deserialize)]
struct DependentPath {
    dependent_id: String,
}

async fn api_list_dependent_assignments(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
) -> Result<Json<Vec<api::AssignmentDto>>, AppError> {
    // Reading materializes overdue pending rows as expired first.
    let rows = state
        .store
        .list_assignments_for_dependent(&p.dependent_id)
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|(a, title)| assignment_dto(a, title))
        .collect::<Result<_, _>>()?;
    Ok(Json(items))
}

async fn api_submit_verification(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentAssignmentPath>,
    Json(body): Json<api::SubmitVerificationReq>,
) -> Result<Json<api::AssignmentDto>, AppError> {
    let (row, title) = state
        .store
        .submit_verification(
            &p.dependent_id,
            &p.assignment_id,
            &body.image_ref,
            body.note.as_deref(),
        )
        .await
        .map_err(AppError::from_storage)?;
    state.events.publish(ServerEvent::AssignmentSubmitted {
        assignment_id: row.id.clone(),
        dependent_id: row.dependent_id.clone(),
        commitment_title: title.clone(),
    });
    Ok(Json(assignment_dto(row, title)?))
}

async fn api_list_approvals(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ApprovalDto>>, AppError> {
    let rows = state
        .store
        .list_pending_approvals()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|(a, dep, c)| api::ApprovalDto {
            assignment_id: a.id,
            commitment_id: c.id,
            commitment_title: c.title,
            dependent_id: dep.id,
            dependent_name: dep.display_name,
            submitted_at: a.verification_time.map(ts).unwrap_or_default(),
            image_ref: a.verification_image_ref,
            note: a.verification_note,
        })
        .collect();
    Ok(Json(items))
}

async fn api_approvals_count(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<api::ApprovalsCountDto>, AppError> {
    let count = state
        .store
        .pending_approvals_count()
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(api::ApprovalsCountDto {
        count: count.max(0) as u64,
    }))
}

async fn api_approve(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<IdPath>,
) -> Result<Json<api::AssignmentDto>, AppError> {
    let (row, title) = state
        .store
        .approve_assignment(
            &p.id,
            &state.config.growth,
            &state.config.default_sticker_image,
        )
        .await
        .map_err(AppError::from_storage)?;
    state.events.publish(ServerEvent::AssignmentApproved {
        assignment_id: row.id.clone(),
        dependent_id: row.dependent_id.clone(),
        commitment_title: title.clone(),
    });
    Ok(Json(assignment_dto(row, title)?))
}

async fn api_reject(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<IdPath>,
    Json(body): Json<api::RejectReq>,
) -> Result<Json<api::AssignmentDto>, AppError> {
    let (row, title) = state
        .store
        .reject_assignment(&p.id, &body.reason)
        .await
        .map_err(AppError::from_storage)?;
    state.events.publish(ServerEvent::AssignmentRejected {
        assignment_id: row.id.clone(),
        dependent_id: row.dependent_id.clone(),
        reason: body.reason.clone(),
    });
    Ok(Json(assignment_dto(row, title)?))
}

// --- stickers & rewards ---

#[derive(Deserialize)]
struct PageOpts {
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn api_list_stickers(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
    Query(opts): Query<PageOpts>,
) -> Result<Json<Vec<api::StickerDto>>, AppError> {
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(50);
    let rows = state
        .store
        .list_stickers_for_dependent(&p.dependent_id, page, per_page)
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|s| api::StickerDto {
            id: s.id,
            title: s.title,
            image_ref: s.image_ref,
            minted_at: ts(s.minted_at),
            redeemed: s.redemption_id.is_some(),
        })
        .collect();
    Ok(Json(items))
}

async fn api_balance(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
) -> Result<Json<api::BalanceDto>, AppError> {
    let balance = state
        .store
        .compute_balance(&p.dependent_id)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(api::BalanceDto {
        dependent_id: p.dependent_id,
        available_stickers: balance.available(),
        total_minted: balance.total_minted,
        total_redeemed: balance.total_redeemed,
    }))
}

async fn api_list_rewards(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let rows = state
        .store
        .list_rewards()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|r| api::RewardDto {
            id: r.id,
            title: r.title,
            required_stickers: r.required_stickers,
            active: r.active,
        })
        .collect();
    Ok(Json(items))
}

async fn api_create_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateRewardReq>,
) -> Result<Json<api::RewardDto>, AppError> {
    let row = state
        .store
        .create_reward(&auth.claims.sub, &body.title, body.required_stickers)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(api::RewardDto {
        id: row.id,
        title: row.title,
        required_stickers: row.required_stickers,
        active: row.active,
    }))
}

async fn api_deactivate_reward(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<IdPath>,
) -> Result<StatusCode, AppError> {
    let found = state
        .store
        .deactivate_reward(&p.id)
        .await
        .map_err(AppError::from_storage)?;
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("reward: {}", p.id)))
    }
}

#[derive(Deserialize)]
struct DependentRewardPath {
    dependent_id: String,
    reward_id: String,
}

async fn api_redeem(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentRewardPath>,
) -> Result<Json<api::RedeemResp>, AppError> {
    let outcome = state
        .store
        .redeem_reward(&p.dependent_id, &p.reward_id)
        .await
        .map_err(AppError::from_storage)?;
    state.events.publish(ServerEvent::RewardRedeemed {
        dependent_id: p.dependent_id,
        reward_id: outcome.reward.id.clone(),
        reward_title: outcome.reward.title.clone(),
    });
    Ok(Json(api::RedeemResp {
        redemption_id: outcome.redemption.id,
        reward_id: outcome.reward.id,
        stickers_spent: outcome.redemption.sticker_count,
        available_stickers: outcome.available_after,
    }))
}

// --- plants ---

async fn api_list_plant_types(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::PlantTypeDto>>, AppError> {
    let rows = state
        .store
        .list_plant_types()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|t| api::PlantTypeDto {
            id: t.id,
            name: t.name,
            max_stage: t.max_stage,
            experience_per_stage: t.experience_per_stage,
            image_ref: t.image_ref,
        })
        .collect();
    Ok(Json(items))
}

async fn api_get_plant(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
) -> Result<Json<Option<api::PlantDto>>, AppError> {
    let row = state
        .store
        .get_plant(&p.dependent_id)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(row.map(|(plant, ptype)| plant_dto(plant, ptype))))
}

async fn api_create_plant(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
    Json(body): Json<api::CreatePlantReq>,
) -> Result<Json<api::PlantDto>, AppError> {
    let (plant, ptype) = state
        .store
        .create_plant(&p.dependent_id, &body.plant_type_id, &state.config.growth)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(plant_dto(plant, ptype)))
}

async fn api_water(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
) -> Result<Json<api::WaterResp>, AppError> {
    let outcome = state
        .store
        .water_plant(&p.dependent_id, &state.config.growth)
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(api::WaterResp {
        health: outcome.plant.health,
        streak_days: outcome.streak_days,
        next_water_available_at: ts(outcome.next_water_available_at),
    }))
}

async fn api_advance(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<DependentPath>,
) -> Result<Json<api::PlantDto>, AppError> {
    let (plant, ptype) = state
        .store
        .advance_plant(&p.dependent_id)
        .await
        .map_err(AppError::from_storage)?;
    state.events.publish(ServerEvent::PlantAdvanced {
        dependent_id: p.dependent_id,
        plant_id: plant.id.clone(),
        stage: plant.stage,
        completed: plant.completed,
    });
    Ok(Json(plant_dto(plant, ptype)))
}

// --- DTO conversion ---

fn ts(dt: chrono::NaiveDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339()
}

fn parse_ts(s: &str) -> Result<chrono::NaiveDateTime, AppError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.naive_utc())
        .map_err(|e| AppError::bad_request(format!("invalid RFC3339 timestamp '{s}': {e}")))
}

fn commitment_dto(c: crate::storage::models::Commitment) -> Result<api::CommitmentDto, AppError> {
    let recurrence = c
        .recurrence
        .parse()
        .map_err(|e: String| AppError::internal(e))?;
    Ok(api::CommitmentDto {
        id: c.id,
        title: c.title,
        description: c.description,
        recurrence,
        start_date: ts(c.start_date),
        end_date: c.end_date.map(ts),
        active: c.active,
        sticker_image_ref: c.sticker_image_ref,
    })
}

fn assignment_dto(
    a: crate::storage::models::Assignment,
    commitment_title: String,
) -> Result<api::AssignmentDto, AppError> {
    let status: AssignmentStatus = a
        .status
        .parse()
        .map_err(|e: String| AppError::internal(e))?;
    Ok(api::AssignmentDto {
        id: a.id,
        commitment_id: a.commitment_id,
        commitment_title,
        dependent_id: a.dependent_id,
        due_date: ts(a.due_date),
        status,
        verification_image_ref: a.verification_image_ref,
        verification_note: a.verification_note,
        verification_time: a.verification_time.map(ts),
        rejection_reason: a.rejection_reason,
        completed_at: a.completed_at.map(ts),
    })
}

fn plant_dto(
    p: crate::storage::models::Plant,
    t: crate::storage::models::PlantType,
) -> api::PlantDto {
    api::PlantDto {
        id: p.id,
        plant_type_id: t.id,
        plant_type_name: t.name,
        stage: p.stage,
        max_stage: t.max_stage,
        health: p.health,
        experience: p.experience,
        experience_to_advance: p.experience_to_advance,
        can_advance: !p.completed && p.experience >= p.experience_to_advance,
        last_watered_at: p.last_watered_at.map(ts),
        completed: p.completed,
        completed_at: p.completed_at.map(ts),
    }
}

// --- errors ---

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    /// An expected engine outcome (state refusal, shortfall, window);
    /// carries its machine-readable kind for the client.
    Conflict {
        kind: &'static str,
        message: String,
    },
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    fn from_storage(e: StorageError) -> Self {
        match e {
            StorageError::Domain(d) => match &d {
                DomainError::Validation(_) => Self::BadRequest(d.to_string()),
                DomainError::InvalidTransition { .. } => Self::Conflict {
                    kind: error_kind::INVALID_TRANSITION,
                    message: d.to_string(),
                },
                DomainError::InsufficientBalance { .. } => {
                    let shortfall = d.shortfall().unwrap_or_default();
                    Self::Conflict {
                        kind: error_kind::INSUFFICIENT_BALANCE,
                        message: format!("{d} (short {shortfall})"),
                    }
                }
                DomainError::NotEnoughExperience { .. } => Self::Conflict {
                    kind: error_kind::NOT_ENOUGH_EXPERIENCE,
                    message: d.to_string(),
                },
                DomainError::AlreadyWatered { .. } => Self::Conflict {
                    kind: error_kind::ALREADY_WATERED,
                    message: d.to_string(),
                },
                DomainError::PlantCompleted => Self::Conflict {
                    kind: error_kind::PLANT_COMPLETED,
                    message: d.to_string(),
                },
            },
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => {
                (StatusCode::BAD_REQUEST, m, error_kind::VALIDATION, None)
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                error_kind::UNAUTHORIZED,
                None,
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden".into(),
                error_kind::FORBIDDEN,
                None,
            ),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, error_kind::NOT_FOUND, None),
            AppError::Conflict { kind, message } => (StatusCode::CONFLICT, message, kind, None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                error_kind::INTERNAL,
                Some(m),
            ),
        };
        // Expected domain outcomes are normal operation; only log real failures as errors.
        match status {
            StatusCode::CONFLICT => {
                tracing::debug!(status = %status, kind = kind, message = %msg, "domain outcome")
            }
            _ => {
                if let Some(detail) = detail {
                    tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
                } else {
                    tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
                }
            }
        }
        let body = axum::Json(ErrorBody {
            error: msg,
            kind: kind.to_string(),
        });
        (status, body).into_response()
    }
}
