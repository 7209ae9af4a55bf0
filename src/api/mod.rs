//! REST endpoints for campaign management and the reply-review flow.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::engine::AutoReplyEngine;
use crate::error::{EngineError, Error, StoreError};
use crate::model::{Campaign, CampaignStatus, Category, LeadStatus, Schedule, Step};
use crate::store::Store;
use crate::upload;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub auto_reply: Arc<AutoReplyEngine>,
    pub context: Arc<dyn crate::context::ContextIndex>,
}

/// Build the Axum router with all REST routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/campaigns", post(create_campaign))
        .route(
            "/api/campaigns/{id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/api/campaigns/{id}/status", post(set_status))
        .route("/api/campaigns/{id}/leads", post(upload_leads))
        .route("/api/campaigns/{id}/context", post(add_context))
        .route("/api/campaigns/{id}/auto-reply", post(bulk_auto_reply))
        .route("/api/campaigns/{id}/mark", post(bulk_mark))
        .route("/api/leads/{id}/thread", get(lead_thread))
        .route("/api/leads/{id}/draft", post(generate_draft))
        .route("/api/leads/{id}/reply", post(send_reviewed))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────────

fn error_response(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        Error::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Engine(EngineError::Validation(_))
        | Error::Engine(EngineError::InvalidTransition { .. })
        | Error::Engine(EngineError::InvalidSchedule(_, _))
        | Error::Engine(EngineError::StepNotFound(_, _)) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": err.to_string()})))
}

fn validation(message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    error_response(EngineError::Validation(message.into()).into())
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dripmail"
    }))
}

// ── Campaigns ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateCampaignRequest {
    owner: String,
    name: String,
    account_id: Uuid,
    steps: Vec<Step>,
    schedule: Schedule,
    #[serde(default)]
    auto_reply_enabled: bool,
}

/// POST /api/campaigns
async fn create_campaign(
    State(state): State<ApiState>,
    Json(req): Json<CreateCampaignRequest>,
) -> impl IntoResponse {
    let mut campaign = Campaign::new(req.owner, req.name, req.account_id, req.steps, req.schedule);
    campaign.auto_reply_enabled = req.auto_reply_enabled;

    if let Err(message) = campaign.validate_steps() {
        return validation(message).into_response();
    }
    match state.store.get_account(campaign.account_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StoreError::not_found("account", campaign.account_id).into(),
            )
            .into_response();
        }
        Err(e) => return error_response(e.into()).into_response(),
    }

    match state.store.insert_campaign(&campaign).await {
        Ok(()) => {
            info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");
            (StatusCode::CREATED, Json(campaign)).into_response()
        }
        Err(e) => error_response(e.into()).into_response(),
    }
}

/// GET /api/campaigns/{id}
async fn get_campaign(State(state): State<ApiState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.store.get_campaign(id).await {
        Ok(Some(campaign)) => Json(campaign).into_response(),
        Ok(None) => error_response(StoreError::not_found("campaign", id).into()).into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateCampaignRequest {
    name: Option<String>,
    steps: Option<Vec<Step>>,
    schedule: Option<Schedule>,
    auto_reply_enabled: Option<bool>,
    positive_category: Option<Category>,
}

/// PUT /api/campaigns/{id}
async fn update_campaign(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCampaignRequest>,
) -> impl IntoResponse {
    let mut campaign = match state.store.get_campaign(id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return error_response(StoreError::not_found("campaign", id).into()).into_response();
        }
        Err(e) => return error_response(e.into()).into_response(),
    };

    if let Some(name) = req.name {
        campaign.name = name;
    }
    if let Some(mut steps) = req.steps {
        steps.sort_by_key(|s| s.order);
        campaign.steps = steps;
    }
    if let Some(schedule) = req.schedule {
        campaign.schedule = schedule;
    }
    if let Some(enabled) = req.auto_reply_enabled {
        campaign.auto_reply_enabled = enabled;
    }
    if let Some(category) = req.positive_category {
        campaign.positive_category = category;
    }
    if let Err(message) = campaign.validate_steps() {
        return validation(message).into_response();
    }
    campaign.updated_at = chrono::Utc::now();

    match state.store.update_campaign(&campaign).await {
        Ok(()) => Json(campaign).into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

/// DELETE /api/campaigns/{id}
async fn delete_campaign(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get_campaign(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(StoreError::not_found("campaign", id).into()).into_response();
        }
        Err(e) => return error_response(e.into()).into_response(),
    }
    match state.store.delete_campaign(id).await {
        Ok(()) => {
            info!(campaign_id = %id, "Campaign deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(e.into()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SetStatusRequest {
    status: CampaignStatus,
}

/// POST /api/campaigns/{id}/status
async fn set_status(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> impl IntoResponse {
    // Activation re-checks the step sequence; a draft can be malformed,
    // an active campaign cannot.
    if req.status == CampaignStatus::Active {
        let campaign = match state.store.get_campaign(id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                return error_response(StoreError::not_found("campaign", id).into())
                    .into_response();
            }
            Err(e) => return error_response(e.into()).into_response(),
        };
        if let Err(message) = campaign.validate_steps() {
            return validation(message).into_response();
        }
    }

    match state.store.set_campaign_status(id, req.status).await {
        Ok(()) => {
            info!(campaign_id = %id, status = req.status.as_str(), "Campaign status changed");
            Json(serde_json::json!({"status": req.status})).into_response()
        }
        Err(e) => error_response(e.into()).into_response(),
    }
}

// ── Leads ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadLeadsRequest {
    text: String,
}

/// POST /api/campaigns/{id}/leads
async fn upload_leads(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UploadLeadsRequest>,
) -> impl IntoResponse {
    match upload::enroll_leads(&state.store, id, &req.text).await {
        Ok(outcome) => Json(serde_json::json!({
            "added": outcome.added,
            "skipped": outcome.skipped,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// GET /api/leads/{id}/thread
///
/// The last outbound step plus the inbound side of the conversation,
/// oldest first.
async fn lead_thread(State(state): State<ApiState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let lead = match state.store.get_lead(id).await {
        Ok(Some(l)) => l,
        Ok(None) => {
            return error_response(StoreError::not_found("lead", id).into()).into_response();
        }
        Err(e) => return error_response(e.into()).into_response(),
    };
    let campaign = match state.store.get_campaign(lead.campaign_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return error_response(StoreError::not_found("campaign", lead.campaign_id).into())
                .into_response();
        }
        Err(e) => return error_response(e.into()).into_response(),
    };

    let sent_step = campaign.step_by_order(lead.current_step).map(|step| {
        serde_json::json!({
            "order": step.order,
            "subject": step.subject,
            "body": step.render_body(&lead.email),
        })
    });

    match state
        .store
        .list_inbound_by_sender(campaign.account_id, &lead.email)
        .await
    {
        Ok(messages) => Json(serde_json::json!({
            "lead": lead,
            "sent_step": sent_step,
            "messages": messages,
        }))
        .into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

// ── Context ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddContextRequest {
    text: String,
}

/// POST /api/campaigns/{id}/context
async fn add_context(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddContextRequest>,
) -> impl IntoResponse {
    if req.text.trim().is_empty() {
        return validation("context text is empty").into_response();
    }
    match state.store.get_campaign(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(StoreError::not_found("campaign", id).into()).into_response();
        }
        Err(e) => return error_response(e.into()).into_response(),
    }
    match state.context.upsert(id, req.text.trim()).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

// ── Auto-reply ──────────────────────────────────────────────────────────

/// POST /api/campaigns/{id}/auto-reply
async fn bulk_auto_reply(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.auto_reply.bulk_auto_reply(id).await {
        Ok(outcome) => Json(serde_json::json!({
            "sent": outcome.sent,
            "failed": outcome.failed,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct BulkMarkRequest {
    category: Category,
    target: LeadStatus,
}

/// POST /api/campaigns/{id}/mark
async fn bulk_mark(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<BulkMarkRequest>,
) -> impl IntoResponse {
    match state.auto_reply.bulk_mark(id, req.category, req.target).await {
        Ok(outcome) => Json(serde_json::json!({
            "marked": outcome.marked,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/leads/{id}/draft
async fn generate_draft(State(state): State<ApiState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.auto_reply.generate_draft(id).await {
        Ok(draft) => Json(serde_json::json!({
            "lead_id": draft.lead_id,
            "draft_text": draft.draft_text,
            "original_subject": draft.original_subject,
            "detected_category": draft.detected_category,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SendReviewedRequest {
    text: String,
}

/// POST /api/leads/{id}/reply
async fn send_reviewed(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendReviewedRequest>,
) -> impl IntoResponse {
    match state.auto_reply.send_reviewed(id, &req.text).await {
        Ok(()) => Json(serde_json::json!({"sent": true})).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
