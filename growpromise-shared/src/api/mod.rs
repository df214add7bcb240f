use serde::{Deserialize, Serialize};

use crate::domain::{AssignmentStatus, Recurrence};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

/// All tenant-scoped routes live under `/api/v1/family/{tenant}`.
pub fn tenant_scope(tenant_id: &str) -> String {
    format!("{}/family/{}", API_V1_PREFIX, tenant_id)
}

/// Machine-readable discriminators carried in [`ErrorBody::kind`] so clients
/// can tell expected domain outcomes apart from transport failures.
pub mod error_kind {
    pub const VALIDATION: &str = "validation";
    pub const INVALID_TRANSITION: &str = "invalid_transition";
    pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";
    pub const NOT_ENOUGH_EXPERIENCE: &str = "not_enough_experience";
    pub const ALREADY_WATERED: &str = "already_watered";
    pub const PLANT_COMPLETED: &str = "plant_completed";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependentDto {
    pub id: String,
    pub display_name: String,
}

// Commitments
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitmentDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub recurrence: Recurrence,
    pub start_date: String, // RFC3339 UTC
    pub end_date: Option<String>,
    pub active: bool,
    pub sticker_image_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommitmentReq {
    pub title: String,
    pub description: Option<String>,
    pub recurrence: Recurrence,
    /// RFC3339; first assignments are due at this instant. Defaults to now.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub dependent_ids: Vec<String>,
    pub sticker_image_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateCommitmentReq {
    pub title: Option<String>,
    pub description: Option<String>,
    pub end_date: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstantiateReq {
    /// RFC3339 due instant for the new assignments.
    pub due_date: String,
    /// Defaults to every dependent that got an assignment at creation.
    pub dependent_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstantiateResp {
    pub created: usize,
}

// Assignments
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentDto {
    pub id: String,
    pub commitment_id: String,
    pub commitment_title: String,
    pub dependent_id: String,
    pub due_date: String, // RFC3339 UTC
    pub status: AssignmentStatus,
    pub verification_image_ref: Option<String>,
    pub verification_note: Option<String>,
    pub verification_time: Option<String>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitVerificationReq {
    pub image_ref: String,
    pub note: Option<String>,
}

// Approvals inbox (guardian)
#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalDto {
    pub assignment_id: String,
    pub commitment_id: String,
    pub commitment_title: String,
    pub dependent_id: String,
    pub dependent_name: String,
    pub submitted_at: String, // RFC3339 UTC
    pub image_ref: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalsCountDto {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectReq {
    pub reason: String,
}

// Stickers & rewards
#[derive(Debug, Serialize, Deserialize)]
pub struct StickerDto {
    pub id: String,
    pub title: String,
    pub image_ref: String,
    pub minted_at: String, // RFC3339 UTC
    pub redeemed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceDto {
    pub dependent_id: String,
    pub available_stickers: i64,
    pub total_minted: i64,
    pub total_redeemed: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: String,
    pub title: String,
    pub required_stickers: i32,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub title: String,
    pub required_stickers: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResp {
    pub redemption_id: String,
    pub reward_id: String,
    pub stickers_spent: i32,
    pub available_stickers: i64,
}

// Plants
#[derive(Debug, Serialize, Deserialize)]
pub struct PlantTypeDto {
    pub id: String,
    pub name: String,
    pub max_stage: i32,
    pub experience_per_stage: i32,
    pub image_ref: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlantDto {
    pub id: String,
    pub plant_type_id: String,
    pub plant_type_name: String,
    pub stage: i32,
    pub max_stage: i32,
    pub health: i32,
    pub experience: i32,
    pub experience_to_advance: i32,
    pub can_advance: bool,
    pub last_watered_at: Option<String>,
    pub completed: bool,
    pub completed_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePlantReq {
    pub plant_type_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaterResp {
    pub health: i32,
    /// Consecutive prior days with a watering, not counting today.
    pub streak_days: u32,
    pub next_water_available_at: String, // RFC3339 UTC
}

// Update/version info (public)
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionInfoDto {
    pub version: String,
}

/// Domain events emitted by the engine; fanned out over SSE so UIs and
/// notification subsystems can subscribe. The core never formats or
/// delivers notifications itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AssignmentSubmitted {
        assignment_id: String,
        dependent_id: String,
        commitment_title: String,
    },
    AssignmentApproved {
        assignment_id: String,
        dependent_id: String,
        commitment_title: String,
    },
    AssignmentRejected {
        assignment_id: String,
        dependent_id: String,
        reason: String,
    },
    RewardRedeemed {
        dependent_id: String,
        reward_id: String,
        reward_title: String,
    },
    PlantAdvanced {
        dependent_id: String,
        plant_id: String,
        stage: i32,
        completed: bool,
    },
}

impl ServerEvent {
    /// The dependent this event concerns; used for per-role SSE filtering.
    pub fn dependent_id(&self) -> &str {
        match self {
            ServerEvent::AssignmentSubmitted { dependent_id, .. }
            | ServerEvent::AssignmentApproved { dependent_id, .. }
            | ServerEvent::AssignmentRejected { dependent_id, .. }
            | ServerEvent::RewardRedeemed { dependent_id, .. }
            | ServerEvent::PlantAdvanced { dependent_id, .. } => dependent_id,
        }
    }
}
