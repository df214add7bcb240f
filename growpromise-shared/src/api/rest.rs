//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    /// The `kind` discriminator from a structured error response, if any.
    pub fn kind(&self) -> Option<String> {
        match self {
            RestError::Status { body, .. } => serde_json::from_str::<ErrorBody>(body)
                .ok()
                .map(|b| b.kind),
            _ => None,
        }
    }

    /// Transport-level failures are eligible for queueing and replay;
    /// status responses are authoritative answers from the engine.
    pub fn is_transport(&self) -> bool {
        matches!(self, RestError::Http(_))
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        // Keep TCP connections alive at kernel level
        .tcp_keepalive(Some(Duration::from_secs(180)))
        // Enable and tune the connection pool
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        // Bound request duration
        .timeout(Duration::from_secs(180))
        .build()
        .expect("failed to build HTTP client")
});

fn mk_client() -> Result<reqwest::Client, RestError> {
    Ok(HTTP_CLIENT.clone())
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

pub async fn login(base: &str, req: &AuthReq) -> Result<AuthResp, RestError> {
    let client = mk_client()?;
    let url = ep::auth_login(base);
    let res = client
        .post(url)
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn renew_token(base: &str, bearer: &str) -> Result<AuthResp, RestError> {
    let client = mk_client()?;
    let url = ep::auth_renew(base);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn server_version(base: &str) -> Result<VersionInfoDto, RestError> {
    let client = mk_client()?;
    let url = ep::version(base);
    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_assignments(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
) -> Result<Vec<AssignmentDto>, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_assignments(base, tenant_id, dependent_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn submit_verification(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    assignment_id: &str,
    bearer: &str,
    body: &SubmitVerificationReq,
) -> Result<AssignmentDto, RestError> {
    let client = mk_client()?;
    let url = ep::assignment_submit(base, tenant_id, dependent_id, assignment_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn dependent_balance(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
) -> Result<BalanceDto, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_balance(base, tenant_id, dependent_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_stickers(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
) -> Result<Vec<StickerDto>, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_stickers(base, tenant_id, dependent_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_rewards(
    base: &str,
    tenant_id: &str,
    bearer: &str,
) -> Result<Vec<RewardDto>, RestError> {
    let client = mk_client()?;
    let url = ep::rewards(base, tenant_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn redeem_reward(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    reward_id: &str,
    bearer: &str,
) -> Result<RedeemResp, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_redeem(base, tenant_id, dependent_id, reward_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn dependent_plant(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
) -> Result<Option<PlantDto>, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_plant(base, tenant_id, dependent_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn create_plant(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
    body: &CreatePlantReq,
) -> Result<PlantDto, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_plant(base, tenant_id, dependent_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn water_plant(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
) -> Result<WaterResp, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_plant_water(base, tenant_id, dependent_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn advance_plant(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    bearer: &str,
) -> Result<PlantDto, RestError> {
    let client = mk_client()?;
    let url = ep::dependent_plant_advance(base, tenant_id, dependent_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_plant_types(
    base: &str,
    tenant_id: &str,
    bearer: &str,
) -> Result<Vec<PlantTypeDto>, RestError> {
    let client = mk_client()?;
    let url = ep::plant_types(base, tenant_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}
