use async_trait::async_trait;
use growpromise_shared::api::{self, rest::RestError};

/// The seam between the pending-action queue and the authoritative
/// server, so replay can be exercised against a fake in tests.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn submit_verification(
        &self,
        dependent_id: &str,
        assignment_id: &str,
        image_ref: &str,
        note: Option<&str>,
    ) -> Result<(), RestError>;
}

/// Replays against the real REST API.
pub struct RestRemote {
    pub base: String,
    pub tenant_id: String,
    pub token: String,
}

#[async_trait]
impl Remote for RestRemote {
    async fn submit_verification(
        &self,
        dependent_id: &str,
        assignment_id: &str,
        image_ref: &str,
        note: Option<&str>,
    ) -> Result<(), RestError> {
        let body = api::SubmitVerificationReq {
            image_ref: image_ref.to_string(),
            note: note.map(|s| s.to_string()),
        };
        api::rest::submit_verification(
            &self.base,
            &self.tenant_id,
            dependent_id,
            assignment_id,
            &self.token,
            &body,
        )
        .await
        .map(|_| ())
    }
}
