use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, tenant_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn auth_renew(base: &str) -> String {
    base_join(base, &format!("{}/auth/renew", API_V1_PREFIX))
}
pub fn version(base: &str) -> String {
    base_join(base, &format!("{}/version", API_V1_PREFIX))
}

pub fn dependents(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/dependents", tenant_scope(tenant_id)))
}
pub fn commitments(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/commitments", tenant_scope(tenant_id)))
}
pub fn commitment(base: &str, tenant_id: &str, commitment_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/commitments/{}",
            tenant_scope(tenant_id),
            enc(commitment_id)
        ),
    )
}
pub fn commitment_instantiate(base: &str, tenant_id: &str, commitment_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/commitments/{}/instantiate",
            tenant_scope(tenant_id),
            enc(commitment_id)
        ),
    )
}
pub fn approvals(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/approvals", tenant_scope(tenant_id)))
}
pub fn approvals_count(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/approvals/count", tenant_scope(tenant_id)))
}
pub fn approval_approve(base: &str, tenant_id: &str, assignment_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/approvals/{}/approve",
            tenant_scope(tenant_id),
            enc(assignment_id)
        ),
    )
}
pub fn approval_reject(base: &str, tenant_id: &str, assignment_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/approvals/{}/reject",
            tenant_scope(tenant_id),
            enc(assignment_id)
        ),
    )
}

pub fn dependent_assignments(base: &str, tenant_id: &str, dependent_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/assignments",
            tenant_scope(tenant_id),
            enc(dependent_id)
        ),
    )
}
pub fn assignment_submit(
    base: &str,
    tenant_id: &str,
    dependent_id: &str,
    assignment_id: &str,
) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/assignments/{}/submit",
            tenant_scope(tenant_id),
            enc(dependent_id),
            enc(assignment_id)
        ),
    )
}
pub fn dependent_stickers(base: &str, tenant_id: &str, dependent_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/stickers",
            tenant_scope(tenant_id),
            enc(dependent_id)
        ),
    )
}
pub fn dependent_balance(base: &str, tenant_id: &str, dependent_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/balance",
            tenant_scope(tenant_id),
            enc(dependent_id)
        ),
    )
}
pub fn rewards(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/rewards", tenant_scope(tenant_id)))
}
pub fn reward_deactivate(base: &str, tenant_id: &str, reward_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/rewards/{}/deactivate",
            tenant_scope(tenant_id),
            enc(reward_id)
        ),
    )
}
pub fn dependent_redeem(base: &str, tenant_id: &str, dependent_id: &str, reward_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/rewards/{}/redeem",
            tenant_scope(tenant_id),
            enc(dependent_id),
            enc(reward_id)
        ),
    )
}

pub fn plant_types(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/plant-types", tenant_scope(tenant_id)))
}
pub fn dependent_plant(base: &str, tenant_id: &str, dependent_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/plant",
            tenant_scope(tenant_id),
            enc(dependent_id)
        ),
    )
}
pub fn dependent_plant_water(base: &str, tenant_id: &str, dependent_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/plant/water",
            tenant_scope(tenant_id),
            enc(dependent_id)
        ),
    )
}
pub fn dependent_plant_advance(base: &str, tenant_id: &str, dependent_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/dependents/{}/plant/advance",
            tenant_scope(tenant_id),
            enc(dependent_id)
        ),
    )
}

pub fn events(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/events", tenant_scope(tenant_id)))
}
