use super::{AppError, AppState, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, Request},
    middleware::Next,
};
use growpromise_shared::auth::Role;
use growpromise_shared::jwt::JwtClaims;
use percent_encoding::percent_decode_str;

pub async fn enforce_acl(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let tenant_prefix = ["api", "v1", "family", state.config.tenant_id.as_str()];
    if !segs.as_slice().starts_with(&tenant_prefix) {
        tracing::warn!(?segs, "ACL: path outside tenant scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[tenant_prefix.len()..];

    let decision = match claims.role {
        Role::Guardian => allow_guardian(&method, rest),
        Role::Dependent => allow_dependent(&method, rest, claims),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_dependent = ?claims.dependent_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_guardian(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["dependents"] if *method == Method::GET => Ok(()),
        ["commitments"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["commitments", _] if *method == Method::POST => Ok(()),
        ["commitments", _, "instantiate"] if *method == Method::POST => Ok(()),
        ["approvals"] if *method == Method::GET => Ok(()),
        ["approvals", "count"] if *method == Method::GET => Ok(()),
        ["approvals", _, action] if *method == Method::POST
            && (action == &"approve" || action == &"reject") =>
        {
            Ok(())
        }
        ["rewards"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["rewards", _, "deactivate"] if *method == Method::POST => Ok(()),
        ["plant-types"] if *method == Method::GET => Ok(()),
        ["events"] if *method == Method::GET => Ok(()),
        ["dependents", _, "assignments"] if *method == Method::GET => Ok(()),
        ["dependents", _, "stickers"] if *method == Method::GET => Ok(()),
        ["dependents", _, "balance"] if *method == Method::GET => Ok(()),
        ["dependents", _, "plant"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_dependent(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["rewards"] if *method == Method::GET => Ok(()),
        ["plant-types"] if *method == Method::GET => Ok(()),
        ["events"] if *method == Method::GET => Ok(()),
        ["dependents", dep, "assignments"] if *method == Method::GET => {
            ensure_dependent(claims, dep)
        }
        ["dependents", dep, "assignments", _, "submit"] if *method == Method::POST => {
            ensure_dependent(claims, dep)
        }
        ["dependents", dep, "stickers"] if *method == Method::GET => ensure_dependent(claims, dep),
        ["dependents", dep, "balance"] if *method == Method::GET => ensure_dependent(claims, dep),
        ["dependents", dep, "rewards", _, "redeem"] if *method == Method::POST => {
            ensure_dependent(claims, dep)
        }
        ["dependents", dep, "plant"] if *method == Method::GET || *method == Method::POST => {
            ensure_dependent(claims, dep)
        }
        ["dependents", dep, "plant", action] if *method == Method::POST
            && (action == &"water" || action == &"advance") =>
        {
            ensure_dependent(claims, dep)
        }
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_dependent(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let expected = claims.dependent_id.as_ref().ok_or_else(AppError::forbidden)?;
    let provided = decode(seg);
    if expected == &provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
