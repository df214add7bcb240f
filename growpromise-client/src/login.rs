use std::io::{self, Write};
use std::path::PathBuf;

use crate::AppError;
use crate::config::{load_config, resolve_config_path};
use growpromise_shared::api::{self};
use growpromise_shared::jwt;

pub async fn login(
    server_arg: Option<String>,
    username_arg: Option<String>,
    cfg_path_opt: Option<PathBuf>,
) -> Result<(), AppError> {
    // Resolve server url: CLI arg > config if present > prompt; normalize and strip trailing slash
    let server_url = if let Some(s) = server_arg {
        crate::config::normalize_server_url(&s)
    } else {
        let from_cfg = (|| {
            let p = resolve_config_path(cfg_path_opt.clone()).ok()?;
            let cfg = load_config(&p).ok()?;
            Some(crate::config::normalize_server_url(&cfg.server_url))
        })();
        match from_cfg {
            Some(s) => s,
            None => {
                crate::config::normalize_server_url(&prompt("Server URL (e.g., 127.0.0.1:5230): ")?)
            }
        }
    };

    let username = match username_arg {
        Some(u) => u,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password("Password: ")
        .map_err(|e| AppError::Io(std::io::Error::other(e.to_string())))?;

    let body: api::AuthResp = match api::rest::login(
        &server_url,
        &api::AuthReq {
            username: username.clone(),
            password,
        },
    )
    .await
    {
        Ok(v) => v,
        Err(e) => return Err(AppError::Http(format!("login failed: {e}"))),
    };

    // This agent acts for a dependent; a guardian token has no
    // dependent scope to sync against.
    let claims = jwt::decode_unverified(&body.token)
        .map_err(|e| AppError::Http(format!("invalid token: {e}")))?;
    let dependent_id = claims
        .dependent_id
        .clone()
        .ok_or_else(|| AppError::Config("token has no dependent_id; log in as a dependent".into()))?;

    // Save token in keyring under the server_url only (single-user support)
    let entry = crate::keyring_entry(&server_url)?;
    entry
        .set_password(&body.token)
        .map_err(|e| AppError::Keyring(e.to_string()))?;

    let cfg = crate::config::ClientConfig {
        server_url: server_url.clone(),
        dependent_id,
    };
    let path = resolve_config_path(cfg_path_opt)?;
    crate::config::save_config(&path, &cfg)?;

    println!(
        "Saved token in keyring for {} and wrote config to {}",
        server_url,
        path.display()
    );
    Ok(())
}

fn prompt(msg: &str) -> Result<String, AppError> {
    print!("{}", msg);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).map_err(AppError::Io)?;
    Ok(buf.trim().to_string())
}
