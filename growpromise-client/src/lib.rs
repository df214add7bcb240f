use std::path::PathBuf;

use growpromise_shared::api::{self, error_kind, rest::RestError};
use growpromise_shared::jwt::{self, JwtClaims};
use tracing::{info, warn};

pub mod cache;
pub mod cli;
pub mod config;
pub mod login;
pub mod queue;
pub mod remote;

pub use cli::{Cli, Command, QueueCommand};
pub use config::{ClientConfig, load_config, resolve_config_path};

use crate::cache::SnapshotCache;
use crate::queue::{PendingAction, PendingQueue, ReplayOutcome, ReplayReport};
use crate::remote::RestRemote;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("queue error: {0}")]
    Queue(String),
    #[error("cache error: {0}")]
    Cache(String),
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn keyring_entry(server_url: &str) -> Result<keyring::Entry, AppError> {
    let service = "growpromise-client";
    keyring::Entry::new(service, &crate::config::normalize_server_url(server_url))
        .map_err(|e| AppError::Keyring(e.to_string()))
}

/// Authenticated context for server-facing commands.
struct Session {
    cfg: ClientConfig,
    token: String,
    claims: JwtClaims,
}

impl Session {
    fn rest_remote(&self) -> RestRemote {
        RestRemote {
            base: self.cfg.server_url.clone(),
            tenant_id: self.claims.tenant_id.clone(),
            token: self.token.clone(),
        }
    }
}

async fn establish_session(cfg_path: Option<PathBuf>) -> Result<Session, AppError> {
    let path = resolve_config_path(cfg_path)?;
    let cfg = load_config(&path)?;
    info!(path=?path, "loaded config");

    let key = crate::config::normalize_server_url(&cfg.server_url);
    let mut token = read_token_from_keyring(&key)?;
    let mut claims = jwt::decode_unverified(&token)
        .map_err(|e| AppError::Http(format!("invalid token: {e}")))?;

    match api::rest::renew_token(&cfg.server_url, &token).await {
        Ok(resp) => {
            let new_token = resp.token;
            let new_claims = jwt::decode_unverified(&new_token)
                .map_err(|e| AppError::Http(format!("invalid renewed token: {e}")))?;
            let entry = keyring_entry(&cfg.server_url)?;
            entry
                .set_password(&new_token)
                .map_err(|e| AppError::Keyring(e.to_string()))?;
            info!("renewed auth token from server");
            token = new_token;
            claims = new_claims;
        }
        Err(RestError::Status { status: 401, .. }) => {
            return Err(AppError::Http(
                "token renewal failed with unauthorized; please log in again".into(),
            ));
        }
        Err(e) => {
            warn!(error=%e, "token renewal failed; continuing with existing token");
        }
    }

    if claims.dependent_id.is_none() {
        return Err(AppError::Config(
            "stored token has no dependent scope; log in as a dependent".into(),
        ));
    }
    Ok(Session { cfg, token, claims })
}

fn read_token_from_keyring(server_url: &str) -> Result<String, AppError> {
    let entry = keyring_entry(server_url)?;
    entry
        .get_password()
        .map_err(|e| AppError::Keyring(e.to_string()))
}

fn open_queue() -> Result<PendingQueue, AppError> {
    let path = config::default_queue_path()
        .ok_or_else(|| AppError::Config("could not determine data dir".into()))?;
    PendingQueue::open(path)
}

fn open_cache() -> Result<SnapshotCache, AppError> {
    let path = config::default_cache_path()
        .ok_or_else(|| AppError::Config("could not determine data dir".into()))?;
    SnapshotCache::open(path)
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();

    match cli.command {
        Command::Login { server, username } => login::login(server, username, cli.config).await,
        Command::Submit {
            assignment,
            image,
            note,
        } => cmd_submit(cli.config, assignment, image, note).await,
        Command::Sync => cmd_sync(cli.config).await,
        Command::Queue { command } => cmd_queue(command),
        Command::Status => cmd_status(cli.config).await,
        Command::Stickers => cmd_stickers(cli.config).await,
        Command::Rewards => cmd_rewards(cli.config).await,
        Command::Redeem { reward } => cmd_redeem(cli.config, reward).await,
        Command::Adopt { plant_type } => cmd_adopt(cli.config, plant_type).await,
        Command::Water => cmd_water(cli.config).await,
        Command::Advance => cmd_advance(cli.config).await,
    }
}

/// Capture the submission durably first, then try to replay right away.
/// If the server is unreachable the action simply stays queued.
async fn cmd_submit(
    cfg_path: Option<PathBuf>,
    assignment: String,
    image: String,
    note: Option<String>,
) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dependent_id = session
        .claims
        .dependent_id
        .clone()
        .ok_or_else(|| AppError::Config("token has no dependent scope".into()))?;

    let mut queue = open_queue()?;
    queue.enqueue(PendingAction::SubmitVerification {
        dependent_id: growpromise_shared::domain::DependentId(dependent_id),
        assignment_id: growpromise_shared::domain::AssignmentId(assignment),
        image_ref: image,
        note,
    })?;

    let remote = session.rest_remote();
    let reports = queue.drain(&remote).await?;
    print_reports(&reports);
    if queue.is_empty() {
        println!("All actions delivered.");
    } else {
        println!("{} action(s) still queued; run `sync` later.", queue.len());
    }
    Ok(())
}

async fn cmd_sync(cfg_path: Option<PathBuf>) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let mut queue = open_queue()?;
    if queue.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    let remote = session.rest_remote();
    let reports = queue.drain(&remote).await?;
    print_reports(&reports);
    println!(
        "{} replayed, {} still queued.",
        reports.iter().filter(|r| r.succeeded()).count(),
        queue.len()
    );
    Ok(())
}

fn cmd_queue(command: QueueCommand) -> Result<(), AppError> {
    let mut queue = open_queue()?;
    match command {
        QueueCommand::List => {
            if queue.is_empty() {
                println!("Queue is empty.");
            }
            for entry in queue.entries() {
                println!(
                    "#{} {} (enqueued {})",
                    entry.seq,
                    entry.action.describe(),
                    entry.enqueued_at
                );
            }
            Ok(())
        }
        QueueCommand::Drop { seq } => {
            if queue.drop_entry(seq)? {
                println!("Dropped #{seq}.");
            } else {
                println!("No queued action with seq {seq}.");
            }
            Ok(())
        }
    }
}

async fn cmd_status(cfg_path: Option<PathBuf>) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dep = session.claims.dependent_id.as_deref().unwrap_or_default();
    let base = &session.cfg.server_url;
    let tenant = &session.claims.tenant_id;
    let mut cache = open_cache()?;

    if let Ok(version) = api::rest::server_version(base).await {
        println!("Server {} at {base}", version.version);
    }

    match api::rest::list_assignments(base, tenant, dep, &session.token).await {
        Ok(assignments) => {
            println!("Assignments:");
            for a in &assignments {
                println!(
                    "  {} [{}] {} (due {})",
                    a.id,
                    a.status.as_str(),
                    a.commitment_title,
                    a.due_date
                );
            }
            cache.put(
                &format!("assignments:{dep}"),
                serde_json::to_value(&assignments).unwrap_or_default(),
            )?;
        }
        Err(e) if e.is_transport() => print_cached(&cache, &format!("assignments:{dep}"), &e),
        Err(e) => return Err(AppError::Http(e.to_string())),
    }

    match api::rest::dependent_balance(base, tenant, dep, &session.token).await {
        Ok(balance) => {
            println!(
                "Stickers: {} available ({} minted, {} redeemed)",
                balance.available_stickers, balance.total_minted, balance.total_redeemed
            );
            cache.put(
                &format!("balance:{dep}"),
                serde_json::to_value(&balance).unwrap_or_default(),
            )?;
        }
        Err(e) if e.is_transport() => print_cached(&cache, &format!("balance:{dep}"), &e),
        Err(e) => return Err(AppError::Http(e.to_string())),
    }

    match api::rest::dependent_plant(base, tenant, dep, &session.token).await {
        Ok(Some(plant)) => {
            println!(
                "Plant: {} stage {}/{} health {} experience {}/{}{}",
                plant.plant_type_name,
                plant.stage,
                plant.max_stage,
                plant.health,
                plant.experience,
                plant.experience_to_advance,
                if plant.can_advance { " (can advance!)" } else { "" }
            );
            cache.put(
                &format!("plant:{dep}"),
                serde_json::to_value(&plant).unwrap_or_default(),
            )?;
        }
        Ok(None) => println!("Plant: none adopted yet."),
        Err(e) if e.is_transport() => print_cached(&cache, &format!("plant:{dep}"), &e),
        Err(e) => return Err(AppError::Http(e.to_string())),
    }

    Ok(())
}

async fn cmd_stickers(cfg_path: Option<PathBuf>) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dep = session.claims.dependent_id.as_deref().unwrap_or_default();
    let stickers = api::rest::list_stickers(
        &session.cfg.server_url,
        &session.claims.tenant_id,
        dep,
        &session.token,
    )
    .await
    .map_err(|e| AppError::Http(e.to_string()))?;
    if stickers.is_empty() {
        println!("No stickers yet; complete a promise to earn one!");
    }
    for s in stickers {
        println!(
            "{} {} (minted {}){}",
            s.id,
            s.title,
            s.minted_at,
            if s.redeemed { " [spent]" } else { "" }
        );
    }
    Ok(())
}

async fn cmd_rewards(cfg_path: Option<PathBuf>) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let rewards = api::rest::list_rewards(
        &session.cfg.server_url,
        &session.claims.tenant_id,
        &session.token,
    )
    .await
    .map_err(|e| AppError::Http(e.to_string()))?;
    for r in rewards.iter().filter(|r| r.active) {
        println!("{}  {} ({} stickers)", r.id, r.title, r.required_stickers);
    }
    Ok(())
}

async fn cmd_adopt(
    cfg_path: Option<PathBuf>,
    plant_type: Option<String>,
) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dep = session.claims.dependent_id.as_deref().unwrap_or_default();
    let base = &session.cfg.server_url;
    let tenant = &session.claims.tenant_id;

    let Some(type_id) = plant_type else {
        let types = api::rest::list_plant_types(base, tenant, &session.token)
            .await
            .map_err(|e| AppError::Http(e.to_string()))?;
        println!("Available plant types (pass one with --type):");
        for t in types {
            println!(
                "  {}  {} ({} stages, {} xp each)",
                t.id, t.name, t.max_stage, t.experience_per_stage
            );
        }
        return Ok(());
    };

    match api::rest::create_plant(
        base,
        tenant,
        dep,
        &session.token,
        &api::CreatePlantReq {
            plant_type_id: type_id,
        },
    )
    .await
    {
        Ok(plant) => {
            println!(
                "Adopted a {}! Stage {}/{}, health {}.",
                plant.plant_type_name, plant.stage, plant.max_stage, plant.health
            );
            Ok(())
        }
        Err(e) if e.kind().as_deref() == Some(error_kind::INVALID_TRANSITION) => {
            println!("You already have a plant growing; finish it first.");
            Ok(())
        }
        Err(e) => Err(AppError::Http(e.to_string())),
    }
}

async fn cmd_advance(cfg_path: Option<PathBuf>) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dep = session.claims.dependent_id.as_deref().unwrap_or_default();
    match api::rest::advance_plant(
        &session.cfg.server_url,
        &session.claims.tenant_id,
        dep,
        &session.token,
    )
    .await
    {
        Ok(plant) => {
            if plant.completed {
                println!(
                    "Your {} is fully grown! You can adopt a new plant.",
                    plant.plant_type_name
                );
            } else {
                println!(
                    "Advanced to stage {}/{}; {} xp carried over.",
                    plant.stage, plant.max_stage, plant.experience
                );
            }
            Ok(())
        }
        Err(e) if e.kind().as_deref() == Some(error_kind::NOT_ENOUGH_EXPERIENCE) => {
            println!("Not yet: {}", status_message(&e));
            Ok(())
        }
        Err(e) if e.kind().as_deref() == Some(error_kind::PLANT_COMPLETED) => {
            println!("This plant is fully grown; adopt a new one.");
            Ok(())
        }
        Err(e) => Err(AppError::Http(e.to_string())),
    }
}

async fn cmd_water(cfg_path: Option<PathBuf>) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dep = session.claims.dependent_id.as_deref().unwrap_or_default();
    match api::rest::water_plant(
        &session.cfg.server_url,
        &session.claims.tenant_id,
        dep,
        &session.token,
    )
    .await
    {
        Ok(resp) => {
            println!(
                "Watered! Health {}, streak {} day(s). Next watering after {}.",
                resp.health, resp.streak_days, resp.next_water_available_at
            );
            Ok(())
        }
        // Expected outcomes, not failures: surface them as answers.
        Err(e) if e.kind().as_deref() == Some(error_kind::ALREADY_WATERED) => {
            println!("Not yet: {}", status_message(&e));
            Ok(())
        }
        Err(e) if e.kind().as_deref() == Some(error_kind::PLANT_COMPLETED) => {
            println!("This plant is fully grown; adopt a new one.");
            Ok(())
        }
        Err(e) => Err(AppError::Http(e.to_string())),
    }
}

async fn cmd_redeem(cfg_path: Option<PathBuf>, reward: String) -> Result<(), AppError> {
    let session = establish_session(cfg_path).await?;
    let dep = session.claims.dependent_id.as_deref().unwrap_or_default();
    match api::rest::redeem_reward(
        &session.cfg.server_url,
        &session.claims.tenant_id,
        dep,
        &reward,
        &session.token,
    )
    .await
    {
        Ok(resp) => {
            println!(
                "Redeemed! Spent {} sticker(s); {} remaining.",
                resp.stickers_spent, resp.available_stickers
            );
            Ok(())
        }
        Err(e) if e.kind().as_deref() == Some(error_kind::INSUFFICIENT_BALANCE) => {
            println!("Not enough stickers yet: {}", status_message(&e));
            Ok(())
        }
        Err(e) => Err(AppError::Http(e.to_string())),
    }
}

fn print_reports(reports: &[ReplayReport]) {
    for report in reports {
        match &report.outcome {
            ReplayOutcome::Replayed => {
                println!("#{} {}: delivered", report.seq, report.action.describe());
            }
            ReplayOutcome::Rejected { kind, message } => {
                println!(
                    "#{} {}: rejected ({}): {}",
                    report.seq,
                    report.action.describe(),
                    kind.as_deref().unwrap_or("unknown"),
                    message
                );
            }
            ReplayOutcome::Transport { message } => {
                println!(
                    "#{} {}: server unreachable ({message}); kept queued",
                    report.seq,
                    report.action.describe()
                );
            }
        }
    }
}

fn print_cached(cache: &SnapshotCache, key: &str, err: &RestError) {
    match cache.get(key) {
        Some(snapshot) => {
            println!("(offline: {err}; showing last-known snapshot)");
            println!("{snapshot:#}");
        }
        None => println!("(offline: {err}; nothing cached for {key})"),
    }
}

fn status_message(e: &RestError) -> String {
    match e {
        RestError::Status { body, .. } => serde_json::from_str::<api::ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| e.to_string()),
        other => other.to_string(),
    }
}
