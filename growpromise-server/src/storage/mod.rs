pub mod models;
pub mod schema;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use growpromise_shared::domain::AssignmentStatus;
use models::{
    Assignment, Commitment, Dependent, NewAssignment, NewCommitment, NewDependent, NewPlant,
    NewPlantType, NewRewardDefinition, NewRewardRedemption, NewSession, NewSticker, NewWateringLog,
    Plant, PlantType, RewardDefinition, RewardRedemption, Sticker,
};
use serde::Deserialize;
use tracing::trace;

/// Plant health ceiling; watering gains clamp here.
pub const MAX_HEALTH: i32 = 100;

/// Tunable pacing of the growth simulation. Kept as configuration so
/// designers can retune gains without touching the state machine.
#[derive(Debug, Clone, Deserialize)]
pub struct GrowthRules {
    #[serde(default = "default_watering_health_gain")]
    pub watering_health_gain: i32,
    #[serde(default = "default_watering_interval_hours")]
    pub watering_interval_hours: i64,
    #[serde(default = "default_approval_experience")]
    pub approval_experience: i32,
    #[serde(default = "default_initial_health")]
    pub initial_health: i32,
    /// Calendar days for the watering streak are bucketed in this timezone.
    #[serde(default = "default_timezone")]
    pub timezone: chrono_tz::Tz,
}

fn default_watering_health_gain() -> i32 {
    10
}
fn default_watering_interval_hours() -> i64 {
    24
}
fn default_approval_experience() -> i32 {
    25
}
fn default_initial_health() -> i32 {
    80
}
fn default_timezone() -> chrono_tz::Tz {
    chrono_tz::UTC
}

impl Default for GrowthRules {
    fn default() -> Self {
        GrowthRules {
            watering_health_gain: default_watering_health_gain(),
            watering_interval_hours: default_watering_interval_hours(),
            approval_experience: default_approval_experience(),
            initial_health: default_initial_health(),
            timezone: default_timezone(),
        }
    }
}

/// Expected domain outcomes. These are answers from the engine, not
/// failures of it; callers must be able to tell them apart from
/// transport or database errors.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Malformed input (empty rejection reason, unknown dependent, ...).
    #[error("{0}")]
    Validation(String),

    /// A state-machine precondition did not hold, including lost races.
    #[error("cannot {action} from status {from}")]
    InvalidTransition { action: &'static str, from: String },

    /// Redemption attempted with fewer stickers than the reward requires.
    #[error("need {required} stickers, only {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    /// Stage advance attempted before enough experience accrued.
    #[error("need {required} experience, have {current}")]
    NotEnoughExperience { required: i32, current: i32 },

    /// The rolling watering window has not elapsed yet.
    #[error("already watered; retry in {retry_after_minutes} minutes")]
    AlreadyWatered { retry_after_minutes: i64 },

    /// The plant reached its final stage and is immutable.
    #[error("plant has completed its growth")]
    PlantCompleted,
}

impl DomainError {
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            DomainError::InsufficientBalance {
                required,
                available,
            } => Some(required - available),
            _ => None,
        }
    }
}

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored value could not be interpreted (e.g. unknown status text).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// An expected domain outcome, see [`DomainError`].
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Balance is always derived from sticker rows, never stored.
#[derive(Debug, Clone, Copy)]
pub struct Balance {
    pub total_minted: i64,
    pub total_redeemed: i64,
}

impl Balance {
    pub fn available(&self) -> i64 {
        self.total_minted - self.total_redeemed
    }
}

#[derive(Debug)]
pub struct WaterOutcome {
    pub plant: Plant,
    pub streak_days: u32,
    pub next_water_available_at: NaiveDateTime,
}

#[derive(Debug)]
pub struct RedeemOutcome {
    pub redemption: RewardRedemption,
    pub reward: RewardDefinition,
    pub available_after: i64,
}

#[derive(Debug)]
pub struct CreateCommitmentParams {
    pub guardian_id: String,
    pub title: String,
    pub description: Option<String>,
    pub recurrence: growpromise_shared::domain::Recurrence,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub dependent_ids: Vec<String>,
    pub sticker_image_ref: Option<String>,
}

#[derive(Debug, Default)]
pub struct UpdateCommitmentParams {
    pub title: Option<String>,
    pub description: Option<String>,
    pub end_date: Option<NaiveDateTime>,
    pub active: Option<bool>,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    pub async fn seed_from_config(
        &self,
        cfg_dependents: &[growpromise_shared::domain::Dependent],
        cfg_plant_types: &[growpromise_shared::domain::PlantType],
    ) -> Result<(), StorageError> {
        use schema::{dependents, plant_types};

        let pool = self.pool.clone();
        let dependents_owned = cfg_dependents.to_owned();
        let types_owned = cfg_plant_types.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            for d in &dependents_owned {
                let new_dep = NewDependent {
                    id: &d.id,
                    display_name: &d.display_name,
                };
                diesel::insert_into(dependents::table)
                    .values(&new_dep)
                    .on_conflict(dependents::id)
                    .do_update()
                    .set(dependents::display_name.eq(new_dep.display_name))
                    .execute(&mut conn)?;
            }

            for t in &types_owned {
                let new_type = NewPlantType {
                    id: &t.id,
                    name: &t.name,
                    max_stage: t.max_stage,
                    experience_per_stage: t.experience_per_stage,
                    image_ref: &t.image_ref,
                };
                diesel::insert_into(plant_types::table)
                    .values(&new_type)
                    .on_conflict(plant_types::id)
                    .do_update()
                    .set((
                        plant_types::name.eq(new_type.name),
                        plant_types::max_stage.eq(new_type.max_stage),
                        plant_types::experience_per_stage.eq(new_type.experience_per_stage),
                        plant_types::image_ref.eq(new_type.image_ref),
                    ))
                    .execute(&mut conn)?;
            }

            Ok(())
        })
        .await?
    }

    pub async fn list_dependents(&self) -> Result<Vec<Dependent>, StorageError> {
        use schema::dependents::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Dependent>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(dependents
                .order(display_name.asc())
                .load::<Dependent>(&mut conn)?)
        })
        .await?
    }

    pub async fn dependent_exists(&self, dependent: &str) -> Result<bool, StorageError> {
        use schema::dependents::dsl::*;
        let pool = self.pool.clone();
        let dep_id = dependent.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let count: i64 = dependents
                .filter(id.eq(&dep_id))
                .count()
                .get_result(&mut conn)?;
            Ok(count > 0)
        })
        .await?
    }

    /// Creates a commitment and materializes the first assignment for each
    /// named dependent, due at the commitment's start date.
    pub async fn create_commitment(
        &self,
        params: CreateCommitmentParams,
    ) -> Result<Commitment, StorageError> {
        use schema::{assignments, commitments, dependents};
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Commitment, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            let title = params.title.trim();
            if title.is_empty() {
                return Err(DomainError::Validation("title must not be empty".into()).into());
            }
            if params.dependent_ids.is_empty() {
                return Err(DomainError::Validation(
                    "at least one dependent is required".into(),
                )
                .into());
            }

            let commitment_id = fresh_slug_id(title);
            let now = Utc::now().naive_utc();

            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                for dep in &params.dependent_ids {
                    let known: i64 = dependents::table
                        .filter(dependents::id.eq(dep))
                        .count()
                        .get_result(conn)?;
                    if known == 0 {
                        return Err(DomainError::Validation(format!(
                            "unknown dependent: {dep}"
                        ))
                        .into());
                    }
                }

                let new_commitment = NewCommitment {
                    id: &commitment_id,
                    guardian_id: &params.guardian_id,
                    title,
                    description: params.description.as_deref(),
                    recurrence: params.recurrence.as_str(),
                    start_date: params.start_date,
                    end_date: params.end_date,
                    active: true,
                    sticker_image_ref: params.sticker_image_ref.as_deref(),
                    created_at: now,
                };
                diesel::insert_into(commitments::table)
                    .values(&new_commitment)
                    .execute(conn)?;

                for dep in &params.dependent_ids {
                    let assignment_id = uuid::Uuid::new_v4().to_string();
                    let new_assignment = NewAssignment {
                        id: &assignment_id,
                        commitment_id: &commitment_id,
                        dependent_id: dep,
                        due_date: params.start_date,
                        status: AssignmentStatus::Pending.as_str(),
                        created_at: now,
                    };
                    diesel::insert_into(assignments::table)
                        .values(&new_assignment)
                        .execute(conn)?;
                }
                Ok(())
            })?;

            trace!(commitment_id = %commitment_id, "commitment created");
            Ok(commitments::table
                .filter(commitments::id.eq(&commitment_id))
                .first::<Commitment>(&mut conn)?)
        })
        .await?
    }

    pub async fn update_commitment(
        &self,
        commitment_id: &str,
        params: UpdateCommitmentParams,
    ) -> Result<Commitment, StorageError> {
        use schema::commitments::dsl as c;
        let pool = self.pool.clone();
        let cid = commitment_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Commitment, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Commitment, StorageError> {
                let row: Option<Commitment> = c::commitments
                    .filter(c::id.eq(&cid))
                    .first::<Commitment>(conn)
                    .optional()?;
                let Some(row) = row else {
                    return Err(StorageError::NotFound(format!("commitment: {cid}")));
                };
                let title = match &params.title {
                    Some(t) if t.trim().is_empty() => {
                        return Err(
                            DomainError::Validation("title must not be empty".into()).into()
                        );
                    }
                    Some(t) => t.trim().to_string(),
                    None => row.title,
                };
                let description = params.description.or(row.description);
                let end_date = params.end_date.or(row.end_date);
                let active = params.active.unwrap_or(row.active);
                diesel::update(c::commitments.filter(c::id.eq(&cid)))
                    .set((
                        c::title.eq(title.as_str()),
                        c::description.eq(description.as_deref()),
                        c::end_date.eq(end_date),
                        c::active.eq(active),
                    ))
                    .execute(conn)?;
                Ok(c::commitments
                    .filter(c::id.eq(&cid))
                    .first::<Commitment>(conn)?)
            })
        })
        .await?
    }

    pub async fn list_commitments(&self) -> Result<Vec<Commitment>, StorageError> {
        use schema::commitments::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Commitment>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(commitments
                .order(created_at.desc())
                .load::<Commitment>(&mut conn)?)
        })
        .await?
    }

    /// Materializes assignments for a later due date. Idempotent per
    /// (commitment, dependent, due date); returns how many were created.
    pub async fn instantiate_assignments(
        &self,
        commitment_id: &str,
        due_date: NaiveDateTime,
        dependent_ids: Option<Vec<String>>,
    ) -> Result<usize, StorageError> {
        use schema::{assignments, commitments};
        let pool = self.pool.clone();
        let cid = commitment_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<usize, StorageError> {
                let row: Option<Commitment> = commitments::table
                    .filter(commitments::id.eq(&cid))
                    .first::<Commitment>(conn)
                    .optional()?;
                let Some(row) = row else {
                    return Err(StorageError::NotFound(format!("commitment: {cid}")));
                };
                if !row.active {
                    return Err(
                        DomainError::Validation("commitment is not active".into()).into()
                    );
                }
                if let Some(end) = row.end_date
                    && due_date > end
                {
                    return Err(DomainError::Validation(
                        "due date is past the commitment's end date".into(),
                    )
                    .into());
                }

                let targets: Vec<String> = match dependent_ids {
                    Some(ids) if !ids.is_empty() => ids,
                    _ => assignments::table
                        .filter(assignments::commitment_id.eq(&cid))
                        .select(assignments::dependent_id)
                        .distinct()
                        .load::<String>(conn)?,
                };
                if targets.is_empty() {
                    return Err(DomainError::Validation(
                        "no dependents to instantiate for".into(),
                    )
                    .into());
                }

                let now = Utc::now().naive_utc();
                let mut created = 0usize;
                for dep in &targets {
                    let assignment_id = uuid::Uuid::new_v4().to_string();
                    let new_assignment = NewAssignment {
                        id: &assignment_id,
                        commitment_id: &cid,
                        dependent_id: dep,
                        due_date,
                        status: AssignmentStatus::Pending.as_str(),
                        created_at: now,
                    };
                    created += diesel::insert_into(assignments::table)
                        .values(&new_assignment)
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                }
                Ok(created)
            })
        })
        .await?
    }

    /// All assignments for a dependent, newest due date first. Overdue
    /// pending rows are materialized as expired before they are returned.
    pub async fn list_assignments_for_dependent(
        &self,
        dependent: &str,
    ) -> Result<Vec<(Assignment, String)>, StorageError> {
        use schema::{assignments, commitments};
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Assignment, String)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                let now = Utc::now().naive_utc();
                conn.immediate_transaction(|conn| -> Result<Vec<(Assignment, String)>, StorageError> {
                    expire_overdue_for_dependent(conn, &dep, now)?;
                    Ok(assignments::table
                        .inner_join(commitments::table)
                        .filter(assignments::dependent_id.eq(&dep))
                        .order(assignments::due_date.desc())
                        .select((Assignment::as_select(), commitments::title))
                        .load::<(Assignment, String)>(conn)?)
                })
            },
        )
        .await?
    }

    /// Dependent submits photographic proof. Legal from `pending` or
    /// `rejected` only; the transition is a compare-and-set so a racing
    /// second submission loses with `InvalidTransition`.
    pub async fn submit_verification(
        &self,
        dependent: &str,
        assignment_id: &str,
        image_ref: &str,
        note: Option<&str>,
    ) -> Result<(Assignment, String), StorageError> {
        use schema::{assignments, commitments};
        if image_ref.trim().is_empty() {
            return Err(DomainError::Validation("image_ref must not be empty".into()).into());
        }
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        let aid = assignment_id.to_string();
        let image = image_ref.to_string();
        let note_owned = note.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<(Assignment, String), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            conn.immediate_transaction(|conn| -> Result<(Assignment, String), StorageError> {
                expire_overdue_row(conn, &aid, now)?;
                let updated = diesel::update(
                    assignments::table
                        .filter(assignments::id.eq(&aid))
                        .filter(assignments::dependent_id.eq(&dep))
                        .filter(assignments::status.eq_any([
                            AssignmentStatus::Pending.as_str(),
                            AssignmentStatus::Rejected.as_str(),
                        ])),
                )
                .set((
                    assignments::status.eq(AssignmentStatus::Submitted.as_str()),
                    assignments::verification_image_ref.eq(Some(image.as_str())),
                    assignments::verification_note.eq(note_owned.as_deref()),
                    assignments::verification_time.eq(Some(now)),
                ))
                .execute(conn)?;
                if updated == 0 {
                    return Err(transition_refused(conn, &aid, Some(&dep), "submit"));
                }
                load_assignment_with_title(conn, &aid)
            })
        })
        .await?
    }

    pub async fn list_pending_approvals(
        &self,
    ) -> Result<Vec<(Assignment, Dependent, Commitment)>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Assignment, Dependent, Commitment)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                use schema::{assignments, commitments, dependents};
                let rows = assignments::table
                    .inner_join(dependents::table)
                    .inner_join(commitments::table)
                    .filter(assignments::status.eq(AssignmentStatus::Submitted.as_str()))
                    .order(assignments::verification_time.desc())
                    .select((
                        Assignment::as_select(),
                        Dependent::as_select(),
                        Commitment::as_select(),
                    ))
                    .load::<(Assignment, Dependent, Commitment)>(&mut conn)?;
                Ok(rows)
            },
        )
        .await?
    }

    pub async fn pending_approvals_count(&self) -> Result<i64, StorageError> {
        use schema::assignments::dsl as a;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(a::assignments
                .filter(a::status.eq(AssignmentStatus::Submitted.as_str()))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    /// Guardian approves a submitted assignment. One transaction covers
    /// the status CAS, the sticker mint (idempotent on the source
    /// assignment), and the experience grant to the dependent's active
    /// plant (a no-op when none exists).
    pub async fn approve_assignment(
        &self,
        assignment_id: &str,
        growth: &GrowthRules,
        default_sticker_image: &str,
    ) -> Result<(Assignment, String), StorageError> {
        use schema::{assignments, commitments, stickers};
        let pool = self.pool.clone();
        let aid = assignment_id.to_string();
        let experience_grant = growth.approval_experience;
        let fallback_image = default_sticker_image.to_string();
        tokio::task::spawn_blocking(move || -> Result<(Assignment, String), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            conn.immediate_transaction(|conn| -> Result<(Assignment, String), StorageError> {
                let rec: Option<(String, String, Option<String>)> = assignments::table
                    .inner_join(commitments::table)
                    .filter(assignments::id.eq(&aid))
                    .select((
                        assignments::dependent_id,
                        commitments::title,
                        commitments::sticker_image_ref,
                    ))
                    .first::<(String, String, Option<String>)>(conn)
                    .optional()?;
                let Some((dependent_id, title, sticker_image)) = rec else {
                    return Err(StorageError::NotFound(format!("assignment: {aid}")));
                };

                let updated = diesel::update(
                    assignments::table
                        .filter(assignments::id.eq(&aid))
                        .filter(
                            assignments::status.eq(AssignmentStatus::Submitted.as_str()),
                        ),
                )
                .set((
                    assignments::status.eq(AssignmentStatus::Approved.as_str()),
                    assignments::completed_at.eq(Some(now)),
                ))
                .execute(conn)?;
                if updated == 0 {
                    return Err(transition_refused(conn, &aid, None, "approve"));
                }

                // Mint exactly once per assignment; a replayed approval
                // hits the unique source index and becomes a no-op.
                let sticker_id = uuid::Uuid::new_v4().to_string();
                let image = sticker_image.as_deref().unwrap_or(&fallback_image);
                let new_sticker = NewSticker {
                    id: &sticker_id,
                    dependent_id: &dependent_id,
                    source_assignment_id: &aid,
                    title: &title,
                    image_ref: image,
                    minted_at: now,
                };
                diesel::insert_into(stickers::table)
                    .values(&new_sticker)
                    .on_conflict(stickers::source_assignment_id)
                    .do_nothing()
                    .execute(conn)?;

                grant_experience(conn, &dependent_id, experience_grant)?;

                load_assignment_with_title(conn, &aid)
            })
        })
        .await?
    }

    /// Guardian rejects a submitted assignment; a non-empty reason is
    /// required. The dependent may resubmit afterwards.
    pub async fn reject_assignment(
        &self,
        assignment_id: &str,
        reason: &str,
    ) -> Result<(Assignment, String), StorageError> {
        use schema::assignments;
        if reason.trim().is_empty() {
            return Err(
                DomainError::Validation("a rejection reason is required".into()).into(),
            );
        }
        let pool = self.pool.clone();
        let aid = assignment_id.to_string();
        let reason_owned = reason.trim().to_string();
        tokio::task::spawn_blocking(move || -> Result<(Assignment, String), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<(Assignment, String), StorageError> {
                let updated = diesel::update(
                    assignments::table
                        .filter(assignments::id.eq(&aid))
                        .filter(
                            assignments::status.eq(AssignmentStatus::Submitted.as_str()),
                        ),
                )
                .set((
                    assignments::status.eq(AssignmentStatus::Rejected.as_str()),
                    assignments::rejection_reason.eq(Some(reason_owned.as_str())),
                ))
                .execute(conn)?;
                if updated == 0 {
                    return Err(transition_refused(conn, &aid, None, "reject"));
                }
                load_assignment_with_title(conn, &aid)
            })
        })
        .await?
    }

    pub async fn list_stickers_for_dependent(
        &self,
        dependent: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<Sticker>, StorageError> {
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        tokio::task::spawn_blocking(move || -> Result<Vec<Sticker>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::stickers;
            Ok(stickers::table
                .filter(stickers::dependent_id.eq(&dep))
                .order(stickers::minted_at.desc())
                .offset(offset)
                .limit(per_page)
                .select(Sticker::as_select())
                .load::<Sticker>(&mut conn)?)
        })
        .await?
    }

    /// Derived ledger balance; never stored, so it cannot drift.
    pub async fn compute_balance(&self, dependent: &str) -> Result<Balance, StorageError> {
        use schema::stickers::dsl as s;
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(move || -> Result<Balance, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let total_minted: i64 = s::stickers
                .filter(s::dependent_id.eq(&dep))
                .count()
                .get_result(&mut conn)?;
            let total_redeemed: i64 = s::stickers
                .filter(s::dependent_id.eq(&dep))
                .filter(s::redemption_id.is_not_null())
                .count()
                .get_result(&mut conn)?;
            Ok(Balance {
                total_minted,
                total_redeemed,
            })
        })
        .await?
    }

    pub async fn create_reward(
        &self,
        guardian_id: &str,
        title: &str,
        required_stickers: i32,
    ) -> Result<RewardDefinition, StorageError> {
        use schema::reward_definitions;
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::Validation("title must not be empty".into()).into());
        }
        if required_stickers <= 0 {
            return Err(DomainError::Validation(
                "required_stickers must be positive".into(),
            )
            .into());
        }
        let pool = self.pool.clone();
        let guardian = guardian_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<RewardDefinition, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let reward_id = fresh_slug_id(&title);
            let new_reward = NewRewardDefinition {
                id: &reward_id,
                guardian_id: &guardian,
                title: &title,
                required_stickers,
                active: true,
                created_at: Utc::now().naive_utc(),
            };
            diesel::insert_into(reward_definitions::table)
                .values(&new_reward)
                .execute(&mut conn)?;
            Ok(reward_definitions::table
                .filter(reward_definitions::id.eq(&reward_id))
                .first::<RewardDefinition>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_rewards(&self) -> Result<Vec<RewardDefinition>, StorageError> {
        use schema::reward_definitions::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RewardDefinition>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(reward_definitions
                .order(created_at.desc())
                .load::<RewardDefinition>(&mut conn)?)
        })
        .await?
    }

    pub async fn deactivate_reward(&self, reward_id: &str) -> Result<bool, StorageError> {
        use schema::reward_definitions::dsl as r;
        let pool = self.pool.clone();
        let rid = reward_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated = diesel::update(r::reward_definitions.filter(r::id.eq(&rid)))
                .set(r::active.eq(false))
                .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }

    /// The only true check-then-act of the ledger: recheck availability,
    /// mark the oldest N stickers, and record the redemption in one
    /// transaction. No partial redemption can be observed.
    pub async fn redeem_reward(
        &self,
        dependent: &str,
        reward_id: &str,
    ) -> Result<RedeemOutcome, StorageError> {
        use schema::{reward_definitions, reward_redemptions, stickers};
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        let rid = reward_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<RedeemOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<RedeemOutcome, StorageError> {
                let reward: Option<RewardDefinition> = reward_definitions::table
                    .filter(reward_definitions::id.eq(&rid))
                    .first::<RewardDefinition>(conn)
                    .optional()?;
                let Some(reward) = reward else {
                    return Err(StorageError::NotFound(format!("reward: {rid}")));
                };
                if !reward.active {
                    return Err(
                        DomainError::Validation("reward is not active".into()).into()
                    );
                }

                // Oldest first, so balances stay reproducible and no
                // sticker is hoarded past a redemption.
                let available_ids: Vec<String> = stickers::table
                    .filter(stickers::dependent_id.eq(&dep))
                    .filter(stickers::redemption_id.is_null())
                    .order(stickers::minted_at.asc())
                    .select(stickers::id)
                    .load::<String>(conn)?;

                let required = reward.required_stickers as i64;
                let available = available_ids.len() as i64;
                if available < required {
                    return Err(DomainError::InsufficientBalance {
                        required,
                        available,
                    }
                    .into());
                }

                let chosen: Vec<String> = available_ids
                    .into_iter()
                    .take(reward.required_stickers as usize)
                    .collect();
                let redemption_id = uuid::Uuid::new_v4().to_string();
                let now = Utc::now().naive_utc();
                let new_redemption = NewRewardRedemption {
                    id: &redemption_id,
                    reward_id: &rid,
                    dependent_id: &dep,
                    sticker_count: reward.required_stickers,
                    redeemed_at: now,
                };
                diesel::insert_into(reward_redemptions::table)
                    .values(&new_redemption)
                    .execute(conn)?;

                let marked = diesel::update(
                    stickers::table
                        .filter(stickers::id.eq_any(&chosen))
                        .filter(stickers::redemption_id.is_null()),
                )
                .set(stickers::redemption_id.eq(Some(redemption_id.as_str())))
                .execute(conn)?;
                if marked != chosen.len() {
                    // Rolls back the whole redemption.
                    return Err(StorageError::Corrupt(format!(
                        "redemption marked {marked} of {} stickers",
                        chosen.len()
                    )));
                }

                let redemption = reward_redemptions::table
                    .filter(reward_redemptions::id.eq(&redemption_id))
                    .first::<RewardRedemption>(conn)?;
                Ok(RedeemOutcome {
                    redemption,
                    reward,
                    available_after: available - required,
                })
            })
        })
        .await?
    }

    pub async fn list_plant_types(&self) -> Result<Vec<PlantType>, StorageError> {
        use schema::plant_types::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<PlantType>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(plant_types.order(name.asc()).load::<PlantType>(&mut conn)?)
        })
        .await?
    }

    /// A dependent adopts a plant. Refused while an incomplete plant is
    /// still growing.
    pub async fn create_plant(
        &self,
        dependent: &str,
        plant_type_id: &str,
        growth: &GrowthRules,
    ) -> Result<(Plant, PlantType), StorageError> {
        use schema::{plant_types, plants};
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        let type_id = plant_type_id.to_string();
        let initial_health = growth.initial_health.clamp(0, MAX_HEALTH);
        tokio::task::spawn_blocking(move || -> Result<(Plant, PlantType), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<(Plant, PlantType), StorageError> {
                let ptype: Option<PlantType> = plant_types::table
                    .filter(plant_types::id.eq(&type_id))
                    .first::<PlantType>(conn)
                    .optional()?;
                let Some(ptype) = ptype else {
                    return Err(StorageError::NotFound(format!("plant type: {type_id}")));
                };

                let active: i64 = plants::table
                    .filter(plants::dependent_id.eq(&dep))
                    .filter(plants::completed.eq(false))
                    .count()
                    .get_result(conn)?;
                if active > 0 {
                    return Err(DomainError::InvalidTransition {
                        action: "adopt a plant",
                        from: "growing".into(),
                    }
                    .into());
                }

                let plant_id = uuid::Uuid::new_v4().to_string();
                let new_plant = NewPlant {
                    id: &plant_id,
                    dependent_id: &dep,
                    plant_type_id: &type_id,
                    stage: 1,
                    health: initial_health,
                    experience: 0,
                    experience_to_advance: ptype.experience_per_stage,
                    created_at: Utc::now().naive_utc(),
                };
                diesel::insert_into(plants::table)
                    .values(&new_plant)
                    .execute(conn)?;
                let plant = plants::table
                    .filter(plants::id.eq(&plant_id))
                    .first::<Plant>(conn)?;
                Ok((plant, ptype))
            })
        })
        .await?
    }

    /// The dependent's most recent plant, completed or not.
    pub async fn get_plant(
        &self,
        dependent: &str,
    ) -> Result<Option<(Plant, PlantType)>, StorageError> {
        use schema::{plant_types, plants};
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<Option<(Plant, PlantType)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                Ok(plants::table
                    .inner_join(plant_types::table)
                    .filter(plants::dependent_id.eq(&dep))
                    .order(plants::created_at.desc())
                    .select((Plant::as_select(), PlantType::as_select()))
                    .first::<(Plant, PlantType)>(&mut conn)
                    .optional()?)
            },
        )
        .await?
    }

    /// Waters the active plant. Legal at most once per rolling window
    /// measured from `last_watered_at`; the exact boundary is legal.
    pub async fn water_plant(
        &self,
        dependent: &str,
        growth: &GrowthRules,
    ) -> Result<WaterOutcome, StorageError> {
        use schema::{plant_types, plants, watering_logs};
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        let gain = growth.watering_health_gain;
        let interval = chrono::Duration::hours(growth.watering_interval_hours);
        let tz = growth.timezone;
        tokio::task::spawn_blocking(move || -> Result<WaterOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            conn.immediate_transaction(|conn| -> Result<WaterOutcome, StorageError> {
                let row: Option<(Plant, PlantType)> = plants::table
                    .inner_join(plant_types::table)
                    .filter(plants::dependent_id.eq(&dep))
                    .order(plants::created_at.desc())
                    .select((Plant::as_select(), PlantType::as_select()))
                    .first::<(Plant, PlantType)>(conn)
                    .optional()?;
                let Some((plant, _ptype)) = row else {
                    return Err(StorageError::NotFound(format!("plant for: {dep}")));
                };
                if plant.completed {
                    return Err(DomainError::PlantCompleted.into());
                }
                if let Some(last) = plant.last_watered_at {
                    let elapsed = now - last;
                    if elapsed < interval {
                        let wait = interval - elapsed;
                        return Err(DomainError::AlreadyWatered {
                            retry_after_minutes: wait.num_minutes().max(1),
                        }
                        .into());
                    }
                }

                let new_health = (plant.health + gain).min(MAX_HEALTH);
                diesel::update(plants::table.filter(plants::id.eq(&plant.id)))
                    .set((
                        plants::health.eq(new_health),
                        plants::last_watered_at.eq(Some(now)),
                    ))
                    .execute(conn)?;
                let log = NewWateringLog {
                    plant_id: &plant.id,
                    watered_at: now,
                    health_gain: new_health - plant.health,
                };
                diesel::insert_into(watering_logs::table)
                    .values(&log)
                    .execute(conn)?;

                let streak_days = watering_streak(conn, &plant.id, tz, now)?;
                let plant = plants::table
                    .filter(plants::id.eq(&plant.id))
                    .first::<Plant>(conn)?;
                Ok(WaterOutcome {
                    plant,
                    streak_days,
                    next_water_available_at: now + interval,
                })
            })
        })
        .await?
    }

    /// Spends accrued experience to advance one stage, carrying any
    /// surplus forward. Completes the plant at its final stage.
    pub async fn advance_plant(
        &self,
        dependent: &str,
    ) -> Result<(Plant, PlantType), StorageError> {
        use schema::{plant_types, plants};
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(move || -> Result<(Plant, PlantType), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            conn.immediate_transaction(|conn| -> Result<(Plant, PlantType), StorageError> {
                let row: Option<(Plant, PlantType)> = plants::table
                    .inner_join(plant_types::table)
                    .filter(plants::dependent_id.eq(&dep))
                    .order(plants::created_at.desc())
                    .select((Plant::as_select(), PlantType::as_select()))
                    .first::<(Plant, PlantType)>(conn)
                    .optional()?;
                let Some((plant, ptype)) = row else {
                    return Err(StorageError::NotFound(format!("plant for: {dep}")));
                };
                if plant.completed {
                    return Err(DomainError::PlantCompleted.into());
                }
                if plant.experience < plant.experience_to_advance {
                    return Err(DomainError::NotEnoughExperience {
                        required: plant.experience_to_advance,
                        current: plant.experience,
                    }
                    .into());
                }

                let remaining = plant.experience - plant.experience_to_advance;
                let new_stage = plant.stage + 1;
                let done = new_stage >= ptype.max_stage;
                diesel::update(plants::table.filter(plants::id.eq(&plant.id)))
                    .set((
                        plants::stage.eq(new_stage),
                        plants::experience.eq(remaining),
                        plants::completed.eq(done),
                        plants::completed_at.eq(if done { Some(now) } else { None }),
                    ))
                    .execute(conn)?;
                let plant = plants::table
                    .filter(plants::id.eq(&plant.id))
                    .first::<Plant>(conn)?;
                Ok((plant, ptype))
            })
        })
        .await?
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    ///
    /// This combines the idle timeout check and the `last_used_at` update into
    /// a single atomic UPDATE, eliminating the race condition between checking
    /// and updating the session.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

/// Experience accrual is pure bookkeeping; it never auto-advances the
/// stage. Granting with no active plant is a no-op by design of the
/// approval flow.
fn grant_experience(
    conn: &mut SqliteConnection,
    dependent: &str,
    amount: i32,
) -> Result<usize, diesel::result::Error> {
    use schema::plants::dsl as p;
    diesel::update(
        p::plants
            .filter(p::dependent_id.eq(dependent))
            .filter(p::completed.eq(false)),
    )
    .set(p::experience.eq(p::experience + amount))
    .execute(conn)
}

/// Consecutive prior calendar days (in `tz`) with at least one watering,
/// walking back from yesterday. Today's watering does not count itself.
fn watering_streak(
    conn: &mut SqliteConnection,
    plant: &str,
    tz: chrono_tz::Tz,
    now: NaiveDateTime,
) -> Result<u32, diesel::result::Error> {
    use schema::watering_logs::dsl as wl;
    let times: Vec<NaiveDateTime> = wl::watering_logs
        .filter(wl::plant_id.eq(plant))
        .select(wl::watered_at)
        .load::<NaiveDateTime>(conn)?;
    let local_day = |t: NaiveDateTime| {
        chrono::DateTime::<Utc>::from_naive_utc_and_offset(t, Utc)
            .with_timezone(&tz)
            .date_naive()
    };
    let days: std::collections::HashSet<chrono::NaiveDate> =
        times.into_iter().map(local_day).collect();
    let today = local_day(now);
    let mut streak = 0u32;
    let mut cursor = today;
    loop {
        let Some(prev) = cursor.checked_sub_days(chrono::Days::new(1)) else {
            break;
        };
        if !days.contains(&prev) {
            break;
        }
        streak += 1;
        cursor = prev;
    }
    Ok(streak)
}

/// Lazily materialize `pending -> expired` for one row. Idempotent;
/// computing it twice yields the same result.
fn expire_overdue_row(
    conn: &mut SqliteConnection,
    assignment: &str,
    now: NaiveDateTime,
) -> Result<usize, diesel::result::Error> {
    use schema::assignments::dsl as a;
    diesel::update(
        a::assignments
            .filter(a::id.eq(assignment))
            .filter(a::status.eq(AssignmentStatus::Pending.as_str()))
            .filter(a::due_date.lt(now)),
    )
    .set(a::status.eq(AssignmentStatus::Expired.as_str()))
    .execute(conn)
}

fn expire_overdue_for_dependent(
    conn: &mut SqliteConnection,
    dependent: &str,
    now: NaiveDateTime,
) -> Result<usize, diesel::result::Error> {
    use schema::assignments::dsl as a;
    diesel::update(
        a::assignments
            .filter(a::dependent_id.eq(dependent))
            .filter(a::status.eq(AssignmentStatus::Pending.as_str()))
            .filter(a::due_date.lt(now)),
    )
    .set(a::status.eq(AssignmentStatus::Expired.as_str()))
    .execute(conn)
}

/// A guarded transition updated zero rows: report why.
fn transition_refused(
    conn: &mut SqliteConnection,
    assignment: &str,
    dependent: Option<&str>,
    action: &'static str,
) -> StorageError {
    use schema::assignments::dsl as a;
    let mut query = a::assignments
        .filter(a::id.eq(assignment))
        .select(a::status)
        .into_boxed();
    if let Some(dep) = dependent {
        query = query.filter(a::dependent_id.eq(dep));
    }
    match query.first::<String>(conn).optional() {
        Ok(Some(current)) => DomainError::InvalidTransition {
            action,
            from: current,
        }
        .into(),
        Ok(None) => StorageError::NotFound(format!("assignment: {assignment}")),
        Err(e) => StorageError::Database(e),
    }
}

fn load_assignment_with_title(
    conn: &mut SqliteConnection,
    assignment: &str,
) -> Result<(Assignment, String), StorageError> {
    use schema::{assignments, commitments};
    Ok(assignments::table
        .inner_join(commitments::table)
        .filter(assignments::id.eq(assignment))
        .select((Assignment::as_select(), commitments::title))
        .first::<(Assignment, String)>(conn)?)
}

fn fresh_slug_id(title: &str) -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug::slugify(title), &simple[..8])
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn test_conn() -> SqliteConnection {
        const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
        let mut conn =
            SqliteConnection::establish(":memory:").expect("in-memory sqlite");
        conn.run_pending_migrations(MIGRATIONS).expect("migrations");
        conn
    }

    fn seed_plant(conn: &mut SqliteConnection) -> String {
        use schema::{dependents, plant_types, plants};
        diesel::insert_into(dependents::table)
            .values(NewDependent {
                id: "kid",
                display_name: "Kid",
            })
            .execute(conn)
            .unwrap();
        diesel::insert_into(plant_types::table)
            .values(NewPlantType {
                id: "fern",
                name: "Fern",
                max_stage: 3,
                experience_per_stage: 100,
                image_ref: "plants/fern.png",
            })
            .execute(conn)
            .unwrap();
        let plant_id = "plant-1".to_string();
        diesel::insert_into(plants::table)
            .values(NewPlant {
                id: &plant_id,
                dependent_id: "kid",
                plant_type_id: "fern",
                stage: 1,
                health: 50,
                experience: 0,
                experience_to_advance: 100,
                created_at: Utc::now().naive_utc(),
            })
            .execute(conn)
            .unwrap();
        plant_id
    }

    fn log_watering(conn: &mut SqliteConnection, plant: &str, at: NaiveDateTime) {
        use schema::watering_logs;
        diesel::insert_into(watering_logs::table)
            .values(NewWateringLog {
                plant_id: plant,
                watered_at: at,
                health_gain: 10,
            })
            .execute(conn)
            .unwrap();
    }

    fn at_noon(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn streak_counts_consecutive_prior_days() {
        let mut conn = test_conn();
        let plant = seed_plant(&mut conn);
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        for back in 1..=3u64 {
            log_watering(
                &mut conn,
                &plant,
                at_noon(today - chrono::Days::new(back)),
            );
        }
        let streak =
            watering_streak(&mut conn, &plant, chrono_tz::UTC, at_noon(today)).unwrap();
        assert_eq!(streak, 3);
    }

    #[test]
    fn streak_broken_by_missing_day() {
        let mut conn = test_conn();
        let plant = seed_plant(&mut conn);
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        // Yesterday watered, day before missed, three days ago watered.
        log_watering(&mut conn, &plant, at_noon(today - chrono::Days::new(1)));
        log_watering(&mut conn, &plant, at_noon(today - chrono::Days::new(3)));
        let streak =
            watering_streak(&mut conn, &plant, chrono_tz::UTC, at_noon(today)).unwrap();
        assert_eq!(streak, 1);
    }

    #[test]
    fn streak_ignores_todays_watering() {
        let mut conn = test_conn();
        let plant = seed_plant(&mut conn);
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        log_watering(&mut conn, &plant, at_noon(today));
        let streak =
            watering_streak(&mut conn, &plant, chrono_tz::UTC, at_noon(today)).unwrap();
        assert_eq!(streak, 0);
    }

    #[test]
    fn streak_buckets_days_in_configured_timezone() {
        let mut conn = test_conn();
        let plant = seed_plant(&mut conn);
        // 23:30 UTC on Mar 9 is already Mar 10 in Warsaw (UTC+1). Seen
        // from midday Mar 11, that watering falls on yesterday in Warsaw
        // but two days back in UTC.
        let log_at = NaiveDate::from_ymd_opt(2026, 3, 9)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();
        log_watering(&mut conn, &plant, log_at);
        let now = NaiveDate::from_ymd_opt(2026, 3, 11)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let streak =
            watering_streak(&mut conn, &plant, chrono_tz::Europe::Warsaw, now).unwrap();
        assert_eq!(streak, 1);
        let streak_utc = watering_streak(&mut conn, &plant, chrono_tz::UTC, now).unwrap();
        assert_eq!(streak_utc, 0);
    }

    #[test]
    fn expire_overdue_row_is_lazy_and_idempotent() {
        use schema::{assignments, commitments};
        let mut conn = test_conn();
        seed_plant(&mut conn);
        let now = Utc::now().naive_utc();
        diesel::insert_into(commitments::table)
            .values(NewCommitment {
                id: "c1",
                guardian_id: "mom",
                title: "Brush teeth",
                description: None,
                recurrence: "daily",
                start_date: now - Duration::days(2),
                end_date: None,
                active: true,
                sticker_image_ref: None,
                created_at: now - Duration::days(2),
            })
            .execute(&mut conn)
            .unwrap();
        diesel::insert_into(assignments::table)
            .values(NewAssignment {
                id: "a1",
                commitment_id: "c1",
                dependent_id: "kid",
                due_date: now - Duration::days(1),
                status: "pending",
                created_at: now - Duration::days(2),
            })
            .execute(&mut conn)
            .unwrap();

        assert_eq!(expire_overdue_row(&mut conn, "a1", now).unwrap(), 1);
        // Second materialization finds nothing pending; same end state.
        assert_eq!(expire_overdue_row(&mut conn, "a1", now).unwrap(), 0);
        let status: String = assignments::table
            .filter(assignments::id.eq("a1"))
            .select(assignments::status)
            .first(&mut conn)
            .unwrap();
        assert_eq!(status, "expired");
    }

    #[test]
    fn grant_experience_without_plant_is_noop() {
        use schema::dependents;
        let mut conn = test_conn();
        diesel::insert_into(dependents::table)
            .values(NewDependent {
                id: "solo",
                display_name: "Solo",
            })
            .execute(&mut conn)
            .unwrap();
        let touched = grant_experience(&mut conn, "solo", 25).unwrap();
        assert_eq!(touched, 0);
    }
}
