use chrono::{Duration, Utc};
use growpromise_server::storage::{
    CreateCommitmentParams, DomainError, GrowthRules, Store, StorageError,
};
use growpromise_shared::domain::{AssignmentStatus, Dependent, PlantType, Recurrence};

async fn test_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("engine.db");
    let store = Store::connect_sqlite(db_path.to_str().unwrap())
        .await
        .expect("db");
    store
        .seed_from_config(
            &[
                Dependent {
                    id: "alice".into(),
                    display_name: "Alice".into(),
                },
                Dependent {
                    id: "bob".into(),
                    display_name: "Bob".into(),
                },
            ],
            &[PlantType {
                id: "sunflower".into(),
                name: "Sunflower".into(),
                max_stage: 3,
                experience_per_stage: 100,
                image_ref: "plants/sunflower.png".into(),
            }],
        )
        .await
        .expect("seed");
    (store, dir)
}

fn growth() -> GrowthRules {
    GrowthRules {
        approval_experience: 120,
        ..GrowthRules::default()
    }
}

async fn create_daily_commitment(store: &Store, title: &str, dependents: &[&str]) -> String {
    let row = store
        .create_commitment(CreateCommitmentParams {
            guardian_id: "mom".into(),
            title: title.into(),
            description: Some("every evening".into()),
            recurrence: Recurrence::Daily,
            start_date: Utc::now().naive_utc() + Duration::hours(12),
            end_date: None,
            dependent_ids: dependents.iter().map(|s| s.to_string()).collect(),
            sticker_image_ref: None,
        })
        .await
        .expect("create commitment");
    row.id
}

async fn pending_assignment_id(store: &Store, dependent: &str) -> String {
    store
        .list_assignments_for_dependent(dependent)
        .await
        .unwrap()
        .into_iter()
        .find(|(a, _)| a.status == AssignmentStatus::Pending.as_str())
        .map(|(a, _)| a.id)
        .expect("pending assignment")
}

async fn approved_sticker_count(store: &Store, dependent: &str) -> i64 {
    store.compute_balance(dependent).await.unwrap().total_minted
}

fn assert_domain<T: std::fmt::Debug>(
    result: Result<T, StorageError>,
    check: impl FnOnce(&DomainError) -> bool,
) {
    match result {
        Err(StorageError::Domain(ref d)) if check(d) => {}
        other => panic!("expected domain error, got {other:?}"),
    }
}

#[tokio::test]
async fn submit_then_approve_mints_one_sticker_and_grants_experience() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Brush teeth", &["alice"]).await;
    store
        .create_plant("alice", "sunflower", &growth())
        .await
        .unwrap();

    let aid = pending_assignment_id(&store, "alice").await;
    let (row, title) = store
        .submit_verification("alice", &aid, "img/proof-1.jpg", Some("done!"))
        .await
        .unwrap();
    assert_eq!(row.status, AssignmentStatus::Submitted.as_str());
    assert_eq!(title, "Brush teeth");

    let (row, _) = store
        .approve_assignment(&aid, &growth(), "stickers/default.png")
        .await
        .unwrap();
    assert_eq!(row.status, AssignmentStatus::Approved.as_str());
    assert!(row.completed_at.is_some());

    assert_eq!(approved_sticker_count(&store, "alice").await, 1);
    let (plant, _) = store.get_plant("alice").await.unwrap().unwrap();
    assert_eq!(plant.experience, 120);

    // The minted sticker carries the commitment title.
    let stickers = store.list_stickers_for_dependent("alice", 1, 10).await.unwrap();
    assert_eq!(stickers.len(), 1);
    assert_eq!(stickers[0].title, "Brush teeth");
    assert_eq!(stickers[0].source_assignment_id, aid);
}

#[tokio::test]
async fn double_approval_race_mints_at_most_one_sticker() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Feed the cat", &["alice"]).await;
    let aid = pending_assignment_id(&store, "alice").await;
    store
        .submit_verification("alice", &aid, "img/cat.jpg", None)
        .await
        .unwrap();

    store
        .approve_assignment(&aid, &growth(), "stickers/default.png")
        .await
        .unwrap();
    // Second device replays the approval; the CAS refuses it.
    let second = store
        .approve_assignment(&aid, &growth(), "stickers/default.png")
        .await;
    assert_domain(second, |d| {
        matches!(d, DomainError::InvalidTransition { action: "approve", from } if from.as_str() == "approved")
    });
    assert_eq!(approved_sticker_count(&store, "alice").await, 1);
}

#[tokio::test]
async fn submit_is_guarded_against_illegal_states() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Homework", &["alice"]).await;
    let aid = pending_assignment_id(&store, "alice").await;

    // Submitting with no image is malformed input, not a transition.
    assert_domain(
        store.submit_verification("alice", &aid, "  ", None).await,
        |d| matches!(d, DomainError::Validation(_)),
    );

    store
        .submit_verification("alice", &aid, "img/hw.jpg", None)
        .await
        .unwrap();
    // Submitting an already-submitted assignment is refused.
    assert_domain(
        store
            .submit_verification("alice", &aid, "img/hw2.jpg", None)
            .await,
        |d| matches!(d, DomainError::InvalidTransition { action: "submit", .. }),
    );
}

#[tokio::test]
async fn rejected_assignment_can_be_resubmitted() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Tidy room", &["alice"]).await;
    let aid = pending_assignment_id(&store, "alice").await;
    store
        .submit_verification("alice", &aid, "img/room.jpg", None)
        .await
        .unwrap();

    // A reason is mandatory.
    assert_domain(store.reject_assignment(&aid, "   ").await, |d| {
        matches!(d, DomainError::Validation(_))
    });

    let (row, _) = store
        .reject_assignment(&aid, "bed still a mess")
        .await
        .unwrap();
    assert_eq!(row.status, AssignmentStatus::Rejected.as_str());
    assert_eq!(row.rejection_reason.as_deref(), Some("bed still a mess"));

    // Rejection re-opens the assignment for another try.
    let (row, _) = store
        .submit_verification("alice", &aid, "img/room2.jpg", Some("fixed"))
        .await
        .unwrap();
    assert_eq!(row.status, AssignmentStatus::Submitted.as_str());

    // No sticker was minted along the way.
    assert_eq!(approved_sticker_count(&store, "alice").await, 0);
}

#[tokio::test]
async fn overdue_pending_assignment_expires_on_read_and_stays_terminal() {
    let (store, _dir) = test_store().await;
    let row = store
        .create_commitment(CreateCommitmentParams {
            guardian_id: "mom".into(),
            title: "Water flowers".into(),
            description: None,
            recurrence: Recurrence::Once,
            start_date: Utc::now().naive_utc() - Duration::days(1),
            end_date: None,
            dependent_ids: vec!["alice".into()],
            sticker_image_ref: None,
        })
        .await
        .unwrap();
    assert_eq!(row.recurrence, "once");

    // The read itself materializes the transition.
    let listed = store.list_assignments_for_dependent("alice").await.unwrap();
    assert_eq!(listed.len(), 1);
    let (assignment, _) = &listed[0];
    assert_eq!(assignment.status, AssignmentStatus::Expired.as_str());

    // Terminal: no submission can revive it.
    assert_domain(
        store
            .submit_verification("alice", &assignment.id, "img/late.jpg", None)
            .await,
        |d| matches!(d, DomainError::InvalidTransition { action: "submit", from } if from.as_str() == "expired"),
    );
}

#[tokio::test]
async fn instantiate_is_idempotent_per_due_date() {
    let (store, _dir) = test_store().await;
    let cid = create_daily_commitment(&store, "Read a book", &["alice", "bob"]).await;
    let due = Utc::now().naive_utc() + Duration::days(1);

    let created = store
        .instantiate_assignments(&cid, due, None)
        .await
        .unwrap();
    assert_eq!(created, 2);
    // Replaying the same instantiation creates nothing new.
    let replay = store
        .instantiate_assignments(&cid, due, None)
        .await
        .unwrap();
    assert_eq!(replay, 0);

    let listed = store.list_assignments_for_dependent("alice").await.unwrap();
    assert_eq!(listed.len(), 2); // creation-time + instantiated
}

#[tokio::test]
async fn redeem_reports_shortfall_and_never_overdraws() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Brush teeth", &["alice"]).await;
    let reward = store.create_reward("mom", "Ice cream", 3).await.unwrap();

    // Earn two stickers via two approvals.
    for n in 0..2 {
        let aid = pending_assignment_id(&store, "alice").await;
        store
            .submit_verification("alice", &aid, &format!("img/p{n}.jpg"), None)
            .await
            .unwrap();
        store
            .approve_assignment(&aid, &growth(), "stickers/default.png")
            .await
            .unwrap();
        if n == 0 {
            let due = Utc::now().naive_utc() + Duration::days(1);
            store
                .instantiate_assignments(
                    &store.list_commitments().await.unwrap()[0].id,
                    due,
                    None,
                )
                .await
                .unwrap();
        }
    }

    let err = store.redeem_reward("alice", &reward.id).await;
    assert_domain(err, |d| {
        d.shortfall() == Some(1)
            && matches!(
                d,
                DomainError::InsufficientBalance {
                    required: 3,
                    available: 2
                }
            )
    });
    // The failed redemption spent nothing.
    let balance = store.compute_balance("alice").await.unwrap();
    assert_eq!(balance.available(), 2);
    assert_eq!(balance.total_redeemed, 0);
}

#[tokio::test]
async fn redeem_consumes_the_oldest_stickers_atomically() {
    let (store, _dir) = test_store().await;
    let cid = create_daily_commitment(&store, "Homework", &["alice"]).await;
    let reward = store.create_reward("mom", "Cinema trip", 2).await.unwrap();

    // Three approvals on three due dates, spaced so minted_at ordering
    // follows approval ordering.
    let mut minted_order = Vec::new();
    for day in 0..3 {
        if day > 0 {
            let due = Utc::now().naive_utc() + Duration::days(day);
            store
                .instantiate_assignments(&cid, due, None)
                .await
                .unwrap();
        }
        let aid = pending_assignment_id(&store, "alice").await;
        store
            .submit_verification("alice", &aid, &format!("img/d{day}.jpg"), None)
            .await
            .unwrap();
        store
            .approve_assignment(&aid, &growth(), "stickers/default.png")
            .await
            .unwrap();
        minted_order.push(aid);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let outcome = store.redeem_reward("alice", &reward.id).await.unwrap();
    assert_eq!(outcome.redemption.sticker_count, 2);
    assert_eq!(outcome.available_after, 1);

    // The two oldest stickers are the ones consumed.
    let stickers = store.list_stickers_for_dependent("alice", 1, 10).await.unwrap();
    let redeemed_sources: Vec<&str> = stickers
        .iter()
        .filter(|s| s.redemption_id.is_some())
        .map(|s| s.source_assignment_id.as_str())
        .collect();
    assert_eq!(redeemed_sources.len(), 2);
    assert!(redeemed_sources.contains(&minted_order[0].as_str()));
    assert!(redeemed_sources.contains(&minted_order[1].as_str()));

    let balance = store.compute_balance("alice").await.unwrap();
    assert_eq!(balance.available(), 1);
    assert!(balance.available() >= 0);
}

#[tokio::test]
async fn inactive_reward_cannot_be_redeemed() {
    let (store, _dir) = test_store().await;
    let reward = store.create_reward("mom", "Zoo visit", 1).await.unwrap();
    assert!(store.deactivate_reward(&reward.id).await.unwrap());
    assert_domain(store.redeem_reward("alice", &reward.id).await, |d| {
        matches!(d, DomainError::Validation(_))
    });
}

#[tokio::test]
async fn only_one_active_plant_per_dependent() {
    let (store, _dir) = test_store().await;
    store
        .create_plant("alice", "sunflower", &growth())
        .await
        .unwrap();
    assert_domain(
        store.create_plant("alice", "sunflower", &growth()).await,
        |d| matches!(d, DomainError::InvalidTransition { .. }),
    );
}

#[tokio::test]
async fn watering_window_blocks_early_and_allows_boundary() {
    let (store, _dir) = test_store().await;
    store
        .create_plant("alice", "sunflower", &growth())
        .await
        .unwrap();

    let rules = GrowthRules {
        watering_health_gain: 10,
        ..GrowthRules::default()
    };
    let first = store.water_plant("alice", &rules).await.unwrap();
    assert_eq!(first.plant.health, 90);
    assert_eq!(first.streak_days, 0);

    // Rolling 24h window: an immediate retry is an expected refusal.
    assert_domain(store.water_plant("alice", &rules).await, |d| {
        matches!(d, DomainError::AlreadyWatered { retry_after_minutes } if *retry_after_minutes > 0)
    });

    // A zero-length window makes `elapsed >= window` hold immediately,
    // which is the exact-boundary case: it must succeed, and health
    // clamps at the ceiling.
    let boundary = GrowthRules {
        watering_health_gain: 50,
        watering_interval_hours: 0,
        ..GrowthRules::default()
    };
    let second = store.water_plant("alice", &boundary).await.unwrap();
    assert_eq!(second.plant.health, 100);
    let third = store.water_plant("alice", &boundary).await.unwrap();
    assert_eq!(third.plant.health, 100);
}

#[tokio::test]
async fn advance_carries_surplus_experience_and_completes_at_max_stage() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Brush teeth", &["alice"]).await;
    store
        .create_plant("alice", "sunflower", &growth())
        .await
        .unwrap();

    // Not enough experience yet.
    assert_domain(store.advance_plant("alice").await, |d| {
        matches!(
            d,
            DomainError::NotEnoughExperience {
                required: 100,
                current: 0
            }
        )
    });

    // One approval grants 120 experience (the configured amount).
    let aid = pending_assignment_id(&store, "alice").await;
    store
        .submit_verification("alice", &aid, "img/p.jpg", None)
        .await
        .unwrap();
    store
        .approve_assignment(&aid, &growth(), "stickers/default.png")
        .await
        .unwrap();

    // 120 - 100 = 20 carried forward, not reset.
    let (plant, _) = store.advance_plant("alice").await.unwrap();
    assert_eq!(plant.stage, 2);
    assert_eq!(plant.experience, 20);
    assert!(!plant.completed);

    // Push to the final stage: grant another 180 via a replayed grant
    // path (two more approvals on new due dates).
    let cid = store.list_commitments().await.unwrap()[0].id.clone();
    for day in 1..=2 {
        let due = Utc::now().naive_utc() + Duration::days(day);
        store.instantiate_assignments(&cid, due, None).await.unwrap();
        let aid = pending_assignment_id(&store, "alice").await;
        store
            .submit_verification("alice", &aid, "img/more.jpg", None)
            .await
            .unwrap();
        store
            .approve_assignment(&aid, &growth(), "stickers/default.png")
            .await
            .unwrap();
    }

    let (plant, _) = store.advance_plant("alice").await.unwrap();
    assert_eq!(plant.stage, 3);
    assert!(plant.completed);
    assert!(plant.completed_at.is_some());

    // A completed plant is immutable.
    assert_domain(store.advance_plant("alice").await, |d| {
        matches!(d, DomainError::PlantCompleted)
    });
    assert_domain(
        store.water_plant("alice", &GrowthRules::default()).await,
        |d| matches!(d, DomainError::PlantCompleted),
    );

    // And a new plant may now be adopted.
    store
        .create_plant("alice", "sunflower", &growth())
        .await
        .unwrap();
}

#[tokio::test]
async fn experience_grant_without_plant_is_a_noop() {
    let (store, _dir) = test_store().await;
    create_daily_commitment(&store, "Brush teeth", &["bob"]).await;
    let aid = pending_assignment_id(&store, "bob").await;
    store
        .submit_verification("bob", &aid, "img/p.jpg", None)
        .await
        .unwrap();
    // Bob has no plant; approval still succeeds and mints.
    store
        .approve_assignment(&aid, &growth(), "stickers/default.png")
        .await
        .unwrap();
    assert_eq!(approved_sticker_count(&store, "bob").await, 1);
    assert!(store.get_plant("bob").await.unwrap().is_none());
}
