use crate::storage::schema::{
    assignments, commitments, dependents, plant_types, plants, reward_definitions,
    reward_redemptions, sessions, stickers, watering_logs,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = dependents)]
pub struct Dependent {
    pub id: String,
    pub display_name: String,
}

#[derive(Insertable)]
#[diesel(table_name = dependents)]
pub struct NewDependent<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = commitments)]
pub struct Commitment {
    pub id: String,
    pub guardian_id: String,
    pub title: String,
    pub description: Option<String>,
    pub recurrence: String,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub active: bool,
    pub sticker_image_ref: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = commitments)]
pub struct NewCommitment<'a> {
    pub id: &'a str,
    pub guardian_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub recurrence: &'a str,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub active: bool,
    pub sticker_image_ref: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = assignments)]
#[diesel(belongs_to(Commitment, foreign_key = commitment_id))]
#[diesel(belongs_to(Dependent, foreign_key = dependent_id))]
pub struct Assignment {
    pub id: String,
    pub commitment_id: String,
    pub dependent_id: String,
    pub due_date: NaiveDateTime,
    pub status: String,
    pub verification_image_ref: Option<String>,
    pub verification_note: Option<String>,
    pub verification_time: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = assignments)]
pub struct NewAssignment<'a> {
    pub id: &'a str,
    pub commitment_id: &'a str,
    pub dependent_id: &'a str,
    pub due_date: NaiveDateTime,
    pub status: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = stickers)]
#[diesel(belongs_to(Dependent, foreign_key = dependent_id))]
pub struct Sticker {
    pub id: String,
    pub dependent_id: String,
    pub source_assignment_id: String,
    pub title: String,
    pub image_ref: String,
    pub minted_at: NaiveDateTime,
    pub redemption_id: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = stickers)]
pub struct NewSticker<'a> {
    pub id: &'a str,
    pub dependent_id: &'a str,
    pub source_assignment_id: &'a str,
    pub title: &'a str,
    pub image_ref: &'a str,
    pub minted_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = reward_definitions)]
pub struct RewardDefinition {
    pub id: String,
    pub guardian_id: String,
    pub title: String,
    pub required_stickers: i32,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = reward_definitions)]
pub struct NewRewardDefinition<'a> {
    pub id: &'a str,
    pub guardian_id: &'a str,
    pub title: &'a str,
    pub required_stickers: i32,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = reward_redemptions)]
#[diesel(belongs_to(RewardDefinition, foreign_key = reward_id))]
pub struct RewardRedemption {
    pub id: String,
    pub reward_id: String,
    pub dependent_id: String,
    pub sticker_count: i32,
    pub redeemed_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = reward_redemptions)]
pub struct NewRewardRedemption<'a> {
    pub id: &'a str,
    pub reward_id: &'a str,
    pub dependent_id: &'a str,
    pub sticker_count: i32,
    pub redeemed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = plant_types)]
pub struct PlantType {
    pub id: String,
    pub name: String,
    pub max_stage: i32,
    pub experience_per_stage: i32,
    pub image_ref: String,
}

#[derive(Insertable)]
#[diesel(table_name = plant_types)]
pub struct NewPlantType<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub max_stage: i32,
    pub experience_per_stage: i32,
    pub image_ref: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = plants)]
#[diesel(belongs_to(PlantType, foreign_key = plant_type_id))]
#[diesel(belongs_to(Dependent, foreign_key = dependent_id))]
pub struct Plant {
    pub id: String,
    pub dependent_id: String,
    pub plant_type_id: String,
    pub stage: i32,
    pub health: i32,
    pub experience: i32,
    pub experience_to_advance: i32,
    pub last_watered_at: Option<NaiveDateTime>,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = plants)]
pub struct NewPlant<'a> {
    pub id: &'a str,
    pub dependent_id: &'a str,
    pub plant_type_id: &'a str,
    pub stage: i32,
    pub health: i32,
    pub experience: i32,
    pub experience_to_advance: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = watering_logs)]
#[diesel(belongs_to(Plant, foreign_key = plant_id))]
pub struct WateringLog {
    pub id: i32,
    pub plant_id: String,
    pub watered_at: NaiveDateTime,
    pub health_gain: i32,
}

#[derive(Insertable)]
#[diesel(table_name = watering_logs)]
pub struct NewWateringLog<'a> {
    pub plant_id: &'a str,
    pub watered_at: NaiveDateTime,
    pub health_gain: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(jti))]
pub struct Session {
    pub jti: String,
    pub username: String,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}
