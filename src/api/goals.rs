//! `GET /hydration-goal`

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{cached, f64_field, non_empty, sorted_entries, str_field, ApiError, AppState};
use crate::realtime::{Body, QueryParams};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoalsQuery {
    pub view_from: String,
    pub index: String,
}

impl GoalsQuery {
    fn cache_key(&self) -> String {
        format!("hydration-goals:{}:{}", self.view_from, self.index)
    }

    fn params(&self) -> QueryParams {
        QueryParams {
            view_from: non_empty(&self.view_from),
            index: non_empty(&self.index),
            ..QueryParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationGoalEntry {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume_in_liter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationGoalResponse {
    pub entries: Vec<HydrationGoalEntry>,
}

impl HydrationGoalResponse {
    pub fn from_body(body: &Body) -> Self {
        let data = body.merged_data();
        let entries = sorted_entries(&data)
            .into_iter()
            .map(|entry| HydrationGoalEntry {
                time: str_field(entry, "time"),
                kind: str_field(entry, "type"),
                volume_in_liter: f64_field(entry, "volumeInLiter"),
            })
            .collect();
        Self { entries }
    }
}

pub(super) async fn get_hydration_goals(
    State(state): State<AppState>,
    Query(query): Query<GoalsQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, query.cache_key(), async {
        let path = format!("/hydrationGoal/{}", state.user_id()?);
        let body = state.query_ok(&path, query.params()).await?;
        Ok::<_, ApiError>(HydrationGoalResponse::from_body(&body))
    })
    .await
}
