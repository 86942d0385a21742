//! `GET /liquid-intake`

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{cached, f64_field, non_empty, sorted_entries, str_field, ApiError, AppState};
use crate::realtime::{Body, QueryParams};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntakeQuery {
    pub start_time: String,
    pub end_time: String,
    pub index: String,
}

impl IntakeQuery {
    fn cache_key(&self) -> String {
        format!("intake:{}:{}:{}", self.start_time, self.end_time, self.index)
    }

    fn params(&self) -> QueryParams {
        QueryParams {
            start_time: non_empty(&self.start_time),
            end_time: non_empty(&self.end_time),
            index: non_empty(&self.index),
            ..QueryParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidIntakeEntry {
    pub date_created: String,
    pub source: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume_in_liter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidIntakeResponse {
    pub entries: Vec<LiquidIntakeEntry>,
}

impl LiquidIntakeResponse {
    pub fn from_body(body: &Body) -> Self {
        let data = body.merged_data();
        let entries = sorted_entries(&data)
            .into_iter()
            .map(|entry| LiquidIntakeEntry {
                date_created: str_field(entry, "dateCreated"),
                source: str_field(entry, "source"),
                time: str_field(entry, "time"),
                kind: str_field(entry, "type"),
                volume_in_liter: f64_field(entry, "volumeInLiter"),
            })
            .collect();
        Self { entries }
    }
}

pub(super) async fn get_liquid_intake(
    State(state): State<AppState>,
    Query(query): Query<IntakeQuery>,
) -> Result<Json<Value>, ApiError> {
    cached(&state, query.cache_key(), async {
        let path = format!("/liquidIntake/{}", state.user_id()?);
        let body = state.query_ok(&path, query.params()).await?;
        Ok::<_, ApiError>(LiquidIntakeResponse::from_body(&body))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_streamed_body_is_flattened_in_key_order() {
        let body = Body {
            status: Some("ok".into()),
            data: Some(json!([
                {"-Nb": {"dateCreated": "2024-01-02", "source": "bottle", "time": "1704153600000",
                         "type": "water", "volumeInLiter": 0.5}},
                {"-Na": {"dateCreated": "2024-01-01", "source": "manual", "time": "1704067200000",
                         "type": "water", "volumeInLiter": 0.25}}
            ])),
            ..Body::default()
        };

        let response = LiquidIntakeResponse::from_body(&body);
        assert_eq!(
            response.entries,
            vec![
                LiquidIntakeEntry {
                    date_created: "2024-01-01".into(),
                    source: "manual".into(),
                    time: "1704067200000".into(),
                    kind: "water".into(),
                    volume_in_liter: 0.25,
                },
                LiquidIntakeEntry {
                    date_created: "2024-01-02".into(),
                    source: "bottle".into(),
                    time: "1704153600000".into(),
                    kind: "water".into(),
                    volume_in_liter: 0.5,
                },
            ]
        );
    }

    #[test]
    fn test_empty_payload_gives_empty_entries() {
        let response = LiquidIntakeResponse::from_body(&Body::default());
        assert!(response.entries.is_empty());
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"entries": []}));
    }

    #[test]
    fn test_query_maps_empty_strings_to_absent() {
        let query = IntakeQuery {
            start_time: "0".into(),
            end_time: String::new(),
            index: "time".into(),
        };
        let params = query.params();
        assert_eq!(params.start_time.as_deref(), Some("0"));
        assert_eq!(params.end_time, None);
        assert_eq!(params.index.as_deref(), Some("time"));
        assert_eq!(query.cache_key(), "intake:0::time");
    }

    #[test]
    fn test_entry_serializes_with_wire_names() {
        let entry = LiquidIntakeEntry {
            date_created: "d".into(),
            source: "s".into(),
            time: "t".into(),
            kind: "water".into(),
            volume_in_liter: 1.0,
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"dateCreated": "d", "source": "s", "time": "t", "type": "water", "volumeInLiter": 1.0})
        );
    }
}
