//! `GET /device-info`

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{bool_field, cached, f64_field, str_field, ApiError, AppState};
use crate::realtime::{Body, QueryParams};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceQuery {
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoResponse {
    pub name: String,
    pub color: String,
    pub size_in_milliliter: f64,
    pub pure_vis_power_mode: String,
    pub is_filter_tracking_enabled: bool,
}

impl DeviceInfoResponse {
    pub fn from_body(body: &Body) -> Self {
        let data = body.merged_data();
        Self {
            name: str_field(&data, "name"),
            color: str_field(&data, "color"),
            size_in_milliliter: f64_field(&data, "sizeInMilliliter"),
            pure_vis_power_mode: str_field(&data, "pureVisPowerMode"),
            is_filter_tracking_enabled: bool_field(&data, "isFilterTrackingEnabled"),
        }
    }
}

pub(super) async fn get_device_info(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<Value>, ApiError> {
    if query.device_id.is_empty() {
        return Err(ApiError::BadRequest("deviceId is required".to_string()));
    }

    let key = format!("device-info:{}", query.device_id);
    cached(&state, key, async {
        let path = format!("/devices/{}/{}", state.user_id()?, query.device_id);
        let body = state.query_ok(&path, QueryParams::default()).await?;
        Ok::<_, ApiError>(DeviceInfoResponse::from_body(&body))
    })
    .await
}
