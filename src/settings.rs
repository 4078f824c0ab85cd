use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_ERROR_STATUS_CODE: u16 = 400;
pub const DEFAULT_ERROR_BODY: &str = r#"{"error":"Bad Request","message":"Webhook is disabled"}"#;

/// Runtime switches controlling how `/webhook` behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Capture normally when set; otherwise the endpoint is disabled.
    pub active: bool,
    /// While disabled, answer as if `/webhook` had no route at all.
    pub simulate_downtime: bool,
    pub error_status_code: u16,
    pub error_body: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active: true,
            simulate_downtime: false,
            error_status_code: DEFAULT_ERROR_STATUS_CODE,
            error_body: DEFAULT_ERROR_BODY.to_owned(),
        }
    }
}

/// A partial settings update.
///
/// Built field by field from arbitrary JSON: a field only lands here when it
/// is present and well typed. Everything else is remembered in `ignored` so
/// it can be reported, and never applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub active: Option<bool>,
    pub simulate_downtime: Option<bool>,
    pub error_status_code: Option<u16>,
    pub error_body: Option<String>,
    pub ignored: Vec<String>,
}

impl SettingsPatch {
    /// Body that isn't a JSON object yields an empty patch.
    pub fn from_slice(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => Self::from_fields(&fields),
            _ => Self::default(),
        }
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut patch = Self::default();
        for (name, value) in fields {
            let accepted = match name.as_str() {
                "active" => value.as_bool().map(|v| patch.active = Some(v)),
                "simulateDowntime" => value.as_bool().map(|v| patch.simulate_downtime = Some(v)),
                // hyper refuses 1xx as a final status, so those can't be served.
                "errorStatusCode" => value
                    .as_u64()
                    .filter(|code| (200..=599).contains(code))
                    .and_then(|code| u16::try_from(code).ok())
                    .map(|code| patch.error_status_code = Some(code)),
                "errorBody" => value
                    .as_str()
                    .map(|body| patch.error_body = Some(body.to_owned())),
                _ => None,
            };
            if accepted.is_none() {
                patch.ignored.push(name.clone());
            }
        }
        patch
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(active) = self.active {
            settings.active = active;
        }
        if let Some(simulate_downtime) = self.simulate_downtime {
            settings.simulate_downtime = simulate_downtime;
        }
        if let Some(code) = self.error_status_code {
            settings.error_status_code = code;
        }
        if let Some(body) = &self.error_body {
            settings.error_body.clone_from(body);
        }
    }
}

/// Shared handle to the live [`Settings`]. Clones point at the same value.
#[derive(Debug, Clone, Default)]
pub struct SettingsState {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsState {
    pub fn get(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `patch` under the write lock and returns the resulting settings.
    pub fn update(&self, patch: &SettingsPatch) -> Settings {
        let mut settings = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        patch.apply(&mut settings);
        settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> SettingsPatch {
        SettingsPatch::from_slice(value.to_string().as_bytes())
    }

    #[test]
    fn defaults_capture_with_bad_request_body() {
        let settings = Settings::default();
        assert!(settings.active);
        assert!(!settings.simulate_downtime);
        assert_eq!(settings.error_status_code, 400);

        let body: Value = serde_json::from_str(&settings.error_body).unwrap();
        assert_eq!(
            body,
            json!({"error": "Bad Request", "message": "Webhook is disabled"})
        );
    }

    #[test]
    fn settings_serialize_camel_case() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(value["active"], json!(true));
        assert_eq!(value["simulateDowntime"], json!(false));
        assert_eq!(value["errorStatusCode"], json!(400));
        assert!(value["errorBody"].is_string());
    }

    #[test]
    fn well_typed_fields_are_applied() {
        let state = SettingsState::default();
        let updated = state.update(&patch(json!({
            "active": false,
            "simulateDowntime": true,
            "errorStatusCode": 503,
            "errorBody": "down",
        })));

        assert_eq!(
            updated,
            Settings {
                active: false,
                simulate_downtime: true,
                error_status_code: 503,
                error_body: "down".to_owned(),
            }
        );
        assert_eq!(state.get(), updated);
    }

    #[test]
    fn mistyped_and_unknown_fields_are_ignored() {
        let state = SettingsState::default();
        state.update(&patch(json!({"errorStatusCode": 418, "active": false})));

        let p = patch(json!({
            "errorStatusCode": "abc",
            "active": "no",
            "errorBody": 12,
            "bogus": true,
        }));
        assert_eq!(p.active, None);
        assert_eq!(p.error_status_code, None);
        assert_eq!(p.error_body, None);
        let mut ignored = p.ignored.clone();
        ignored.sort();
        assert_eq!(ignored, ["active", "bogus", "errorBody", "errorStatusCode"]);

        let updated = state.update(&p);
        assert_eq!(updated.error_status_code, 418);
        assert!(!updated.active);
        assert_eq!(updated.error_body, DEFAULT_ERROR_BODY);
    }

    #[test]
    fn out_of_range_status_codes_are_ignored() {
        for code in [
            json!(99),
            json!(100),
            json!(102),
            json!(199),
            json!(600),
            json!(-1),
            json!(70000),
            json!(404.5),
        ] {
            let p = patch(json!({ "errorStatusCode": code }));
            assert_eq!(p.error_status_code, None, "accepted {code}");
        }
        assert_eq!(
            patch(json!({"errorStatusCode": 599})).error_status_code,
            Some(599)
        );
        assert_eq!(
            patch(json!({"errorStatusCode": 200})).error_status_code,
            Some(200)
        );
    }

    #[test]
    fn informational_status_keeps_prior_value() {
        let state = SettingsState::default();
        state.update(&patch(json!({"errorStatusCode": 503})));

        let updated = state.update(&patch(json!({"errorStatusCode": 102, "errorBody": "busy"})));
        assert_eq!(updated.error_status_code, 503);
        assert_eq!(updated.error_body, "busy");
    }

    #[test]
    fn non_object_bodies_are_empty_patches() {
        for body in ["", "not json", "[1,2]", "true"] {
            assert_eq!(SettingsPatch::from_slice(body.as_bytes()), SettingsPatch::default());
        }
    }

    #[test]
    fn clones_share_state() {
        let state = SettingsState::default();
        let other = state.clone();
        other.update(&patch(json!({"active": false})));
        assert!(!state.get().active);
    }
}
