//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with [`AppSettings::default`].
//! 2. Load from a TOML or JSON document (overriding defaults).
//! 3. Apply `REPORT_*` environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `REPORT_DEBUG` | `debug` |
//! | `REPORT_LOG_LEVEL` | `log_level` |
//! | `REPORT_DEFAULT_CELL_VALUE` | `default_cell_value` |
//! | `REPORT_EDITORS_GROUP_NAME` | `editors_group_name` |
//! | `REPORT_MODEL_USER_PATH_FUNC_NAME` | `model_user_path_func_name` |
//! | `REPORT_MODEL_EXPORT_KWARGS_FUNC_NAME` | `model_export_kwargs_func_name` |
//! | `REPORT_REALTIME_QUICKSEARCH` | `realtime_quicksearch` |
//! | `REPORT_LANGUAGE_CODE` | `language_code` |
//! | `REPORT_CALENDAR` | `calendar` |
//! | `REPORT_MEDIA_URL` | `media_url` |
//! | `REPORT_SITE_URL` | `site_url` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use flex_report_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/report.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::ReportError;
use crate::settings::AppSettings;

/// Loads settings from a TOML string.
///
/// Keys missing from the document keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<AppSettings, ReportError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| ReportError::ImproperlyConfigured(format!("Failed to parse TOML: {e}")))?;
    merge_onto_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<AppSettings, ReportError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        ReportError::ImproperlyConfigured(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<AppSettings, ReportError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<AppSettings, ReportError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| ReportError::ImproperlyConfigured(format!("Failed to parse JSON: {e}")))?;
    merge_onto_defaults(json_value, "JSON")
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> AppSettings {
    let mut settings = AppSettings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `REPORT_*` environment variable overrides to a settings struct.
///
/// Boolean variables accept "true"/"1"/"yes" (case-insensitive); anything
/// else is false. Unparseable calendar names are ignored.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    if let Ok(val) = std::env::var("REPORT_DEBUG") {
        settings.debug = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("REPORT_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("REPORT_DEFAULT_CELL_VALUE") {
        settings.default_cell_value = val;
    }

    if let Ok(val) = std::env::var("REPORT_EDITORS_GROUP_NAME") {
        settings.editors_group_name = val;
    }

    if let Ok(val) = std::env::var("REPORT_MODEL_USER_PATH_FUNC_NAME") {
        settings.model_user_path_func_name = val;
    }

    if let Ok(val) = std::env::var("REPORT_MODEL_EXPORT_KWARGS_FUNC_NAME") {
        settings.model_export_kwargs_func_name = val;
    }

    if let Ok(val) = std::env::var("REPORT_REALTIME_QUICKSEARCH") {
        settings.realtime_quicksearch = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("REPORT_LANGUAGE_CODE") {
        settings.language_code = val;
    }

    if let Ok(val) = std::env::var("REPORT_CALENDAR") {
        match val.parse() {
            Ok(calendar) => settings.calendar = calendar,
            Err(e) => tracing::warn!("ignoring REPORT_CALENDAR: {e}"),
        }
    }

    if let Ok(val) = std::env::var("REPORT_MEDIA_URL") {
        settings.media_url = val;
    }

    if let Ok(val) = std::env::var("REPORT_SITE_URL") {
        settings.site_url = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn merge_onto_defaults(
    value: serde_json::Value,
    source: &str,
) -> Result<AppSettings, ReportError> {
    let default_json = serde_json::to_value(AppSettings::default()).map_err(|e| {
        ReportError::ImproperlyConfigured(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        ReportError::ImproperlyConfigured(format!(
            "Failed to deserialize settings from {source}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Calendar;

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = false
            log_level = "warn"
            default_cell_value = "-"
            calendar = "gregorian"
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.default_cell_value, "-");
        assert_eq!(settings.calendar, Calendar::Gregorian);
        // Untouched keys keep their defaults.
        assert_eq!(settings.editors_group_name, "report_editors");
    }

    #[test]
    fn test_from_toml_str_nested_time_formats() {
        let toml = r#"
            [time_formats]
            date = "%d.%m.%Y"
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.time_formats.date, "%d.%m.%Y");
        assert_eq!(settings.time_formats.datetime, "%H:%M %Y/%m/%d");
    }

    #[test]
    fn test_from_toml_str_money_format() {
        let toml = r#"
            [money_format]
            thousands_separator = ","
            pattern = "{currency}{amount}"
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.money_format.decimal_places, 2);
        assert_eq!(settings.money_format.format(1500.0, "$"), "$1,500.00");
    }

    #[test]
    fn test_from_toml_str_page_sizes() {
        let settings = from_toml_str("page_sizes = [10, 50]").unwrap();
        assert_eq!(settings.page_sizes, vec![10, 50]);
        assert_eq!(settings.default_page_size(), 10);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert_eq!(settings.page_sizes, vec![25, 75, 100, 200]);
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let err = from_toml_str("this is = = not toml").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        assert!(from_toml_str("realtime_quicksearch = \"sometimes\"").is_err());
    }

    #[test]
    fn test_from_json_str_basic() {
        let settings =
            from_json_str(r#"{"realtime_quicksearch": false, "language_code": "fa"}"#).unwrap();
        assert!(!settings.realtime_quicksearch);
        assert_eq!(settings.language_code, "fa");
    }

    #[test]
    fn test_from_toml_file_missing() {
        assert!(from_toml_file("/nonexistent/path/report.toml").is_err());
    }

    #[test]
    fn test_apply_env_overrides_cell_value() {
        let mut settings = AppSettings::default();
        std::env::set_var("REPORT_DEFAULT_CELL_VALUE", "n/a");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.default_cell_value, "n/a");
        std::env::remove_var("REPORT_DEFAULT_CELL_VALUE");
    }

    #[test]
    fn test_apply_env_overrides_quicksearch() {
        let mut settings = AppSettings::default();
        std::env::set_var("REPORT_REALTIME_QUICKSEARCH", "0");
        apply_env_overrides(&mut settings);
        assert!(!settings.realtime_quicksearch);
        std::env::remove_var("REPORT_REALTIME_QUICKSEARCH");
    }

    #[test]
    fn test_apply_env_overrides_invalid_calendar() {
        let mut settings = AppSettings::default();
        std::env::set_var("REPORT_CALENDAR", "lunar");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.calendar, Calendar::Jalali);
        std::env::remove_var("REPORT_CALENDAR");
    }

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"a": {"b": 1, "c": 2}});
        let over = serde_json::json!({"a": {"c": 3}});
        assert_eq!(merge_json(base, over), serde_json::json!({"a": {"b": 1, "c": 3}}));
    }

    #[test]
    fn test_merge_json_array_override() {
        let base = serde_json::json!({"a": [1, 2]});
        let over = serde_json::json!({"a": [3]});
        assert_eq!(merge_json(base, over), serde_json::json!({"a": [3]}));
    }
}
