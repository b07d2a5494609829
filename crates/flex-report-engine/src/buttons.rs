//! Row button resolution.
//!
//! A [`TableButton`] either links to a named route or fires a client-side
//! event. Link buttons are reversed per record; event buttons hand their
//! exposed columns to the event handler as a JSON object.

use std::collections::HashMap;

use flex_report_db::{Record, Value};
use flex_report_http::{QueryDict, UrlRouter};

use crate::models::TableButton;
use crate::render::CellRenderer;

/// The href used when a button has no usable route.
pub const NO_URL: &str = "#";

fn kwarg_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The keyword arguments of a link button for `record`.
///
/// Each kwarg reads the record field at its path; a path the record does not
/// have is used as a literal value.
pub fn button_kwargs(record: &Record, button: &TableButton) -> HashMap<String, String> {
    button
        .url_kwargs
        .iter()
        .map(|(kwarg, path)| {
            let value = record.lookup(path).map_or_else(|| path.clone(), kwarg_text);
            (kwarg.clone(), value)
        })
        .collect()
}

/// The href of a link button for `record`.
///
/// The route is reversed with the button's kwargs first. When the route takes
/// no such arguments, the kwargs are appended as a query string instead. A
/// button without a route, or whose route is unknown, yields `"#"`.
pub fn button_url(record: &Record, button: &TableButton, router: &UrlRouter) -> String {
    let Some(url_name) = button.url_name.as_deref().filter(|n| !n.is_empty()) else {
        return NO_URL.to_string();
    };
    let kwargs = button_kwargs(record, button);
    if let Ok(url) = router.reverse(url_name, &kwargs) {
        return url;
    }
    match router.reverse(url_name, &HashMap::new()) {
        Ok(url) => {
            let mut query = QueryDict::new_mutable();
            for (kwarg, value) in &button.url_kwargs {
                let value = kwargs.get(kwarg).map_or(value.as_str(), String::as_str);
                // a freshly created mutable dict accepts every write
                let _ = query.set(kwarg, value);
            }
            format!("{url}?{}", query.urlencode())
        }
        Err(e) => {
            tracing::debug!(button = %button.title, url_name, error = %e, "button route does not reverse");
            NO_URL.to_string()
        }
    }
}

/// The exposed columns of an event button for `record`, rendered as text.
pub fn button_fields(record: &Record, button: &TableButton, renderer: &CellRenderer<'_>) -> serde_json::Value {
    serde_json::Value::Object(
        button
            .exposed_fields
            .iter()
            .map(|field| (field.clone(), serde_json::Value::String(renderer.render(record, field))))
            .collect(),
    )
}
