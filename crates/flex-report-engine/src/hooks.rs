//! Per-model request hooks.
//!
//! Report models can expose two callbacks, registered under a model label and
//! a hook name (the names come from [`AppSettings`](flex_report_core::AppSettings)):
//!
//! - a user-path hook returning the scoping values of the current request,
//!   consumed by [`crate::user_path`];
//! - an export hook returning [`ExportOptions`] for the exporter.
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use flex_report_db::Value;
//! use flex_report_engine::hooks::HookRegistry;
//!
//! let hooks = HookRegistry::new();
//! hooks.connect_user_path("shop.order", "report_user_path", Arc::new(|request| {
//!     let mut values = HashMap::new();
//!     values.insert("owner".to_string(), Value::from(request.user().id));
//!     values
//! }));
//! assert!(hooks.user_path("shop.order", "report_user_path").is_some());
//! assert!(hooks.user_path("shop.order", "other").is_none());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flex_report_db::Value;
use flex_report_http::HttpRequest;

use crate::export::ExportOptions;

/// Returns the user-path values of a request, keyed by user-path key.
pub type UserPathHook = Arc<dyn Fn(&HttpRequest) -> HashMap<String, Value> + Send + Sync>;

/// Returns the exporter options of a request.
pub type ExportOptionsHook = Arc<dyn Fn(&HttpRequest) -> ExportOptions + Send + Sync>;

type HookKey = (String, String);

/// Callbacks registered per model label and hook name.
///
/// Connecting a hook under an existing key replaces it.
#[derive(Default)]
pub struct HookRegistry {
    user_paths: RwLock<HashMap<HookKey, UserPathHook>>,
    export_options: RwLock<HashMap<HookKey, ExportOptionsHook>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn count<V>(map: &RwLock<HashMap<HookKey, V>>) -> usize {
            map.read().map(|m| m.len()).unwrap_or_default()
        }
        f.debug_struct("HookRegistry")
            .field("user_paths", &count(&self.user_paths))
            .field("export_options", &count(&self.export_options))
            .finish()
    }
}

fn key(model: &str, name: &str) -> HookKey {
    (model.to_string(), name.to_string())
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_user_path(&self, model: &str, name: &str, hook: UserPathHook) {
        if let Ok(mut hooks) = self.user_paths.write() {
            hooks.insert(key(model, name), hook);
        }
    }

    pub fn connect_export_options(&self, model: &str, name: &str, hook: ExportOptionsHook) {
        if let Ok(mut hooks) = self.export_options.write() {
            hooks.insert(key(model, name), hook);
        }
    }

    /// Removes both hooks registered under `model` and `name`.
    ///
    /// Returns `true` if anything was removed.
    pub fn disconnect(&self, model: &str, name: &str) -> bool {
        let key = key(model, name);
        let removed_path = self
            .user_paths
            .write()
            .is_ok_and(|mut hooks| hooks.remove(&key).is_some());
        let removed_export = self
            .export_options
            .write()
            .is_ok_and(|mut hooks| hooks.remove(&key).is_some());
        removed_path || removed_export
    }

    pub fn user_path(&self, model: &str, name: &str) -> Option<UserPathHook> {
        self.user_paths.read().ok()?.get(&key(model, name)).cloned()
    }

    pub fn export_options(&self, model: &str, name: &str) -> Option<ExportOptionsHook> {
        self.export_options.read().ok()?.get(&key(model, name)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_report_http::RequestUser;

    #[test]
    fn test_hooks_receive_the_request() {
        let hooks = HookRegistry::new();
        hooks.connect_user_path(
            "shop.order",
            "report_user_path",
            Arc::new(|request: &HttpRequest| {
                let mut values = HashMap::new();
                values.insert("customer".to_string(), Value::from(request.user().id));
                values
            }),
        );
        let request = HttpRequest::builder().user(RequestUser::new(3, "ann")).build();
        let hook = hooks.user_path("shop.order", "report_user_path").unwrap();
        assert_eq!(hook(&request)["customer"], Value::Int(3));
    }

    #[test]
    fn test_connect_replaces_and_disconnect_removes() {
        let hooks = HookRegistry::new();
        hooks.connect_export_options(
            "shop.order",
            "flex_export_kwargs",
            Arc::new(|_: &HttpRequest| ExportOptions::default().sheet_name("first")),
        );
        hooks.connect_export_options(
            "shop.order",
            "flex_export_kwargs",
            Arc::new(|_: &HttpRequest| ExportOptions::default().sheet_name("second")),
        );
        let request = HttpRequest::builder().build();
        let hook = hooks.export_options("shop.order", "flex_export_kwargs").unwrap();
        assert_eq!(hook(&request).sheet_name.as_deref(), Some("second"));

        assert!(hooks.disconnect("shop.order", "flex_export_kwargs"));
        assert!(!hooks.disconnect("shop.order", "flex_export_kwargs"));
        assert!(hooks.export_options("shop.order", "flex_export_kwargs").is_none());
    }
}
