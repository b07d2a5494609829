//! Translation catalog for loading and looking up translations.
//!
//! The catalog stores message translations in a thread-safe registry keyed by
//! language code. Translations can be loaded from JSON or registered
//! programmatically.
//!
//! ## JSON Format
//!
//! ```json
//! {
//!   "messages": {
//!     "Yes": "بله",
//!     "No": "خیر"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

/// A translation catalog for a single language.
#[derive(Debug, Clone, Default)]
pub struct TranslationCatalog {
    /// Simple message translations: msgid -> translated string.
    messages: HashMap<String, String>,
}

fn global_catalogs() -> &'static RwLock<HashMap<String, TranslationCatalog>> {
    static CATALOGS: OnceLock<RwLock<HashMap<String, TranslationCatalog>>> = OnceLock::new();
    CATALOGS.get_or_init(|| RwLock::new(HashMap::new()))
}

#[allow(clippy::significant_drop_tightening)]
fn with_catalog_mut<F>(language: &str, f: F)
where
    F: FnOnce(&mut TranslationCatalog),
{
    let mut catalogs = global_catalogs()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let catalog = catalogs.entry(language.to_string()).or_default();
    f(catalog);
}

// ── Registration API ─────────────────────────────────────────────────────

/// Registers message translations for a language.
///
/// Each entry is a `(msgid, translated)` pair. Existing entries for the
/// language are merged, overwriting duplicates.
///
/// # Examples
///
/// ```
/// use flex_report_core::i18n::catalog;
///
/// catalog::register_translations("de", vec![("Yes", "Ja"), ("No", "Nein")]);
/// assert_eq!(catalog::translate("de", "Yes").as_deref(), Some("Ja"));
/// ```
pub fn register_translations(language: &str, entries: Vec<(&str, &str)>) {
    with_catalog_mut(language, |catalog| {
        for (msgid, translated) in entries {
            catalog
                .messages
                .insert(msgid.to_string(), translated.to_string());
        }
    });
}

/// Loads translations for `language` from a JSON document.
pub fn load_from_json(language: &str, json_str: &str) -> Result<(), String> {
    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| format!("Invalid JSON: {e}"))?;

    let Some(messages) = value.get("messages") else {
        return Ok(());
    };
    let messages = messages
        .as_object()
        .ok_or_else(|| "'messages' must be an object".to_string())?;

    with_catalog_mut(language, |catalog| {
        for (msgid, translated) in messages {
            if let Some(s) = translated.as_str() {
                catalog.messages.insert(msgid.clone(), s.to_string());
            }
        }
    });
    Ok(())
}

// ── Lookup API ───────────────────────────────────────────────────────────

/// Looks up the translation of `msgid` in `language`.
pub fn translate(language: &str, msgid: &str) -> Option<String> {
    let catalogs = global_catalogs()
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    catalogs
        .get(language)
        .and_then(|catalog| catalog.messages.get(msgid).cloned())
}

/// Returns `true` if any translations are registered for `language`.
pub fn has_language(language: &str) -> bool {
    global_catalogs()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(language)
}
