//! Internationalization and localization support.
//!
//! - **Translation catalog**: message lookup per language ([`catalog`]).
//! - **Language activation**: thread-local `activate()`, `deactivate()`, `get_language()`.
//! - **Calendars**: Gregorian/Jalali conversion and date formatting ([`calendar`]).
//!
//! The fixed UI tokens used by reports (the used-filters joiner, boolean
//! labels, status labels) ship with built-in `en` and `fa` catalogs, see
//! [`install_builtin_catalogs`].
//!
//! ```
//! use flex_report_core::i18n;
//!
//! i18n::install_builtin_catalogs();
//! i18n::activate("fa");
//! assert_eq!(i18n::gettext("Yes"), "بله");
//! i18n::deactivate();
//! assert_eq!(i18n::gettext("Yes"), "Yes");
//! ```

pub mod calendar;
pub mod catalog;

use std::cell::RefCell;
use std::sync::Once;

thread_local! {
    static CURRENT_LANGUAGE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Activates the given language code for the current thread.
pub fn activate(language_code: &str) {
    CURRENT_LANGUAGE.with(|cell| {
        *cell.borrow_mut() = Some(language_code.to_string());
    });
}

/// Deactivates the current thread's language, reverting to `"en"`.
pub fn deactivate() {
    CURRENT_LANGUAGE.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Returns the language code active on the current thread.
pub fn get_language() -> String {
    CURRENT_LANGUAGE.with(|cell| cell.borrow().clone().unwrap_or_else(|| "en".to_string()))
}

/// Translates a message using the current thread's active language.
///
/// If no translation is found, returns the original `msgid`.
pub fn gettext(msgid: &str) -> String {
    let lang = get_language();
    catalog::translate(&lang, msgid).unwrap_or_else(|| msgid.to_string())
}

/// Registers the built-in `fa` catalog for the report UI tokens.
///
/// Safe to call any number of times; registration happens once.
pub fn install_builtin_catalogs() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        catalog::register_translations(
            "fa",
            vec![
                (" and ", " و "),
                ("Yes", "بله"),
                ("No", "خیر"),
                ("Not Set", "تنظیم نشده"),
                ("Completed", "تکمیل شده"),
                ("Pending", "در انتظار"),
                ("Excel", "اکسل"),
            ],
        );
    });
}
