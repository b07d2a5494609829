//! Settings for the flex-report engine.
//!
//! [`AppSettings`] holds every tunable of the report add-on with defaults
//! matching the `REPORT_*` settings a host application may override. Settings
//! are constructed once at startup (see [`settings_loader`](crate::settings_loader))
//! and passed by reference to the components that need them.

use serde::{Deserialize, Serialize};

/// The calendar used when rendering dates and export filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Calendar {
    /// The proleptic Gregorian calendar.
    Gregorian,
    /// The Solar Hijri (Jalali) calendar.
    #[default]
    Jalali,
}

impl std::str::FromStr for Calendar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gregorian" => Ok(Self::Gregorian),
            "jalali" | "solar_hijri" => Ok(Self::Jalali),
            other => Err(format!("unknown calendar '{other}'")),
        }
    }
}

/// `strftime`-style formats applied to temporal cell values, per field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeFormats {
    /// Format for date-time fields.
    pub datetime: String,
    /// Format for date fields.
    pub date: String,
    /// Format for time fields.
    pub time: String,
}

impl Default for TimeFormats {
    fn default() -> Self {
        Self {
            datetime: "%H:%M %Y/%m/%d".to_string(),
            date: "%Y/%m/%d".to_string(),
            time: "%H:%M:%S".to_string(),
        }
    }
}

/// How money cells are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoneyFormat {
    /// Digits kept after the decimal point.
    pub decimal_places: usize,
    /// Put between groups of three integer digits. Empty turns grouping off.
    pub thousands_separator: String,
    /// Cell text, with `{amount}` and `{currency}` placeholders.
    pub pattern: String,
}

impl Default for MoneyFormat {
    fn default() -> Self {
        Self {
            decimal_places: 2,
            thousands_separator: String::new(),
            pattern: "{amount} {currency}".to_string(),
        }
    }
}

impl MoneyFormat {
    /// Formats `amount` in `currency`.
    ///
    /// ```
    /// use flex_report_core::settings::MoneyFormat;
    ///
    /// let fmt = MoneyFormat {
    ///     thousands_separator: ",".into(),
    ///     pattern: "{currency} {amount}".into(),
    ///     ..MoneyFormat::default()
    /// };
    /// assert_eq!(fmt.format(-1234567.5, "EUR"), "EUR -1,234,567.50");
    /// assert_eq!(MoneyFormat::default().format(12.5, "USD"), "12.50 USD");
    /// ```
    pub fn format(&self, amount: f64, currency: &str) -> String {
        let fixed = format!("{amount:.places$}", places = self.decimal_places);
        let (sign, unsigned) = fixed.strip_prefix('-').map_or(("", fixed.as_str()), |rest| ("-", rest));
        let (whole, fraction) = unsigned.split_once('.').map_or((unsigned, None), |(w, f)| (w, Some(f)));

        let mut text = String::from(sign);
        for (i, digit) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                text.push_str(&self.thousands_separator);
            }
            text.push(digit);
        }
        if let Some(fraction) = fraction {
            text.push('.');
            text.push_str(fraction);
        }
        self.pattern.replace("{currency}", currency).replace("{amount}", &text)
    }
}

/// The complete set of report settings.
///
/// # Examples
///
/// ```
/// use flex_report_core::settings::AppSettings;
///
/// let settings = AppSettings::default();
/// assert_eq!(settings.default_cell_value, "&mdash;");
/// assert_eq!(settings.page_sizes, vec![25, 75, 100, 200]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,

    // ── Rendering ────────────────────────────────────────────────────

    /// Placeholder shown for cells without a value.
    pub default_cell_value: String,
    /// Formats applied to date, time and date-time cells.
    pub time_formats: TimeFormats,
    /// Calendar used for temporal cells and export filenames.
    pub calendar: Calendar,
    /// Format of money cells.
    pub money_format: MoneyFormat,
    /// URL prefix for stored files.
    pub media_url: String,
    /// Scheme and host prepended to file URLs when an absolute URL is wanted.
    pub site_url: String,

    // ── Report behaviour ─────────────────────────────────────────────

    /// Name of the group whose members may edit templates.
    pub editors_group_name: String,
    /// Name under which models register their user-path hook.
    pub model_user_path_func_name: String,
    /// Name under which models register their export-kwargs hook.
    pub model_export_kwargs_func_name: String,
    /// Whether quicksearch reacts on every keystroke.
    pub realtime_quicksearch: bool,
    /// Allowed page sizes; the first entry is the default.
    pub page_sizes: Vec<usize>,
    /// Raw filter values that are dropped before predicate construction.
    pub ignore_search_values: Vec<String>,
    /// Query keys that never reach predicate construction.
    pub ignore_search_keys: Vec<String>,

    // ── Internationalization ─────────────────────────────────────────

    /// The language code (e.g. "en", "fa").
    pub language_code: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),

            default_cell_value: "&mdash;".to_string(),
            time_formats: TimeFormats::default(),
            calendar: Calendar::default(),
            money_format: MoneyFormat::default(),
            media_url: "/media/".to_string(),
            site_url: String::new(),

            editors_group_name: "report_editors".to_string(),
            model_user_path_func_name: "report_user_path".to_string(),
            model_export_kwargs_func_name: "flex_export_kwargs".to_string(),
            realtime_quicksearch: true,
            page_sizes: vec![25, 75, 100, 200],
            ignore_search_values: vec!["unknown".to_string()],
            ignore_search_keys: vec!["report_template".to_string()],

            language_code: "en".to_string(),
        }
    }
}

impl AppSettings {
    /// Returns the default page size (the first allowed size, or 25).
    pub fn default_page_size(&self) -> usize {
        self.page_sizes.first().copied().unwrap_or(25)
    }
}
