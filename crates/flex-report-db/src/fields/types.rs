//! Field type definitions for the ORM.
//!
//! This module defines the field type system used by model definitions. Each
//! [`FieldType`] variant corresponds to a column kind the report engine knows
//! how to filter and render, and [`FieldDef`] captures all metadata about a
//! single model field.

use crate::query::compiler::DatabaseBackendType;
use crate::value::Value;

/// The type of a model field, determining its SQL column type and behavior.
///
/// Relational fields (`ForeignKey`, `OneToOneField`, `ManyToManyField`) carry
/// the label (`"app.model"`) of the model they point to.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 16-bit signed integer.
    SmallIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Fixed-precision decimal number.
    DecimalField {
        /// Maximum total digits.
        max_digits: u32,
        /// Digits after the decimal point.
        decimal_places: u32,
    },
    /// An amount of money in a fixed currency.
    MoneyField {
        /// ISO currency code rendered after the amount.
        currency: String,
    },
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Time without date.
    TimeField,
    /// UUID field.
    UuidField,
    /// JSON data.
    JsonField,
    /// Email address.
    EmailField,
    /// URL.
    UrlField,
    /// Slug (URL-friendly string).
    SlugField,
    /// Phone number stored as free text.
    PhoneNumberField,
    /// Uploaded file, stored as a path relative to the media root.
    FileField {
        /// Directory prefix for uploads.
        upload_to: String,
    },
    /// Uploaded image, stored as a path relative to the media root.
    ImageField {
        /// Directory prefix for uploads.
        upload_to: String,
    },
    /// Many-to-one relationship.
    ForeignKey {
        /// The target model label (e.g. "shop.customer").
        to: String,
        /// Behavior when the referenced object is deleted.
        on_delete: OnDelete,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
    /// One-to-one relationship (unique foreign key).
    OneToOneField {
        /// The target model label.
        to: String,
        /// Behavior when the referenced object is deleted.
        on_delete: OnDelete,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
    /// Many-to-many relationship (via intermediate table).
    ManyToManyField {
        /// The target model label.
        to: String,
        /// Optional explicit intermediate table name.
        through: Option<String>,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
}

/// Behavior when a referenced object is deleted (ON DELETE action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OnDelete {
    /// Delete all related objects (CASCADE).
    Cascade,
    /// Prevent deletion if related objects exist (PROTECT).
    Protect,
    /// Set the foreign key to NULL.
    SetNull,
    /// Take no action (may cause integrity errors).
    DoNothing,
}

impl OnDelete {
    /// Returns the `ON DELETE` clause keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Protect => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::DoNothing => "NO ACTION",
        }
    }
}

/// Complete definition of a model field, including metadata and constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// The Rust attribute name of this field.
    pub name: &'static str,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Default value for new instances.
    pub default: Option<Value>,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Maximum character length (for CharField and similar).
    pub max_length: Option<usize>,
    /// Human-readable help text.
    pub help_text: String,
    /// Human-readable name for the field.
    pub verbose_name: String,
    /// Allowed values as (value, display_label) pairs.
    pub choices: Option<Vec<(Value, String)>>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    ///
    /// Only the field name and type are required. Foreign keys get an `_id`
    /// suffixed column, like the conventional schema does.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        let column = match field_type {
            FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. } => format!("{name}_id"),
            _ => name.to_string(),
        };
        Self {
            name,
            column,
            field_type,
            primary_key: false,
            null: false,
            default: None,
            unique: false,
            max_length: None,
            help_text: String::new(),
            verbose_name: name.replace('_', " "),
            choices: None,
        }
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the verbose (human-readable) name.
    #[must_use]
    pub fn verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = name.into();
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Restricts the field to a fixed set of `(value, label)` choices.
    #[must_use]
    pub fn choices<V: Into<Value>>(mut self, choices: impl IntoIterator<Item = (V, &'static str)>) -> Self {
        self.choices = Some(
            choices
                .into_iter()
                .map(|(v, label)| (v.into(), label.to_string()))
                .collect(),
        );
        self
    }

    /// Returns the display label of a stored choice value.
    pub fn choice_label(&self, value: &Value) -> Option<&str> {
        self.choices
            .as_ref()?
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, label)| label.as_str())
    }

    /// Returns `true` if this field represents a relational field.
    pub const fn is_relation(&self) -> bool {
        self.field_type.is_relation()
    }

    /// Returns `true` if this field stores a column in its own table.
    pub const fn is_concrete(&self) -> bool {
        !matches!(self.field_type, FieldType::ManyToManyField { .. })
    }
}

impl FieldType {
    /// Returns `true` for foreign keys, one-to-one and many-to-many fields.
    pub const fn is_relation(&self) -> bool {
        matches!(
            self,
            Self::ForeignKey { .. } | Self::OneToOneField { .. } | Self::ManyToManyField { .. }
        )
    }

    /// Returns `true` for date, time and date-time fields.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::DateField | Self::DateTimeField | Self::TimeField)
    }

    /// Returns `true` for file and image fields.
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::FileField { .. } | Self::ImageField { .. })
    }

    /// Returns the label of the related model, if this is a relation.
    pub fn related_model(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { to, .. }
            | Self::OneToOneField { to, .. }
            | Self::ManyToManyField { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Returns the explicit reverse accessor name, if this is a relation.
    pub fn related_name(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { related_name, .. }
            | Self::OneToOneField { related_name, .. }
            | Self::ManyToManyField { related_name, .. } => related_name.as_deref(),
            _ => None,
        }
    }

    /// Returns the column type used in `CREATE TABLE` for the given backend.
    ///
    /// Many-to-many fields have no column and return an empty string.
    pub fn column_type(&self, backend: DatabaseBackendType, max_length: Option<usize>) -> String {
        match backend {
            DatabaseBackendType::PostgreSQL => self.pg_column_type(max_length),
            DatabaseBackendType::SQLite => self.sqlite_column_type().to_string(),
        }
    }

    fn pg_column_type(&self, max_length: Option<usize>) -> String {
        match self {
            Self::AutoField => "SERIAL".to_string(),
            Self::BigAutoField => "BIGSERIAL".to_string(),
            Self::CharField | Self::EmailField | Self::UrlField | Self::SlugField => {
                format!("VARCHAR({})", max_length.unwrap_or(255))
            }
            Self::PhoneNumberField => "VARCHAR(32)".to_string(),
            Self::FileField { .. } | Self::ImageField { .. } => "VARCHAR(255)".to_string(),
            Self::TextField => "TEXT".to_string(),
            Self::IntegerField => "INTEGER".to_string(),
            Self::BigIntegerField => "BIGINT".to_string(),
            Self::SmallIntegerField => "SMALLINT".to_string(),
            Self::FloatField => "DOUBLE PRECISION".to_string(),
            Self::DecimalField {
                max_digits,
                decimal_places,
            } => format!("NUMERIC({max_digits}, {decimal_places})"),
            Self::MoneyField { .. } => "DOUBLE PRECISION".to_string(),
            Self::BooleanField => "BOOLEAN".to_string(),
            Self::DateField => "DATE".to_string(),
            Self::DateTimeField => "TIMESTAMP".to_string(),
            Self::TimeField => "TIME".to_string(),
            Self::UuidField => "UUID".to_string(),
            Self::JsonField => "JSONB".to_string(),
            Self::ForeignKey { .. } | Self::OneToOneField { .. } => "BIGINT".to_string(),
            Self::ManyToManyField { .. } => String::new(),
        }
    }

    const fn sqlite_column_type(&self) -> &'static str {
        match self {
            Self::AutoField
            | Self::BigAutoField
            | Self::IntegerField
            | Self::BigIntegerField
            | Self::SmallIntegerField
            | Self::BooleanField
            | Self::ForeignKey { .. }
            | Self::OneToOneField { .. } => "INTEGER",
            Self::FloatField | Self::DecimalField { .. } | Self::MoneyField { .. } => "REAL",
            Self::ManyToManyField { .. } => "",
            _ => "TEXT",
        }
    }

    /// Converts a raw driver value into the value type this field produces.
    ///
    /// SQLite hands back dates as text and booleans as integers; this brings
    /// them back to [`Value::Date`], [`Value::Bool`] and friends. Values that
    /// cannot be parsed are returned unchanged.
    pub fn from_db_value(&self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::BooleanField, Value::Int(i)) => Value::Bool(i != 0),
            (Self::DateField, Value::String(s)) => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_or(Value::String(s), Value::Date),
            (Self::DateTimeField, Value::String(s)) => parse_datetime(&s).map_or(Value::String(s), Value::DateTime),
            (Self::TimeField, Value::String(s)) => chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                .map_or(Value::String(s), Value::Time),
            (Self::UuidField, Value::String(s)) => uuid::Uuid::parse_str(&s).map_or(Value::String(s), Value::Uuid),
            (Self::JsonField, Value::String(s)) => {
                serde_json::from_str(&s).map_or(Value::String(s), Value::Json)
            }
            (Self::FloatField | Self::DecimalField { .. } | Self::MoneyField { .. }, Value::Int(i)) => {
                #[allow(clippy::cast_precision_loss)]
                Value::Float(i as f64)
            }
            (_, other) => other,
        }
    }
}

fn parse_datetime(s: &str) -> Option<chrono::NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_def_new_defaults() {
        let f = FieldDef::new("first_name", FieldType::CharField);
        assert_eq!(f.name, "first_name");
        assert_eq!(f.column, "first_name");
        assert!(!f.primary_key);
        assert!(!f.null);
        assert!(f.default.is_none());
        assert!(!f.unique);
        assert!(f.max_length.is_none());
        assert!(f.choices.is_none());
        assert_eq!(f.verbose_name, "first name");
    }

    #[test]
    fn test_field_def_builder() {
        let f = FieldDef::new("email", FieldType::EmailField)
            .column("email_address")
            .unique()
            .max_length(254)
            .verbose_name("Email Address")
            .help_text("Enter a valid email");
        assert_eq!(f.column, "email_address");
        assert!(f.unique);
        assert_eq!(f.max_length, Some(254));
        assert_eq!(f.verbose_name, "Email Address");
        assert_eq!(f.help_text, "Enter a valid email");
    }

    #[test]
    fn test_foreign_key_column_suffix() {
        let fk = FieldDef::new(
            "customer",
            FieldType::ForeignKey {
                to: "shop.customer".into(),
                on_delete: OnDelete::Cascade,
                related_name: Some("orders".into()),
            },
        );
        assert_eq!(fk.column, "customer_id");
        assert!(fk.is_relation());
        assert!(fk.is_concrete());
        assert_eq!(fk.field_type.related_model(), Some("shop.customer"));
        assert_eq!(fk.field_type.related_name(), Some("orders"));
    }

    #[test]
    fn test_many_to_many_is_not_concrete() {
        let m2m = FieldDef::new(
            "tags",
            FieldType::ManyToManyField {
                to: "shop.tag".into(),
                through: None,
                related_name: None,
            },
        );
        assert!(m2m.is_relation());
        assert!(!m2m.is_concrete());
        assert_eq!(
            m2m.field_type.column_type(DatabaseBackendType::SQLite, None),
            ""
        );
    }

    #[test]
    fn test_choices_label() {
        let f = FieldDef::new("status", FieldType::CharField)
            .choices([("c", "Completed"), ("p", "Pending")]);
        assert_eq!(f.choice_label(&Value::from("p")), Some("Pending"));
        assert_eq!(f.choice_label(&Value::from("x")), None);
    }

    #[test]
    fn test_field_type_classification() {
        assert!(FieldType::DateTimeField.is_temporal());
        assert!(!FieldType::CharField.is_temporal());
        assert!(FieldType::ImageField {
            upload_to: "img/".into()
        }
        .is_file());
        assert!(!FieldType::TextField.is_relation());
    }

    #[test]
    fn test_column_types() {
        let money = FieldType::MoneyField {
            currency: "USD".into(),
        };
        assert_eq!(money.column_type(DatabaseBackendType::SQLite, None), "REAL");
        assert_eq!(
            money.column_type(DatabaseBackendType::PostgreSQL, None),
            "DOUBLE PRECISION"
        );
        assert_eq!(
            FieldType::CharField.column_type(DatabaseBackendType::PostgreSQL, Some(50)),
            "VARCHAR(50)"
        );
        assert_eq!(
            FieldType::BooleanField.column_type(DatabaseBackendType::SQLite, None),
            "INTEGER"
        );
    }

    #[test]
    fn test_from_db_value() {
        assert_eq!(
            FieldType::BooleanField.from_db_value(Value::Int(1)),
            Value::Bool(true)
        );
        assert_eq!(
            FieldType::DateField.from_db_value(Value::from("2024-01-15")),
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(
            FieldType::DateTimeField.from_db_value(Value::from("2024-01-15 12:30:00")),
            Value::DateTime(dt)
        );
        assert_eq!(
            FieldType::DateField.from_db_value(Value::from("not a date")),
            Value::from("not a date")
        );
        assert_eq!(FieldType::CharField.from_db_value(Value::Null), Value::Null);
        assert_eq!(
            FieldType::MoneyField {
                currency: "USD".into()
            }
            .from_db_value(Value::Int(3)),
            Value::Float(3.0)
        );
    }
}
