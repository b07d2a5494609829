//! A small shop schema shared by the unit tests of this crate.

use std::sync::Arc;

use chrono::NaiveDate;
use flex_report_core::AppSettings;
use flex_report_db::{
    ComputedField, CustomFieldProvider, DynamicField, FieldDef, FieldType, ModelMeta, ModelSchema, OnDelete, OrderBy,
    Property, Record, Related, SchemaRegistry, Value,
};

use crate::resolver::FieldResolver;
use crate::ReportEngine;

fn name_of(record: &Record) -> String {
    record.get("name").map(ToString::to_string).unwrap_or_default()
}

pub fn shop_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(
        ModelSchema::new(ModelMeta::new(
            "shop",
            "city",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("name", FieldType::CharField).max_length(50),
            ],
        ))
        .display(name_of),
    );
    registry.register(
        ModelSchema::new(ModelMeta::new(
            "shop",
            "customer",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("name", FieldType::CharField).max_length(100).verbose_name("Customer name"),
                FieldDef::new("phone", FieldType::PhoneNumberField).nullable(),
                FieldDef::new(
                    "city",
                    FieldType::ForeignKey {
                        to: "shop.city".into(),
                        on_delete: OnDelete::SetNull,
                        related_name: Some("residents".into()),
                    },
                )
                .nullable(),
            ],
        ))
        .property(Property::new("initials", |r| {
            Value::from(name_of(r).split_whitespace().filter_map(|w| w.chars().next()).collect::<String>())
        }))
        .display(name_of),
    );
    registry.register(
        ModelSchema::new(
            ModelMeta::new(
                "shop",
                "tag",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(30),
                ],
            )
            .verbose_name("tag", "tags"),
        )
        .display(name_of),
    );
    registry.register(
        ModelSchema::new(
            ModelMeta::new(
                "shop",
                "order",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("number", FieldType::CharField).max_length(20).verbose_name("Number"),
                    FieldDef::new("total", FieldType::FloatField).verbose_name("Total"),
                    FieldDef::new("price", FieldType::MoneyField { currency: "USD".into() }).nullable(),
                    FieldDef::new("paid", FieldType::BooleanField).default(false).verbose_name("Paid"),
                    FieldDef::new("status", FieldType::CharField)
                        .max_length(1)
                        .default("n")
                        .choices([("n", "New"), ("s", "Shipped")])
                        .verbose_name("Status"),
                    FieldDef::new("created", FieldType::DateTimeField).verbose_name("Created"),
                    FieldDef::new("due", FieldType::DateField).nullable(),
                    FieldDef::new("receipt", FieldType::FileField { upload_to: "receipts".into() }).nullable(),
                    FieldDef::new("photo", FieldType::ImageField { upload_to: "photos".into() }).nullable(),
                    FieldDef::new(
                        "customer",
                        FieldType::ForeignKey {
                            to: "shop.customer".into(),
                            on_delete: OnDelete::Cascade,
                            related_name: Some("orders".into()),
                        },
                    )
                    .verbose_name("Customer"),
                    FieldDef::new(
                        "tags",
                        FieldType::ManyToManyField {
                            to: "shop.tag".into(),
                            through: None,
                            related_name: Some("orders".into()),
                        },
                    )
                    .verbose_name("Tags"),
                ],
            )
            .verbose_name("order", "orders")
            .ordering(vec![OrderBy::asc("number")]),
        )
        .property(
            Property::new("double_total", |r| {
                Value::Float(r.get("total").and_then(Value::as_float).unwrap_or_default() * 2.0)
            })
            .verbose_name("Double total"),
        )
        .custom_fields(CustomFieldProvider::new(
            "audit",
            vec![
                ComputedField::new("created_by", |_| Value::from("admin")).verbose_name("Created by"),
                ComputedField::new("channel", |_| Value::from("web")),
            ],
        ))
        .dynamic_field(DynamicField::new(
            "scores",
            vec![
                ComputedField::new("score_a", |r| r.get("total").cloned().unwrap_or(Value::Null)),
                ComputedField::new("score_b", |r| {
                    Value::Float(r.get("total").and_then(Value::as_float).unwrap_or_default() + 1.0)
                }),
            ],
        ))
        .display(|r| r.get("number").map(ToString::to_string).unwrap_or_default()),
    );
    registry.register(ModelSchema::new(ModelMeta::new(
        "shop",
        "line",
        vec![
            FieldDef::new("id", FieldType::BigAutoField).primary_key(),
            FieldDef::new("qty", FieldType::IntegerField),
            FieldDef::new(
                "order",
                FieldType::ForeignKey {
                    to: "shop.order".into(),
                    on_delete: OnDelete::Cascade,
                    related_name: Some("lines".into()),
                },
            ),
        ],
    )));
    registry
}

pub fn shop_resolver() -> FieldResolver {
    FieldResolver::new(Arc::new(shop_registry()))
}

pub fn shop_engine() -> ReportEngine {
    let settings = AppSettings {
        calendar: flex_report_core::Calendar::Gregorian,
        ..AppSettings::default()
    };
    ReportEngine::new(settings, shop_registry())
}

/// An order with its customer, city and tags loaded.
pub fn sample_order() -> Record {
    let city = Record::new("shop.city").with_pk(9).with("name", "Tabriz");
    let customer = Record::new("shop.customer")
        .with_pk(3)
        .with("name", "Ann Lee")
        .with("phone", "+98 914 000 1122")
        .with("city", 9)
        .with_related("city", Related::One(Some(Box::new(city))));
    let created = NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(14, 30, 0))
        .unwrap_or_default();
    Record::new("shop.order")
        .with_pk(1)
        .with("number", "A-100")
        .with("total", 12.5)
        .with("price", 12.5)
        .with("paid", false)
        .with("status", "s")
        .with("created", created)
        .with("due", Value::Null)
        .with("receipt", "receipts/a100.pdf")
        .with("photo", "photos/a100.png")
        .with("customer", 3)
        .with_related("customer", Related::One(Some(Box::new(customer))))
        .with_related(
            "tags",
            Related::Many(vec![
                Record::new("shop.tag").with_pk(1).with("name", "gift"),
                Record::new("shop.tag").with_pk(2).with("name", "rush"),
            ]),
        )
}
