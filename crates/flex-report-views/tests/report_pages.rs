//! End-to-end tests of the report views: template selection, the context
//! bundle of a page, pagination fallbacks, access checks and downloads,
//! driven through the axum router against an in-memory SQLite database.

use std::io::Cursor;
use std::sync::Arc;

use calamine::{open_workbook_from_rs, Reader, Xlsx};
use flex_report_core::{AppSettings, Calendar};
use flex_report_db::{FieldDef, FieldType, ModelMeta, ModelSchema, OnDelete, OrderBy, Record, SchemaRegistry};
use flex_report_engine::models::{Column, TableButton, TableButtonColor, TablePage, Template};
use flex_report_engine::ReportEngine;
use flex_report_http::{HttpRequest, HttpResponseRedirect, RequestUser, UrlRouter};
use flex_report_test::{RequestFactory, TestClient, TestDatabase};
use flex_report_views::views::report::ReportOutcome;
use flex_report_views::{report_router, ReportSite, ReportView};
use serde_json::Value as Json;

fn name_of(record: &Record) -> String {
    record.get("name").map(ToString::to_string).unwrap_or_default()
}

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for model in ["customer", "tag"] {
        registry.register(
            ModelSchema::new(ModelMeta::new(
                "shop",
                model,
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(100),
                ],
            ))
            .display(name_of),
        );
    }
    registry.register(ModelSchema::new(
        ModelMeta::new(
            "shop",
            "order",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("number", FieldType::CharField).max_length(20).verbose_name("Number"),
                FieldDef::new("total", FieldType::FloatField).verbose_name("Total"),
                FieldDef::new("paid", FieldType::BooleanField).default(false).verbose_name("Paid"),
                FieldDef::new(
                    "customer",
                    FieldType::ForeignKey {
                        to: "shop.customer".into(),
                        on_delete: OnDelete::Cascade,
                        related_name: Some("orders".into()),
                    },
                ),
                FieldDef::new(
                    "tags",
                    FieldType::ManyToManyField {
                        to: "shop.tag".into(),
                        through: None,
                        related_name: Some("orders".into()),
                    },
                ),
            ],
        )
        .ordering(vec![OrderBy::asc("number")]),
    ));
    registry
}

const ROWS: &[&str] = &[
    "INSERT INTO \"shop_customer\" (\"id\", \"name\") VALUES (1, 'Ann Lee'), (2, 'Bob Stone')",
    "INSERT INTO \"shop_tag\" (\"id\", \"name\") VALUES (1, 'gift'), (2, 'rush')",
    "INSERT INTO \"shop_order\" (\"id\", \"number\", \"total\", \"paid\", \"customer_id\") VALUES \
     (1, 'A-101', 7.5, 1, 2), (2, 'A-100', 12.5, 1, 1), (3, 'A-102', 3.0, 0, 1)",
    "INSERT INTO \"shop_order_tags\" (\"order_id\", \"tag_id\") VALUES (2, 1), (2, 2), (1, 2)",
];

struct Fixture {
    db: TestDatabase,
    engine: ReportEngine,
    orders: Template,
    paid: Template,
    draft: Template,
    foreign: Template,
}

async fn fixture() -> Fixture {
    let db = TestDatabase::new().unwrap();
    let registry = registry();
    db.setup_registry(&registry).await.unwrap();
    db.load_fixture(ROWS).await.unwrap();
    let engine = ReportEngine::new(
        AppSettings {
            calendar: Calendar::Gregorian,
            ..AppSettings::default()
        },
        registry,
    );
    let repo = engine.repository(&db);
    repo.create_tables().await.unwrap();

    let mut page = TablePage::new("Order report", "orders");
    repo.save_page(&mut page).await.unwrap();
    let mut other_page = TablePage::new("Customers", "customers");
    repo.save_page(&mut other_page).await.unwrap();

    let mut columns = Vec::new();
    for title in ["number", "total", "paid", "customer__name", "tags"] {
        let mut column = Column::new("shop.order", title);
        if title == "number" || title == "customer__name" {
            column = column.searchable();
        }
        repo.save_column(&mut column).await.unwrap();
        columns.push(column);
    }
    let mut color = TableButtonColor::new("primary", "btn-primary");
    repo.save_color(&mut color).await.unwrap();
    let mut button = TableButton::with_url("Open", "order-detail").url_kwarg("pk", "pk");
    button.color_id = color.id;
    repo.save_button(&mut button).await.unwrap();

    let mut orders = Template::new("Orders", "shop.order")
        .on_page(page.id.unwrap())
        .completed()
        .created_by(&RequestUser::new(1, "ann").with_name("Ann", "Lee"));
    orders.is_page_default = true;
    repo.save_template(&mut orders).await.unwrap();
    repo.set_template_columns(&orders, &columns).await.unwrap();
    repo.set_template_buttons(&orders, &[button]).await.unwrap();

    let mut paid = Template::new("Paid orders", "shop.order")
        .on_page(page.id.unwrap())
        .with_filter("paid", true)
        .completed();
    repo.save_template(&mut paid).await.unwrap();
    repo.set_template_columns(&paid, &columns[..1]).await.unwrap();

    let mut draft = Template::new("Draft", "shop.order").on_page(page.id.unwrap());
    repo.save_template(&mut draft).await.unwrap();

    let mut foreign = Template::new("Elsewhere", "shop.order")
        .on_page(other_page.id.unwrap())
        .completed();
    repo.save_template(&mut foreign).await.unwrap();

    Fixture {
        db,
        engine,
        orders,
        paid,
        draft,
        foreign,
    }
}

fn site(fixture: &Fixture) -> ReportSite {
    let mut router = UrlRouter::new();
    router.add("order-detail", "orders/<int:pk>/").unwrap();
    ReportSite::new(fixture.engine.clone(), Arc::new(fixture.db.clone())).with_router(router)
}

async fn page(client: &TestClient, path: &str) -> Json {
    let response = client.get(path).await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    response.json().unwrap()
}

fn numbers(context: &Json) -> Vec<String> {
    context["pagination"]["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["cells"][0].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_default_template_renders_rows() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));
    let context = page(&client, "/reports/orders").await;

    assert_eq!(context["have_template"], true);
    assert_eq!(context["template_ready"], true);
    assert_eq!(context["is_page_table"], true);
    assert_eq!(context["page_template_keyword"], "report_template");
    assert_eq!(context["page_title"], "Order report");
    assert_eq!(context["template"]["title"], "Orders");
    assert_eq!(context["template"]["id"], fixture.orders.id.unwrap());
    assert_eq!(context["template"]["user_fullname"], "Ann Lee");
    assert_eq!(context["template"]["columns_count"], 5);
    assert_eq!(context["columns_count"], 5 + 1 + 1);
    assert_eq!(context["searchable_fields"], serde_json::json!(["number", "customer__name"]));
    assert_eq!(context["buttons"][0]["color"], "btn-primary");
    assert_eq!(context["export_formats"][0]["slug"], "xlsx");
    assert_eq!(context["export_formats"][1]["name"], "CSV");
    assert_eq!(context["has_export"], true);
    assert_eq!(context["is_editor"], false);

    let titles: Vec<Json> = context["templates"].as_array().unwrap().iter().map(|t| t["title"].clone()).collect();
    assert_eq!(titles, vec!["Orders", "Paid orders", "Draft"]);

    assert_eq!(
        numbers(&context),
        vec!["<span>A-100</span>", "<span>A-101</span>", "<span>A-102</span>"]
    );
    let first = &context["pagination"]["rows"][0];
    assert_eq!(first["pk"]["value"], 2);
    assert_eq!(first["cells"][2], "<i class=\"material-icons-outlined\">check_circle</i>");
    assert_eq!(first["cells"][3], "<span>Ann Lee</span>");
    assert_eq!(first["cells"][4], "<span>gift, rush</span>");
    assert_eq!(first["buttons"][0]["url"], "/orders/2/");
}

#[tokio::test]
async fn test_requested_template_must_belong_to_the_page() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));

    let paid_id = fixture.paid.id.unwrap();
    let context = page(&client, &format!("/reports/orders?report_template={paid_id}")).await;
    assert_eq!(context["template"]["title"], "Paid orders");
    assert_eq!(numbers(&context), vec!["<span>A-100</span>", "<span>A-101</span>"]);
    assert_eq!(context["buttons"], serde_json::json!([]));
    assert_eq!(context["columns_count"], 2);

    let foreign_id = fixture.foreign.id.unwrap();
    let context = page(&client, &format!("/reports/orders?report_template={foreign_id}")).await;
    assert_eq!(context["template"]["title"], "Orders");
    let context = page(&client, "/reports/orders?report_template=abc").await;
    assert_eq!(context["template"]["title"], "Orders");
}

#[tokio::test]
async fn test_page_without_templates() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));
    let context = page(&client, "/reports/unknown").await;
    assert_eq!(context["have_template"], false);
    assert!(context["template"].is_null());
    assert!(context["pagination"].is_null());
    assert_eq!(context["columns"], serde_json::json!([]));
}

#[tokio::test]
async fn test_pending_template_is_not_composed() {
    let fixture = fixture().await;
    let draft_id = fixture.draft.id.unwrap();
    let client = TestClient::new(report_router(site(&fixture)));
    let context = page(&client, &format!("/reports/orders?report_template={draft_id}")).await;
    assert_eq!(context["have_template"], true);
    assert_eq!(context["template_ready"], false);
    assert_eq!(context["template"]["status_label"], "Pending");
    assert!(context["pagination"].is_null());

    let redirecting = site(&fixture).with_not_ready(Arc::new(|_request: &HttpRequest, template: &Template| {
        Some(HttpResponseRedirect::new(&format!("/templates/{}/edit/", template.id.unwrap_or_default())))
    }));
    let client = TestClient::new(report_router(redirecting));
    let response = client.get(&format!("/reports/orders?report_template={draft_id}")).await;
    assert_eq!(response.status_code(), 302);
    assert_eq!(response.header("location"), Some(format!("/templates/{draft_id}/edit/").as_str()));
}

#[tokio::test]
async fn test_pagination_falls_back_to_safe_values() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));

    let context = page(&client, "/reports/orders?report_per_page=999&report_page=9999").await;
    let pagination = &context["pagination"];
    assert_eq!(pagination["per_page"], 25);
    assert_eq!(pagination["number"], 1);
    assert_eq!(pagination["num_pages"], 1);
    assert_eq!(pagination["count"], 3);
    assert_eq!(pagination["keywords"]["page"], "report_page");
    assert_eq!(pagination["page_sizes"], serde_json::json!([25, 75, 100, 200]));
    assert_eq!(pagination["links"].as_array().unwrap().len(), 1);
    assert_eq!(pagination["links"][0]["current"], true);
    assert!(pagination["links"][0]["query"].as_str().unwrap().contains("report_page=1"));

    let context = page(&client, "/reports/orders?report_per_page=75").await;
    assert_eq!(context["pagination"]["per_page"], 75);
}

#[tokio::test]
async fn test_quicksearch_narrows_rows() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));
    let context = page(&client, "/reports/orders?search=ann").await;
    assert_eq!(context["quicksearch"][0]["param"], "search");
    assert_eq!(numbers(&context).len(), 3, "a template without stored filters ignores request filters");
    assert!(context["used_filters"].is_null());

    let paid_id = fixture.paid.id.unwrap();
    let context = page(&client, &format!("/reports/orders?report_template={paid_id}&search=101")).await;
    assert_eq!(numbers(&context), vec!["<span>A-101</span>"]);
    assert_eq!(context["pagination"]["count"], 1);
}

#[tokio::test]
async fn test_access_check_and_editors() {
    let fixture = fixture().await;
    let guarded = site(&fixture).with_access(Arc::new(|request: &HttpRequest, _template: &Template| {
        request.user().is_authenticated()
    }));
    let mut client = TestClient::new(report_router(guarded));
    assert_eq!(client.get("/reports/orders").await.status_code(), 403);

    client.force_login(RequestUser::new(2, "bob").with_group("report_editors"));
    let context = page(&client, "/reports/orders").await;
    assert_eq!(context["is_editor"], true);
}

#[tokio::test]
async fn test_view_context_from_request_factory() {
    let fixture = fixture().await;
    let view = ReportView::new(site(&fixture));
    let factory = RequestFactory::new().with_user(RequestUser::new(1, "ann").superuser());
    let ReportOutcome::Context(context) = view.context(&factory.report("orders", "")).await.unwrap() else {
        panic!("expected a context");
    };
    assert!(context.is_editor);
    let pagination = context.pagination.unwrap();
    assert_eq!(pagination.rows.len(), 3);
    assert_eq!(pagination.rows[0].buttons[0].label, "Open");
    assert_eq!(context.columns[1].verbose_name, "Total");
}

#[tokio::test]
async fn test_export_downloads() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));

    let response = client.get("/reports/orders/export?format=csv").await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    assert_eq!(response.header("content-type"), Some("text/csv; charset=utf-8"));
    let disposition = response.header("content-disposition").unwrap();
    assert!(disposition.starts_with("attachment; filename=\"Orders_"));
    assert!(disposition.ends_with(".csv\""));
    let mut reader = csv::Reader::from_reader(response.body.as_slice());
    assert_eq!(reader.headers().unwrap().get(0), Some("Number"));
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(ToString::to_string).collect())
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec!["A-100", "12.5", "Yes", "Ann Lee", "gift, rush"]);

    let paid_id = fixture.paid.id.unwrap();
    let response = client
        .get(&format!("/reports/orders/export?format=XLSX&report_template={paid_id}&search=101"))
        .await;
    assert_eq!(response.status_code(), 200);
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(response.body.clone())).unwrap();
    let range = workbook.worksheet_range("Paid orders").unwrap();
    assert_eq!(range.rows().count(), 2);
}

#[tokio::test]
async fn test_export_rejects_bad_requests() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));
    assert_eq!(client.get("/reports/orders/export").await.status_code(), 400);
    let response = client.get("/reports/orders/export?format=pdf").await;
    assert_eq!(response.status_code(), 400);
    assert!(response.contains("isn't handled"));
    assert_eq!(client.get("/reports/unknown/export?format=csv").await.status_code(), 404);

    let locked =
        site(&fixture).with_export_access(Arc::new(|_request: &HttpRequest, _template: &Template| false));
    let client = TestClient::new(report_router(locked));
    assert_eq!(client.get("/reports/orders/export?format=csv").await.status_code(), 403);
}

#[tokio::test]
async fn test_reports_are_read_only() {
    let fixture = fixture().await;
    let client = TestClient::new(report_router(site(&fixture)));
    let response = client.request(http::Method::POST, "/reports/orders").await;
    assert_eq!(response.status_code(), 405);
}
