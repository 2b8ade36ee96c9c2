use corona_dashboard::orm::{Db, auto_migrate};
use corona_dashboard::router::{AppState, Method, Request, Response, Router};
use corona_dashboard::settings::Settings;
use corona_dashboard::views::app_router;
use serde_json::{Value, json};
use std::sync::Arc;

async fn app() -> Router {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    auto_migrate(db.clone()).await.unwrap();
    let mut settings = Settings::default();
    settings.template.dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates").to_string();
    app_router(AppState { db, settings })
}

fn body_json(resp: &Response) -> Value {
    serde_json::from_str(&resp.body).unwrap()
}

async fn post_json(app: &Router, path: &str, payload: Value) -> Response {
    app.dispatch(Request::new(Method::POST, path).with_json(&payload))
        .await
}

async fn get(app: &Router, target: &str) -> Response {
    app.dispatch(Request::new(Method::GET, target)).await
}

async fn create(app: &Router, city: &str, country: &str, confirmed: i64) -> Value {
    let resp = post_json(
        app,
        "/api/records",
        json!({"city": city, "country": country, "confirmed": confirmed, "dead": 0, "recovered": 0}),
    )
    .await;
    assert_eq!(resp.status_code, 200);
    body_json(&resp)["data"].clone()
}

#[tokio::test]
async fn test_welcome() {
    let app = app().await;
    let resp = get(&app, "/api/welcome").await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        body_json(&resp),
        json!({"data": {
            "version": "0.0.1",
            "author": "Tech Foundation",
            "email": "devs@techfoundation.org"
        }})
    );
}

#[tokio::test]
async fn test_create_echoes_fields_with_generated_id() {
    let app = app().await;
    let resp = post_json(
        &app,
        "/api/records",
        json!({"city":"Lagos","country":"Nigeria","confirmed":10,"dead":1,"recovered":5}),
    )
    .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        resp.headers.get("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    let data = body_json(&resp)["data"].clone();
    assert!(data["id"].is_i64());
    assert_eq!(data["city"], "Lagos");
    assert_eq!(data["country"], "Nigeria");
    assert_eq!(data["confirmed"], 10);
    assert_eq!(data["dead"], 1);
    assert_eq!(data["recovered"], 5);

    let listing = body_json(&get(&app, "/api/records").await);
    assert_eq!(listing, json!({"data": [data]}));
}

#[tokio::test]
async fn test_create_coerces_numeric_strings() {
    let app = app().await;
    let resp = post_json(
        &app,
        "/api/records",
        json!({"city":"Rome","country":"Italy","confirmed":"12","dead":" 2 ","recovered":3.0}),
    )
    .await;
    let data = body_json(&resp)["data"].clone();
    assert_eq!(data["confirmed"], 12);
    assert_eq!(data["dead"], 2);
    assert_eq!(data["recovered"], 3);
}

#[tokio::test]
async fn test_create_faults_render_500_page() {
    let app = app().await;
    let missing = post_json(&app, "/api/records", json!({"city": "Rome"})).await;
    assert_eq!(missing.status_code, 500);
    assert!(missing.body.contains("Internal server error"));

    let bad_number = post_json(
        &app,
        "/api/records",
        json!({"city":"Rome","country":"Italy","confirmed":"lots","dead":0,"recovered":0}),
    )
    .await;
    assert_eq!(bad_number.status_code, 500);

    let not_object = post_json(&app, "/api/records", json!(["Rome", "Italy"])).await;
    assert_eq!(not_object.status_code, 500);

    assert_eq!(body_json(&get(&app, "/api/records").await), json!({"data": []}));
}

#[tokio::test]
async fn test_unreadable_bodies_are_rejected_before_storage() {
    let app = app().await;

    let malformed = app
        .dispatch(Request::new(Method::POST, "/api/records").with_body("application/json", "{oops"))
        .await;
    assert_eq!(malformed.status_code, 400);
    assert!(malformed.body.contains("400 - Bad request"));

    let wrong_type = app
        .dispatch(Request::new(Method::POST, "/api/records").with_body(
            "text/plain",
            r#"{"city":"Rome","country":"Italy","confirmed":1,"dead":0,"recovered":0}"#,
        ))
        .await;
    assert_eq!(wrong_type.status_code, 415);

    let delete_as_form = app
        .dispatch(Request::new(Method::POST, "/api/delete").with_form(&[("id", "1")]))
        .await;
    assert_eq!(delete_as_form.status_code, 415);

    assert_eq!(body_json(&get(&app, "/api/records").await), json!({"data": []}));
}

#[tokio::test]
async fn test_duplicate_city_is_a_fault() {
    let app = app().await;
    create(&app, "Milan", "Italy", 1).await;
    let resp = post_json(
        &app,
        "/api/records",
        json!({"city":"Milan","country":"Italy","confirmed":2,"dead":0,"recovered":0}),
    )
    .await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_search_exact_case_sensitive() {
    let app = app().await;
    let milan = create(&app, "Milan", "Italy", 1).await;
    let rome = create(&app, "Rome", "Italy", 2).await;
    create(&app, "Nice", "France", 3).await;
    create(&app, "Turin", "italy", 4).await;

    let resp = get(&app, "/api/search?c=Italy").await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body_json(&resp), json!({"data": [milan, rome]}));

    let resp = get(&app, "/api/search?c=Spain").await;
    assert_eq!(body_json(&resp), json!({"data": []}));

    let resp = get(&app, "/api/search").await;
    assert_eq!(resp.status_code, 400);
    assert!(resp.body.contains("400 - Bad request"));
}

#[tokio::test]
async fn test_search_decodes_query() {
    let app = app().await;
    let seoul = create(&app, "Seoul", "South Korea", 9).await;
    let resp = get(&app, "/api/search?c=South%20Korea").await;
    assert_eq!(body_json(&resp), json!({"data": [seoul]}));
}

#[tokio::test]
async fn test_delete_removes_from_listing() {
    let app = app().await;
    let keep = create(&app, "Paris", "France", 5).await;
    let gone = create(&app, "Lyon", "France", 2).await;

    let resp = post_json(&app, "/api/delete", json!({"id": gone["id"]})).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        body_json(&resp),
        json!({"data": {"msg": "Record deleted successfully", "id": gone["id"]}})
    );

    let listing = body_json(&get(&app, "/api/records").await);
    assert_eq!(listing, json!({"data": [keep]}));

    // A second delete of the same id no longer finds the row.
    let resp = post_json(&app, "/api/delete", json!({"id": gone["id"]})).await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_delete_accepts_string_id() {
    let app = app().await;
    let record = create(&app, "Bern", "Switzerland", 1).await;
    let id = record["id"].as_i64().unwrap();
    let resp = post_json(&app, "/api/delete", json!({"id": id.to_string()})).await;
    assert_eq!(body_json(&resp)["data"]["id"], id);
}

#[tokio::test]
async fn test_update_is_full_overwrite() {
    let app = app().await;
    let record = create(&app, "Wuhan", "China", 100).await;
    let id = record["id"].clone();

    let resp = post_json(
        &app,
        "/api/update",
        json!({"id": id, "city": "Hubei", "country": "PRC", "confirmed": 7, "dead": 0, "recovered": 3}),
    )
    .await;
    assert_eq!(resp.status_code, 200);
    let expected = json!({
        "id": id, "city": "Hubei", "country": "PRC", "confirmed": 7, "dead": 0, "recovered": 3
    });
    assert_eq!(body_json(&resp), json!({"data": expected}));
    assert_eq!(
        body_json(&get(&app, "/api/records").await),
        json!({"data": [expected]})
    );

    // Partial payloads are not merged with the stored row.
    let partial = post_json(&app, "/api/update", json!({"id": id, "confirmed": 8})).await;
    assert_eq!(partial.status_code, 500);
}

#[tokio::test]
async fn test_update_unknown_id_is_a_fault() {
    let app = app().await;
    let resp = post_json(
        &app,
        "/api/update",
        json!({"id": 404, "city": "X", "country": "Y", "confirmed": 0, "dead": 0, "recovered": 0}),
    )
    .await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_save_form_redirects_and_persists() {
    let app = app().await;
    let form = Request::new(Method::POST, "/save").with_form(&[
        ("city", "Accra"),
        ("country", "Ghana"),
        ("confirmed", "4"),
        ("dead", "0"),
        ("recovered", "1"),
    ]);
    let resp = app.dispatch(form).await;
    assert_eq!(resp.status_code, 302);
    assert_eq!(resp.headers.get("Location").unwrap(), "/");

    let listing = body_json(&get(&app, "/api/records").await);
    assert_eq!(listing["data"][0]["city"], "Accra");
    assert_eq!(listing["data"][0]["confirmed"], 4);

    let dashboard = get(&app, "/").await;
    assert_eq!(dashboard.status_code, 200);
    assert!(dashboard.body.contains("Corona 2020 Dashboard"));
    assert!(dashboard.body.contains("Accra"));
    assert!(dashboard.body.contains("Ghana"));
}

#[tokio::test]
async fn test_save_rejects_non_numeric_counts() {
    let app = app().await;
    let form = Request::new(Method::POST, "/save").with_form(&[
        ("city", "Accra"),
        ("country", "Ghana"),
        ("confirmed", "four"),
        ("dead", "0"),
        ("recovered", "1"),
    ]);
    let resp = app.dispatch(form).await;
    assert_eq!(resp.status_code, 500);
    assert_eq!(body_json(&get(&app, "/api/records").await), json!({"data": []}));
}

#[tokio::test]
async fn test_save_missing_field_is_bad_request() {
    let app = app().await;
    let form = Request::new(Method::POST, "/save").with_form(&[("city", "Accra")]);
    let resp = app.dispatch(form).await;
    assert_eq!(resp.status_code, 400);
    assert!(resp.body.contains("missing form field `country`"));
    assert_eq!(body_json(&get(&app, "/api/records").await), json!({"data": []}));
}

#[tokio::test]
async fn test_pages_and_unknown_routes() {
    let app = app().await;

    let home = get(&app, "/").await;
    assert_eq!(home.status_code, 200);
    assert!(home.body.contains("No records yet."));

    let contact = get(&app, "/contact").await;
    assert_eq!(contact.status_code, 200);
    assert!(contact.body.contains("Contact us"));

    let missing = get(&app, "/does/not/exist").await;
    assert_eq!(missing.status_code, 404);
    assert!(missing.body.contains("Page not found"));

    let wrong_method = app.dispatch(Request::new(Method::GET, "/save")).await;
    assert_eq!(wrong_method.status_code, 405);
}

#[tokio::test]
async fn test_dashboard_escapes_city_names() {
    let app = app().await;
    create(&app, "<script>", "X", 1).await;
    let home = get(&app, "/").await;
    assert!(home.body.contains("&lt;script&gt;"));
    assert!(!home.body.contains("<td class=\"p-2\"><script></td>"));
}
