//! Dashboard pages and the JSON API.
use crate::models::{CoronaRecord, FieldSource, RecordFields};
use crate::route;
use crate::router::{AppState, HandlerResult, Request, Response, Router, access_log, request_timer};
use crate::template::{TemplateValue, render_template};
use serde::Serialize;
use std::collections::HashMap;

pub const DASHBOARD_TITLE: &str = "Corona 2020 Dashboard";

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub version: &'static str,
    pub author: &'static str,
    pub email: &'static str,
}

pub const API_INFO: ApiInfo = ApiInfo {
    version: "0.0.1",
    author: "Tech Foundation",
    email: "devs@techfoundation.org",
};

#[derive(Debug, Serialize)]
pub struct DeleteReceipt {
    pub msg: &'static str,
    pub id: i64,
}

/// Build the application router with every page and API route registered.
pub fn app_router(state: AppState) -> Router {
    let mut router = Router::new();
    router.set_app_state(state);
    router.add_middleware(request_timer());
    router.add_post_middleware(access_log());

    route!(router,
        GET "/" => { index },
        GET "/contact" => { contact },
        POST "/save" => { save },
        GET "/api/welcome" => { api_welcome },
        GET "/api/records" => { list_records },
        POST "/api/records" => { create_record },
        GET "/api/search" => { search_records },
        POST "/api/delete" => { delete_record },
        POST "/api/update" => { update_record },
    );
    router
}

pub async fn index(_request: Request, state: AppState) -> HandlerResult {
    let records = CoronaRecord::all(&state.db).await?;
    let mut context: HashMap<String, TemplateValue> = HashMap::new();
    context.insert("dashboard_title".to_string(), DASHBOARD_TITLE.into());
    context.insert(
        "records".to_string(),
        TemplateValue::List(records.iter().map(TemplateValue::from).collect()),
    );
    Ok(render_template(&state.settings.template.dir, "home.html", &context))
}

pub async fn contact(_request: Request, state: AppState) -> HandlerResult {
    Ok(render_template(
        &state.settings.template.dir,
        "contact.html",
        &HashMap::new(),
    ))
}

/// Dashboard form submission; always lands back on the dashboard.
pub async fn save(request: Request, state: AppState) -> HandlerResult {
    let fields = RecordFields::from_source(&request.form())?;
    CoronaRecord::insert(&state.db, &fields).await?;
    Ok(Response::redirect("/"))
}

pub async fn api_welcome(_request: Request, _state: AppState) -> HandlerResult {
    Ok(Response::envelope(API_INFO))
}

pub async fn list_records(_request: Request, state: AppState) -> HandlerResult {
    let records = CoronaRecord::all(&state.db).await?;
    Ok(Response::envelope(records))
}

pub async fn create_record(request: Request, state: AppState) -> HandlerResult {
    let fields = RecordFields::from_source(&request.json()?)?;
    let record = CoronaRecord::insert(&state.db, &fields).await?;
    Ok(Response::envelope(record))
}

pub async fn search_records(request: Request, state: AppState) -> HandlerResult {
    let country = request.query_param("c")?;
    let records = CoronaRecord::filter_by_country(&state.db, country).await?;
    Ok(Response::envelope(records))
}

pub async fn delete_record(request: Request, state: AppState) -> HandlerResult {
    let id = request.json()?.integer("id")?;
    CoronaRecord::delete(&state.db, id).await?;
    Ok(Response::envelope(DeleteReceipt {
        msg: "Record deleted successfully",
        id,
    }))
}

pub async fn update_record(request: Request, state: AppState) -> HandlerResult {
    let payload = request.json()?;
    let id = payload.integer("id")?;
    let fields = RecordFields::from_source(&payload)?;
    let record = CoronaRecord::update(&state.db, id, &fields).await?;
    Ok(Response::envelope(record))
}
