// src/server.rs

use crate::context::DashboardContext;
use crate::shape::Metric;
use crate::view::{self, Tab, OVERVIEW};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use warp::{
    http::StatusCode,
    reply::{self, Reply, Response},
    Filter, Rejection,
};

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");

#[derive(Deserialize)]
struct MapQuery {
    metric: Option<String>,
}

#[derive(Deserialize)]
struct ChartRequest {
    #[serde(default)]
    hover: Value,
    metric: Option<String>,
    tab: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: Option<String>,
}

#[derive(Serialize)]
struct StatesResponse<'a> {
    states: &'a [String],
    fiscal_years: Option<(i32, i32)>,
    default_state: &'static str,
    overview: &'static str,
    loaded_at: String,
}

fn bad_request(error: &str, e: anyhow::Error) -> Response {
    warn!(error, details = %e, "rejecting request");
    reply::with_status(
        reply::json(&ErrorResponse {
            error: error.to_string(),
            details: Some(format!("{:#}", e)),
        }),
        StatusCode::BAD_REQUEST,
    )
    .into_response()
}

/// Missing metric means the dropdown default.
fn parse_metric(raw: Option<&str>) -> anyhow::Result<Metric> {
    raw.map_or(Ok(Metric::default()), str::parse::<Metric>)
}

/// Malformed chart bodies get the same JSON error shape as the other 400s.
async fn reject_body(err: Rejection) -> Result<Response, Rejection> {
    match err.find::<warp::filters::body::BodyDeserializeError>() {
        Some(e) => Ok(bad_request(
            "Invalid request body",
            anyhow::anyhow!(e.to_string()),
        )),
        None => Err(err),
    }
}

async fn health_check() -> Result<impl Reply, Rejection> {
    Ok(reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "pensiondash"
    })))
}

fn map_rows(q: MapQuery, ctx: Arc<DashboardContext>) -> Response {
    match parse_metric(q.metric.as_deref()) {
        Ok(metric) => reply::json(&ctx.tables(metric).map).into_response(),
        Err(e) => bad_request("Unknown metric", e),
    }
}

fn tab_page(raw: String) -> Response {
    match raw.parse::<Tab>() {
        Ok(t) => reply::json(&view::tab_content(t)).into_response(),
        Err(e) => bad_request("Unknown tab", e),
    }
}

fn chart_view(req: ChartRequest, ctx: Arc<DashboardContext>) -> Response {
    let metric = match parse_metric(req.metric.as_deref()) {
        Ok(m) => m,
        Err(e) => return bad_request("Unknown metric", e),
    };
    let tab = match req.tab.parse::<Tab>() {
        Ok(t) => t,
        Err(e) => return bad_request("Unknown tab", e),
    };
    reply::json(&view::render(&ctx, &req.hover, metric, tab)).into_response()
}

fn state_list(ctx: Arc<DashboardContext>) -> Response {
    reply::json(&StatesResponse {
        states: &ctx.states,
        fiscal_years: ctx.fiscal_years,
        default_state: view::DEFAULT_STATE,
        overview: OVERVIEW,
        loaded_at: ctx.loaded_at.to_rfc3339(),
    })
    .into_response()
}

/// All dashboard routes over a shared, read-only context.
pub fn routes(
    ctx: Arc<DashboardContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_ctx = warp::any().map(move || Arc::clone(&ctx));

    let index = warp::path::end()
        .and(warp::get())
        .map(|| reply::html(DASHBOARD_HTML));

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(health_check);

    let map = warp::path!("api" / "map")
        .and(warp::get())
        .and(warp::query::<MapQuery>())
        .and(with_ctx.clone())
        .map(map_rows);

    let tab = warp::path!("api" / "tab" / String)
        .and(warp::get())
        .map(tab_page);

    let chart = warp::path!("api" / "chart")
        .and(warp::post())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json::<ChartRequest>())
        .and(with_ctx.clone())
        .map(chart_view)
        .recover(reject_body)
        .unify();

    let states = warp::path!("api" / "states")
        .and(warp::get())
        .and(with_ctx)
        .map(state_list);

    index
        .or(health)
        .or(map)
        .or(tab)
        .or(chart)
        .or(states)
        .with(warp::trace::request())
}

pub async fn serve(ctx: Arc<DashboardContext>, addr: SocketAddr) {
    info!("Server starting on {}", addr);
    info!("Dashboard: http://{}/", addr);
    info!("Health check: http://{}/health", addr);
    warp::serve(routes(ctx)).run(addr).await;
}
