use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use scraper::Html;
use serde_json::json;

mod extract;
mod infotext;
mod metadata;
mod models;
mod panels;
mod raster;
mod view;

use extract::SourceFetcher;
use models::{MetadataRequest, MetadataResponse, PanelDataResponse, SnapshotRequest};
use view::SnapshotView;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let app = Router::new()
        .route("/health", get(health))
        .route("/extract", post(extract_active))
        .route("/extract/:elem_id", post(extract_by_id))
        .route("/metadata", post(metadata_endpoint));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Active-panel extraction. Always answers 200; failure collapses to an
/// empty `data_url`.
async fn extract_active(Json(req): Json<SnapshotRequest>) -> Json<PanelDataResponse> {
    // DOM reads happen before the first await so the parsed snapshot never
    // crosses a suspension point.
    let (panel, plan) = {
        let doc = Html::parse_document(&req.html);
        let view = SnapshotView::new(&doc);
        let panel = panels::active_panel(&view).map(|tab| tab.panel);
        (panel, extract::plan_for_active(&view))
    };
    let fetcher = SourceFetcher::new(req.base_url.as_deref());
    let data_url = extract::data_url_or_empty(plan, &fetcher).await;
    tracing::info!(?panel, len = data_url.len(), "active panel extraction");
    Json(PanelDataResponse { panel, data_url })
}

async fn extract_by_id(
    Path(elem_id): Path<String>,
    Json(req): Json<SnapshotRequest>,
) -> Json<PanelDataResponse> {
    let fetcher = SourceFetcher::new(req.base_url.as_deref());
    let data_url = extract::panel_data_url(&req.html, &fetcher, &elem_id).await;
    tracing::info!(%elem_id, len = data_url.len(), "panel extraction by id");
    Json(PanelDataResponse {
        panel: None,
        data_url,
    })
}

/// Extract the active panel, then surface the generation parameters stored
/// in the PNG's text chunks. Empty metadata when there is no panel image or
/// the image carries no infotext.
async fn metadata_endpoint(Json(req): Json<MetadataRequest>) -> Json<MetadataResponse> {
    let plan = {
        let doc = Html::parse_document(&req.html);
        let view = SnapshotView::new(&doc);
        extract::plan_for_active(&view)
    };
    let fetcher = SourceFetcher::new(req.base_url.as_deref());
    let bytes = match plan {
        Ok(plan) => extract::raw_source_bytes(plan, &fetcher).await.ok(),
        Err(e) => {
            tracing::debug!("metadata extraction yielded no source: {}", e);
            None
        }
    };
    let parsed = bytes
        .and_then(|bytes| metadata::read_parameters(&bytes))
        .map(|text| infotext::parse_generation_parameters(&text))
        .unwrap_or_default();

    let modified_prompt = (req.remove.is_some() || req.add.is_some()).then(|| {
        infotext::modify_prompt(
            &parsed.prompt,
            req.remove.as_deref().unwrap_or(""),
            req.add.as_deref().unwrap_or(""),
        )
    });

    let seed = parsed.seed();
    Json(MetadataResponse {
        prompt: parsed.prompt,
        negative_prompt: parsed.negative_prompt,
        seed,
        parameters: parsed.settings,
        modified_prompt,
    })
}
