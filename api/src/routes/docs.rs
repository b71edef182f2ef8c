//! Serves the merged openapi docs for the clipforge api

use axum::Router;
use axum::extract::Json;
use axum::routing::get;
use utoipa::OpenApi;

use super::{basic, jobs, system, uploads, webhooks};
use crate::utils::AppState;

/// Return the merged openapi docs for every route module
async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    let mut docs = basic::BasicApiDocs::openapi();
    docs.merge(jobs::JobApiDocs::openapi());
    docs.merge(uploads::UploadApiDocs::openapi());
    docs.merge(system::SystemApiDocs::openapi());
    docs.merge(webhooks::WebhookApiDocs::openapi());
    Json(docs)
}

/// Add the docs routes to our router
///
/// # Arguments
///
// * `router` - The router to add routes too
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router.route("/api/docs/openapi.json", get(openapi))
}
