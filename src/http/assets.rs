//! Embedded static web UI, served with SPA fallback to `index.html` (§4.8).

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "ui/"]
struct Ui;

pub async fn index_handler() -> Response {
    serve_embedded("index.html")
}

pub async fn asset_handler(Path(path): Path<String>) -> Response {
    serve_embedded(&path)
}

fn serve_embedded(path: &str) -> Response {
    match Ui::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], file.data).into_response()
        }
        // SPA fallback: any unknown path under the UI still serves index.html,
        // so client-side routing works on a hard refresh.
        None => match Ui::get("index.html") {
            Some(file) => ([(header::CONTENT_TYPE, "text/html")], file.data).into_response(),
            None => (StatusCode::NOT_FOUND, "ui assets not embedded").into_response(),
        },
    }
}
