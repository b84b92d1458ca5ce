use crate::app::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use mime_guess::MimeGuess;
use std::path::{Component, Path, PathBuf};

async fn asset_response(root: &Path, path: &str) -> Option<Response> {
    let full = root.join(path);
    let contents = tokio::fs::read(&full).await.ok()?;
    let mime: MimeGuess = mime_guess::from_path(&full);
    let content_type = mime.first_or_octet_stream();
    Some(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type.as_ref())
            .body(Body::from(contents))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    )
}

fn sanitize(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

pub async fn frontend_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    if req.method() != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }

    let root = state.runtime.static_dir.as_path();
    let path = req.uri().path().trim_start_matches('/');
    if path == "api" || path.starts_with("api/") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(relative) = sanitize(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !relative.as_os_str().is_empty() {
        if let Some(resp) = asset_response(root, &relative.to_string_lossy()).await {
            return resp;
        }
    }

    match asset_response(root, "index.html").await {
        Some(resp) => resp,
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())
            .body(Body::from(format!(
                "Frontend not found in {}. Set CHATRELAY_STATIC_DIR.",
                root.display()
            )))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    }
}
