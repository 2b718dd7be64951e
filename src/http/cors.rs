use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::AppState;

const ALLOW_METHODS: &str = "GET,OPTIONS";
const ALLOW_HEADERS: &str = "content-type";
const MAX_ORIGIN_LEN: usize = 256;

/// Value for `access-control-allow-origin`, if the request's origin is allowed.
fn allowed_origin(allowed: &[String], headers: &HeaderMap) -> Option<HeaderValue> {
    if allowed.iter().any(|origin| origin == "*") {
        return Some(HeaderValue::from_static("*"));
    }
    let origin = headers
        .get("origin")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_ORIGIN_LEN)?;
    if !allowed.iter().any(|candidate| candidate == origin) {
        return None;
    }
    HeaderValue::from_str(origin).ok()
}

pub(super) async fn cors_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let allowed = &state.settings.cors_allowed_origins;
    let origin = allowed_origin(allowed, req.headers());
    let wildcard = allowed.iter().any(|candidate| candidate == "*");

    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        if let Some(value) = origin {
            let headers = resp.headers_mut();
            headers.insert("access-control-allow-origin", value);
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static(ALLOW_METHODS),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static(ALLOW_HEADERS),
            );
        }
        return resp;
    }

    let mut resp = next.run(req).await;
    if let Some(value) = origin {
        resp.headers_mut().insert("access-control-allow-origin", value);
        if !wildcard {
            resp.headers_mut()
                .insert("vary", HeaderValue::from_static("Origin"));
        }
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn wildcard_allows_requests_without_origin() {
        let allowed = vec!["*".to_string()];
        assert_eq!(
            allowed_origin(&allowed, &HeaderMap::new()),
            Some(HeaderValue::from_static("*"))
        );
    }

    #[test]
    fn explicit_list_echoes_only_known_origins() {
        let allowed = vec!["https://clinic.example".to_string()];
        assert_eq!(
            allowed_origin(&allowed, &headers_with_origin("https://clinic.example")),
            Some(HeaderValue::from_static("https://clinic.example"))
        );
        assert_eq!(
            allowed_origin(&allowed, &headers_with_origin("https://other.example")),
            None
        );
        assert_eq!(allowed_origin(&allowed, &HeaderMap::new()), None);
    }
}
