use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use http::{Extensions, HeaderMap};
use http::header::{HeaderName, RANGE, REFERER, USER_AGENT};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// One log line per request. Use with `axum::middleware::from_fn`.
///
/// The client address is only known when the router is served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let ip = client_ip(request.extensions());
    let headers = request.headers();
    let xff = header(headers, &X_FORWARDED_FOR);
    let real_ip = header(headers, &X_REAL_IP);
    let ua = header(headers, &USER_AGENT);
    let range = header(headers, &RANGE);
    let referer = header(headers, &REFERER);
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(
        ip = %ip,
        xff = %xff,
        x_real_ip = %real_ip,
        ua = %ua,
        range = %range,
        referer = %referer,
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        ms = start.elapsed().as_millis(),
        "request"
    );
    response
}

/// Peer host without the port.
fn client_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn header(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
