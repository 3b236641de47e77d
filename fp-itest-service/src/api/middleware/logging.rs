use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use log::{debug, trace, warn};
use std::time::Instant;

pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let client_ip =
        req.extensions().get::<ConnectInfo<std::net::SocketAddr>>().map(|ConnectInfo(addr)| addr.ip().to_string()).unwrap_or_default();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();
    if path == "/health" {
        trace!("health check client_ip={} status={} duration_ms={}", client_ip, status.as_u16(), duration.as_millis());
    } else if status.is_server_error() {
        warn!(
            "request failed client_ip={} method={} path={} status={} duration_ms={}",
            client_ip,
            method,
            path,
            status.as_u16(),
            duration.as_millis()
        );
    } else {
        debug!(
            "request completed client_ip={} method={} path={} status={} duration_ms={}",
            client_ip,
            method,
            path,
            status.as_u16(),
            duration.as_millis()
        );
    }
    response
}
