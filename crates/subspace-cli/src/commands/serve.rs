use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{AppendHeaders, Html, IntoResponse, Response};
use axum::routing::get;
use subspace_api::Installation;
use subspace_auth::{SharedSecret, TokenCodec};
use subspace_connectors::{BridgeSessionClient, MemoryIdentityStore, StaticInstallation};
use subspace_core::GatewayConfig;
use subspace_gateway::{
    Authenticated, Gateway, GatewayError, GatewaySettings, Guard, Section, log_requests,
    require_session,
};
use tracing::info;

use crate::session_manager;

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    installation: Arc<StaticInstallation>,
}

pub async fn run(config: &GatewayConfig, secret: SharedSecret) -> anyhow::Result<()> {
    let app = build_app(config, secret);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, host = %config.http_host, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

fn build_app(config: &GatewayConfig, secret: SharedSecret) -> Router {
    let settings = GatewaySettings::from_config(config);
    let installation = Arc::new(StaticInstallation::default());
    let mut gateway = Gateway::new(
        session_manager(config, secret.clone()),
        Arc::new(MemoryIdentityStore::new()),
        installation.clone(),
    )
    .with_settings(settings.clone());

    if config.federation.enabled {
        if let Some(url) = config.federation.idp_sso_url.clone() {
            let bridge = BridgeSessionClient::new(
                TokenCodec::new(secret),
                settings.sso_cookie.clone(),
                url,
            );
            gateway = gateway.with_federation(Arc::new(bridge));
        }
    }

    let gateway = Arc::new(gateway);
    let state = AppState {
        gateway: gateway.clone(),
        installation,
    };

    let signin = Router::new()
        .route(&settings.signin_path, get(signin_page))
        .route_layer(from_fn_with_state(
            Guard::new(gateway.clone(), Section::SignIn),
            require_session,
        ));

    let forgot = Router::new()
        .route("/forgot", get(forgot_page))
        .route_layer(from_fn_with_state(
            Guard::new(gateway.clone(), Section::Forgot),
            require_session,
        ));

    let setup = Router::new()
        .route(&settings.configure_path, get(configure_page).post(configure))
        .route_layer(from_fn_with_state(
            Guard::new(gateway.clone(), Section::Configure),
            require_session,
        ));

    let protected = Router::new()
        .route("/", get(dashboard))
        .route("/signout", get(signout))
        .route_layer(from_fn_with_state(
            Guard::new(gateway, Section::Protected("dashboard")),
            require_session,
        ));

    signin
        .merge(forgot)
        .merge(setup)
        .merge(protected)
        .with_state(state)
        .layer(from_fn(log_requests))
}

async fn signin_page(State(state): State<AppState>) -> Html<String> {
    let sso = match state.gateway.sso_provider_name() {
        Some(name) => format!("<p>Sign in with {name}</p>"),
        None => String::new(),
    };
    Html(format!("<!doctype html><title>Sign in</title><h1>Sign in</h1>{sso}"))
}

async fn forgot_page() -> Html<&'static str> {
    Html("<!doctype html><title>Forgot password</title><h1>Forgot password</h1>")
}

async fn configure_page(State(state): State<AppState>) -> Response {
    if state.installation.is_configured() {
        return redirect(&state.gateway.settings().signin_path, Vec::new());
    }
    Html("<!doctype html><title>Configure</title><h1>Configure</h1>\
          <form method=\"post\"><button>Finish setup</button></form>")
    .into_response()
}

async fn configure(State(state): State<AppState>) -> Result<Response, GatewayError> {
    if state.installation.is_configured() {
        return Ok(redirect(&state.gateway.settings().signin_path, Vec::new()));
    }
    state.installation.mark_configured();
    let artifact = state.gateway.sign_in(true, "")?;
    info!("initial configuration complete, admin signed in");
    Ok(redirect("/", vec![artifact.set_cookie]))
}

async fn dashboard(Authenticated(principal): Authenticated) -> Html<String> {
    let who = principal.email().unwrap_or("admin");
    Html(format!(
        "<!doctype html><title>Subspace</title><h1>Welcome {who}</h1>\
         <p>admin: {}</p><a href=\"/signout\">Sign out</a>",
        principal.is_admin
    ))
}

async fn signout(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let cookies = state.gateway.sign_out()?;
    Ok(redirect(&state.gateway.settings().signin_path, cookies))
}

fn redirect(location: &str, cookies: Vec<String>) -> Response {
    (
        StatusCode::FOUND,
        [(LOCATION, location.to_string())],
        AppendHeaders(cookies.into_iter().map(|c| (SET_COOKIE, c))),
    )
        .into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::Request;
    use http::header::COOKIE;
    use subspace_core::parse_config;
    use tower::ServiceExt;

    fn app() -> Router {
        let config = parse_config("http_host = \"vpn.example.com\"").unwrap();
        build_app(&config, SharedSecret::from_bytes(&[3u8; 32]).unwrap())
    }

    fn request(method: &str, path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn first_run_configures_and_signs_in_admin() {
        let app = app();

        let response = app.clone().oneshot(request("GET", "/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/configure");

        let response = app
            .clone()
            .oneshot(request("POST", "/configure", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        let pair = set_cookie.split(';').next().unwrap();

        let response = app
            .clone()
            .oneshot(request("GET", "/", Some(pair)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request("GET", "/signout", Some(pair)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/signin");
        assert!(
            response.headers()[SET_COOKIE]
                .to_str()
                .unwrap()
                .contains("Max-Age=0")
        );

        let response = app.oneshot(request("GET", "/", None)).await.unwrap();
        assert_eq!(response.headers()[LOCATION], "/signin");
    }

    #[tokio::test]
    async fn entry_pages_need_no_session() {
        let app = app();
        for path in ["/signin", "/forgot", "/configure"] {
            let response = app.clone().oneshot(request("GET", path, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }
}
