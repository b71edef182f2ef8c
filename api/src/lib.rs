//! The clipforge orchestration core, models, and API

#[macro_use]
extern crate serde_derive;

use std::net::{IpAddr, SocketAddr};

pub mod conf;
pub mod models;
pub mod provider;
pub mod routes;
pub mod spawner;
pub mod utils;

pub use conf::Conf;

/// Build the axum app
///
/// # Arguments
///
/// * `state` - The shared state to serve requests with
/// * `conf` - The clipforge config
fn build_app(state: utils::AppState, conf: &Conf) -> axum::Router {
    use axum::http::header::{HeaderName, HeaderValue};
    use axum::http::{Method, Request};
    use axum::response::Response;
    use std::time::Duration;
    use tower_http::cors::CorsLayer;
    use tower_http::set_header::SetResponseHeaderLayer;
    use tower_http::trace::{DefaultMakeSpan, TraceLayer};
    use tracing::{Level, Span, event};

    // build an axum router
    let mut app = axum::Router::new();
    app = routes::basic::mount(app);
    app = routes::docs::mount(app);
    app = routes::jobs::mount(app);
    app = routes::system::mount(app);
    app = routes::uploads::mount(app);
    app = routes::webhooks::mount(app);
    // build cors middleware for our app
    let cors = if conf.clipforge.cors.insecure {
        CorsLayer::permissive()
    } else {
        // start building our cors settings and allow all methods we use
        let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
        // cast the domains we want to add to the correct type
        let origins = conf
            .clipforge
            .cors
            .domains
            .iter()
            .map(|domain| domain.parse())
            .collect::<Result<Vec<HeaderValue>, _>>()
            .expect("Failed to parse CORS domains");
        cors.allow_origin(origins)
    };
    // add middleware to our app
    app = app
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(|req: &Request<_>, span: &Span| {
                    // get our uri as a str
                    let url_and_query = match req.uri().path_and_query() {
                        Some(path_and_query) => path_and_query.as_str(),
                        None => req.uri().path(),
                    };
                    event!(
                        parent: span,
                        Level::INFO,
                        uri = url_and_query,
                        msg = "Starting Request"
                    );
                })
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    // get our status code
                    let code = response.status();
                    event!(
                        parent: span,
                        Level::INFO,
                        code = code.as_u16(),
                        latency = latency.as_millis(),
                        msg = "Responding to Request"
                    );
                }),
        )
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("clipforge-version"),
            HeaderValue::from_str(env!("CARGO_PKG_VERSION"))
                .expect("clipforge version is not a valid header value"),
        ));
    app.with_state(state)
}

/// Launches the clipforge api using axum
///
/// # Arguments
///
/// * `config` - The clipforge config to serve with
///
/// # Panics
///
/// Will panic if we cannot connect to the state store or bind our port.
pub async fn axum(config: Conf) {
    // setup shared object
    let shared = utils::Shared::new(config.clone()).await;
    // get our log level
    let log_level = shared.config.clipforge.tracing.level;
    // log interface/port we are binding to
    info!(
        log_level,
        format!(
            "binding to {}:{}",
            &config.clipforge.interface, &config.clipforge.port
        )
    );
    // build our app state
    let state = utils::AppState::new(shared);
    // build our app
    let app = build_app(state, &config);
    // parse our interface addr
    let bind_addr: IpAddr = config
        .clipforge
        .interface
        .parse()
        .expect("Failed to parse interface addr");
    // get the address and port to bind too
    let addr = SocketAddr::new(bind_addr, config.clipforge.port);
    // bind and start handling requests
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to interface");
    axum::serve(listener, app)
        .await
        .expect("Failed to serve the clipforge api");
}
