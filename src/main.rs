use axum::http::StatusCode;
use chatrelay::error::AppError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatrelay=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        tracing::error!(code = %err.code, "{}", err.message);
        eprintln!("error: {}", err.message);
        std::process::exit(1);
    }
}

fn startup_error(code: &'static str) -> impl Fn(std::io::Error) -> AppError {
    move |err| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
}

async fn run() -> Result<(), AppError> {
    let state = chatrelay::app::load_state().await?;
    let addr: std::net::SocketAddr = state.runtime.listen.parse().map_err(
        |err: std::net::AddrParseError| {
            AppError::new(StatusCode::BAD_REQUEST, "listen_invalid", err.to_string())
        },
    )?;
    let app = chatrelay::app::build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(startup_error("listen_failed"))?;
    tracing::info!(%addr, "chatrelay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(startup_error("serve_failed"))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install ctrl-c handler: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
