use tracing::*;

use snapfeed::config::{self, AppCfg};
use snapfeed::helpers::LogErr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::tracing::init();

    let cfg = AppCfg::load().log_err("invalid configuration")?;

    let app = snapfeed::app(&cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    info!("starting listening at {}", cfg.listen_addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "could not listen for ctrl-c");
    }
}
