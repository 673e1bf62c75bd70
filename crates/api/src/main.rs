use anyhow::Context;

use stockledger_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    stockledger_observability::init(&config.log);
    if config.uses_dev_jwt_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let app = stockledger_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
