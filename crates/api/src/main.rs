use std::sync::Arc;

use ledger_infra::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledger_observability::init();

    let config = LedgerConfig::from_env()?;
    let services = ledger_api::app::services::build_services(&config).await?;
    let app = ledger_api::app::build_app(Arc::new(services));

    let addr = format!("0.0.0.0:{}", config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        policy = config.balance_after_policy.as_str(),
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}
