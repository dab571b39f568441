use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use shepherd_api::{app, config::AppConfig};

const PRUNE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    shepherd_observability::init_with(config.log_format);
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }

    let services = Arc::new(app::AppServices::new(&config));
    services.seed_demo_data();

    let pruner = services.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            pruner.prune_security_state(Utc::now());
        }
    });

    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
