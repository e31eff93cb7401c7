use hesaab_core::{api, create_pool, run_migrations, AppConfig};
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // local-time log lines
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    let config = AppConfig::load()?;
    info!(
        "Starting server on {}:{} (max {} db connections)",
        config.server.host, config.server.port, config.database.max_connections
    );

    let pool = create_pool(&config.database).await?;
    info!("Database pool created");
    run_migrations(&pool).await?;
    info!("Migrations applied");

    let app = api::router(pool, config.matching.clone()).layer(ServiceBuilder::new());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET  /api/tenants/:tenant_id/bank-accounts/:id/match-suggestions");
    info!("  POST /api/tenants/:tenant_id/bank-accounts/:id/auto-match");
    info!("  POST /api/tenants/:tenant_id/bank-accounts/:id/statements");
    info!("  POST /api/tenants/:tenant_id/reconciliations");
    info!("  POST /api/tenants/:tenant_id/gold/plans");
    info!("  PUT  /api/tenants/:tenant_id/gold/prices");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
