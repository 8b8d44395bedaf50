mod api;
mod audit;
mod error;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use api::AppState;
use std::sync::Arc;
use tableruntime::RuntimeConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting tableflow server");

    let config = RuntimeConfig::from_env()?;
    let audit_path = config.data_dir.join(audit::AUDIT_FILE);
    let runtime = Arc::new(tablenodes::standard_runtime(config));

    info!(
        "Runtime initialized with node types: {:?}",
        runtime.registry().list_node_types()
    );

    actix_web::rt::spawn(audit::run_audit_writer(runtime.subscribe_events(), audit_path));

    let app_state = web::Data::new(AppState { runtime });

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(api::configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
