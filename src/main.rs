// viewstream server entry point.

use std::sync::Arc;

use tracing::{error, info};
use viewstream::trigger::WebhookClient;
use viewstream::{schema, server::ViewstreamServer, Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config = Config::from_env()?;
    info!(upstream = %config.upstream_addr, listen = %config.listen_addr, "starting viewstream");

    let schema_doc = std::fs::read_to_string(&config.schema_path).map_err(|e| {
        viewstream::ViewstreamError::Config(format!(
            "reading schema file '{}': {e}",
            config.schema_path
        ))
    })?;
    let schema = schema::load_from_yaml(&schema_doc)?;

    let webhook = Arc::new(WebhookClient::new());
    let server = Arc::new(ViewstreamServer::new(
        schema,
        config.upstream_addr.clone(),
        webhook,
    ));

    let gql_schema = viewstream::transport::build_schema(server);
    let app = viewstream::transport::router(gql_schema);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| {
            viewstream::ViewstreamError::Config(format!("binding '{}': {e}", config.listen_addr))
        })?;

    info!(addr = %config.listen_addr, "listening");

    let serve = axum::serve(listener, app);
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, exiting");
        }
    }

    Ok(())
}
