use activity_module::service::{run_server, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env()?;
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    run_server(config, shutdown).await
}
