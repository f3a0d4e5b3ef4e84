use tracing_subscriber::EnvFilter;

use toolgate_server::demo::demo_toolset;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::var("TOOLGATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("TOOLGATE_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8000);

    toolgate_server::publish(demo_toolset(), &host, port)
        .await
        .expect("Tool server failed");
}
