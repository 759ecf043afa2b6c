#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let config = planner_server::config::Config::from_env()?;
    planner_server::web::start_web_server(config).await
}
