use anyhow::Result;
use messagebus::Bus;
use observability::ShutdownHandle;
use stage_candles::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    pipeline_config::load_dotenv();

    let settings = Settings::from_env()?;
    let bus = Bus::new();
    let shutdown = ShutdownHandle::new();

    let health = tokio::spawn(observability::serve_health(settings.health_port, shutdown.flag()));
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move { ctrl_c.wait_for_ctrl_c().await });

    let run_result = stage_candles::run(&settings, bus.clone(), shutdown.flag()).await;
    shutdown.request();
    bus.shutdown(std::time::Duration::from_secs(2)).await;
    let _ = health.await;

    run_result
}
