use anyhow::Context;
use pos_sync::{Config, Engine, HttpCustomerDirectory, HttpOrderRepository, init_logger_with_file};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志)
    dotenv::dotenv().ok();
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    tracing::info!(
        environment = %config.environment,
        backend = %config.backend_url,
        "POS sync engine starting..."
    );

    // 2. 后端接口
    let repository = HttpOrderRepository::new(&config.backend_url, config.remote_timeout())
        .context("Failed to create order repository")?;
    let directory = HttpCustomerDirectory::new(&config.backend_url, config.remote_timeout())
        .context("Failed to create customer directory")?;

    // 3. 打开本地存储并启动后台任务
    let mut engine = Engine::open(config, Arc::new(repository), Some(Arc::new(directory)))
        .context("Failed to open sync engine")?;
    engine.start();

    let stats = engine.manager().stats()?;
    tracing::info!(
        orders = stats.order_count,
        pending = stats.pending_mutation_count,
        dead_letters = stats.dead_letter_count,
        "Sync engine running, press Ctrl-C to stop"
    );

    // 4. 等待退出信号
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutdown signal received");
    engine.shutdown().await;
    Ok(())
}
