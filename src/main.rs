//! flare-gateway 可执行入口
//!
//! 用法：`flare-gateway [config.toml]`，未指定时依次尝试
//! `FLARE_GATEWAY_CONFIG` 环境变量和默认配置路径。

use anyhow::Context;
use flare_gateway::config::GatewayConfig;
use flare_gateway::runtime::GatewayRuntime;
use flare_gateway::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::load(std::env::args().nth(1)).context("failed to load gateway config")?;
    telemetry::init_tracing(&config.logging).context("failed to initialize logging")?;

    let runtime = GatewayRuntime::from_config(config)
        .await
        .context("failed to build gateway runtime")?;
    runtime.run().await.context("gateway exited with error")?;
    Ok(())
}
