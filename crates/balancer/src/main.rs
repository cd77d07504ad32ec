//! Load balancer entry point.

use balancer::BalancerConfig;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BalancerConfig::parse();
    balancer::trace::init(&config.log_level)?;
    balancer::app::run(config).await
}
