use clap::Parser;

use clicklytics::cli::{Cli, run};
use clicklytics::config::{get_config, init_config};
use clicklytics::system::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // 配置先于日志：日志级别/输出来自配置
    init_config();
    let config = get_config();
    let _log_guard = init_logging(&config);

    let cli = Cli::parse();
    run(cli).await
}
