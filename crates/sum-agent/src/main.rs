use sum_agent::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sum_agent::install_tracing();
    let config = Config::load()?;
    sum_agent::run(config).await?;
    Ok(())
}
