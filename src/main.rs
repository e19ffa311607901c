#[tokio::main]
async fn main() -> xeres_bot::error::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("xeres_bot=info,tungstenite=warn"),
    )
    .init();
    log::info!("Starting xeres-bot");

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        log::warn!("A TLS crypto provider was already installed");
    }

    match xeres_bot::run().await {
        Ok(()) => {
            log::info!("Bot shut down successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Bot encountered an error: {e}");
            Err(e)
        }
    }
}
