pub mod chat;
pub mod chatbot;
pub mod completion;
pub mod config;
pub mod control;
pub mod error;
pub mod setup;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

use log::{debug, info};

use chatbot::Dispatcher;
use completion::OpenAiClient;
use config::Config;
use control::ControlClient;
use error::{BotError, Result};

/// Run the bot until Ctrl-C. A lost chat connection ends the run with an error.
pub async fn run() -> Result<()> {
    info!("Initializing bot");
    let config = Config::load()?;

    let control = ControlClient::new(&config.xeres.api_url);
    setup::provision(&control, &config.xeres).await?;

    let identity = control.own_identity().await?;
    info!("I am {}", identity.name);
    info!(
        "This is my RS ID (paste it in friends I have to connect to):\n{}",
        control.own_rs_id().await?
    );

    setup::synchronize_rooms(&control, &config.xeres.room_names).await?;

    let (sender, mut receiver) = transport::connect(&config.xeres.api_url).await?;

    debug!("Initializing completion client");
    let backend = OpenAiClient::new(&config.openai);
    let mut dispatcher = Dispatcher::new(&config, identity, backend, sender);

    info!("Ready and awaiting to be addressed to.");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            frame = receiver.next_message() => {
                let Some(frame) = frame? else {
                    return Err(BotError::Transport("chat connection closed".to_string()));
                };
                dispatcher.handle_frame(&frame).await?;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, shutting down...");
                break;
            }
        }
    }

    Ok(())
}
