use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bot::dispatch::{BotAction, Dispatch, Dispatcher};
use crate::bot::registry::{CommandRegistry, RegistryError};
use crate::bot::volume::Fader;
use crate::socket::client::{ChannelClient, ChannelHandle};
use crate::socket::core::{ChannelError, ChannelEvent, Credentials};
use crate::util::assets::AssetCache;
use crate::util::env::{EnvErr, Var};
use crate::util::helix::{Helix, HelixErr};
use crate::util::request::RequestQueue;
use crate::util::tracing::{LogFormat, build_subscriber};
use crate::util::viewer::{ReauthRequired, ViewerLookup, ViewerResolver};

mod bot;
mod constants;
mod parsing;
mod socket;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error("unable to install tracing subscriber: {0}")]
    Tracing(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Helix(#[from] HelixErr),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("panic command invoked by {invoked_by}")]
    Panicked { invoked_by: String },
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let env = util::env::env().await?;

    let format = LogFormat::from(crate::var!(Var::LogFormat).await?);
    build_subscriber(format).map_err(|e| RunnerErr::Tracing(e.to_string()))?;

    info!("starting overlay chatbot");

    let registry = Arc::new(CommandRegistry::load(&env.commands_path)?);

    let queue = RequestQueue::new(reqwest::Client::new());
    let helix = Arc::new(Helix::new(
        &env.helix_url,
        &env.twitch_client_id,
        &env.twitch_token,
        queue,
    )?);
    let viewers: Arc<dyn ViewerLookup> = helix.clone();
    let assets = AssetCache::new(&env.cache_dir, helix.clone());

    let (reauth_tx, mut reauth_rx) = mpsc::unbounded_channel::<ReauthRequired>();

    let owner = env.twitch_channel.trim_start_matches('#');
    let administrator = ViewerResolver::new(viewers.clone(), owner)
        .administrator(reauth_tx.clone())
        .resolve()
        .await;

    let broadcaster_id = match &administrator {
        Ok(admin) => {
            info!(admin = %admin.name, id = %admin.id, "administrator resolved");
            Some(admin.id.as_str())
        }
        Err(e) => {
            warn!(error = %e, "administrator unresolved, loading global badges only");
            None
        }
    };

    if let Err(e) = assets.refresh_badges(broadcaster_id).await {
        warn!(error = %e, "badge index unavailable, chat lines will carry no badge icons");
    }

    let fader = Fader::new(1.0);
    let dispatcher = Arc::new(
        Dispatcher::new(registry, viewers, fader.clone()).with_assets(assets.clone()),
    );

    let credentials = Credentials::new(&env.twitch_token, &env.twitch_login, &env.twitch_channel);
    let mut connection = ChannelClient::connect(&env.irc_url, credentials).await?;
    let handle = connection.handle.clone();

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<Dispatch>();
    let mut changed = assets.subscribe();
    let mut volume = fader.subscribe();

    let mut result = Ok(());
    loop {
        tokio::select! {
            event = connection.events.recv() => {
                let Some(event) = event else {
                    break;
                };

                match event {
                    ChannelEvent::Chat(chat) => {
                        let chat = assets.decorate(chat).await;
                        info!(sender = %chat.sender, text = %chat.text, "chat");

                        let dispatcher = dispatcher.clone();
                        let outcome_tx = outcome_tx.clone();
                        tokio::spawn(async move {
                            let outcome = dispatcher.dispatch(&chat).await;
                            let _ = outcome_tx.send(outcome);
                        });
                    }
                    ChannelEvent::AuthenticationDenied { notice } => {
                        error!(%notice, "authentication denied");
                        let _ = reauth_tx.send(ReauthRequired {
                            login: env.twitch_login.clone(),
                            reason: notice,
                        });
                        handle.disconnect();
                    }
                    ChannelEvent::ReconnectRequested => {
                        warn!("server requested a reconnect, shutting down");
                        handle.disconnect();
                    }
                    ChannelEvent::Disconnected => {
                        info!("channel disconnected");
                        break;
                    }
                    other => debug!(event = ?other, "channel event"),
                }
            }

            Some(outcome) = outcome_rx.recv() => {
                if let Err(e) = perform(outcome, &handle) {
                    error!(error = %e, "stopping after fatal command");
                    handle.disconnect();
                    result = Err(e);
                }
            }

            Some(reauth) = reauth_rx.recv() => {
                warn!(login = %reauth.login, reason = %reauth.reason, "re-authorization required");
            }

            Ok(path) = changed.recv() => {
                debug!(path = %path.display(), "asset content changed");
            }

            Ok(()) = volume.changed() => {
                debug!(volume = *volume.borrow_and_update(), "player volume");
            }

            _ = tokio::signal::ctrl_c() => {
                if handle.is_closed() {
                    warn!("interrupted again, exiting without waiting for the channel");
                    connection.task.abort();
                    break;
                }

                info!("interrupted, leaving channel");
                handle.disconnect();
            }
        }
    }

    match connection.task.await {
        Ok(Err(e)) => warn!(error = %e, "channel task failed"),
        Err(e) if e.is_cancelled() => debug!("channel task aborted"),
        Err(e) => warn!(error = %e, "channel task panicked"),
        Ok(Ok(())) => {}
    }

    result
}

fn perform(outcome: Dispatch, handle: &ChannelHandle) -> Result<()> {
    let action = match outcome {
        Dispatch::Executed {
            command,
            action: Some(action),
        } => {
            debug!(%command, "performing command");
            action
        }
        other => {
            debug!(outcome = ?other, "nothing to perform");
            return Ok(());
        }
    };

    match action {
        BotAction::Say(text) => {
            if let Err(e) = handle.say(&text) {
                warn!(error = %e, "unable to reply in chat");
            }
        }
        BotAction::PlayVideo { path } => info!(path = %path.display(), "play video"),
        BotAction::Announce {
            path,
            message,
            viewer,
        } => info!(path = ?path, %message, viewer = %viewer.display_name, "announce"),
        BotAction::Shoutout { viewer, image } => {
            info!(viewer = %viewer.display_name, image = ?image, "shoutout")
        }
        BotAction::VolumeFade { target, over } => info!(target, ?over, "volume fade"),
        BotAction::VolumeFadeAborted { volume } => info!(volume, "volume fade aborted"),
        BotAction::Panic { invoked_by } => return Err(RunnerErr::Panicked { invoked_by }),
    }

    Ok(())
}
