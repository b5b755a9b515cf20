use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tinyrand::{Rand, RandRange, Seeded, StdRand};
use tinyrand_std::ClockSeed;
use tracing::{debug, info, instrument, warn};

use crate::bot::command::{Command, CommandType, NativeAction};
use crate::bot::registry::CommandRegistry;
use crate::bot::volume::Fader;
use crate::constants::COMMAND_MARKER;
use crate::parsing::tags::ChatMessage;
use crate::util::assets::AssetCache;
use crate::util::viewer::{Viewer, ViewerLookup, ViewerResolver};

/// Side effects a dispatched command asks the overlay to perform
#[derive(Debug, Clone, PartialEq)]
pub enum BotAction {
    PlayVideo {
        path: PathBuf,
    },
    /// Audio clip with accompanying on-screen text
    Announce {
        path: Option<PathBuf>,
        message: String,
        viewer: Viewer,
    },
    Say(String),
    Shoutout {
        viewer: Viewer,
        image: Option<PathBuf>,
    },
    VolumeFade {
        target: f32,
        over: Duration,
    },
    VolumeFadeAborted {
        volume: f32,
    },
    Panic {
        invoked_by: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Plain chat, or a `!word` naming no registered command
    NotCommand,
    Rejected {
        command: String,
        login: String,
    },
    Unresolved {
        login: String,
    },
    Executed {
        command: String,
        action: Option<BotAction>,
    },
}

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    viewers: Arc<dyn ViewerLookup>,
    fader: Fader,
    assets: Option<AssetCache>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        viewers: Arc<dyn ViewerLookup>,
        fader: Fader,
    ) -> Self {
        Self {
            registry,
            viewers,
            fader,
            assets: None,
        }
    }

    /// Enables profile images on shoutouts
    pub fn with_assets(mut self, assets: AssetCache) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn fader(&self) -> &Fader {
        &self.fader
    }

    #[instrument(skip(self, chat), fields(login = %chat.login))]
    pub async fn dispatch(&self, chat: &ChatMessage) -> Dispatch {
        let Some(invocation) = chat.text.strip_prefix(COMMAND_MARKER) else {
            return Dispatch::NotCommand;
        };

        let (name, rest) = invocation.split_once(' ').unwrap_or((invocation, ""));
        let Some(command) = self.registry.get(name) else {
            debug!(name, "not a registered command");
            return Dispatch::NotCommand;
        };

        let command = match rest.is_empty() {
            true => command.clone(),
            false => command.bind(rest),
        };

        if command.protected && !chat.privileged() {
            warn!(command = %command.name, "protected command rejected for unprivileged caller");
            return Dispatch::Rejected {
                command: command.name,
                login: chat.login.clone(),
            };
        }

        let caller = match ViewerResolver::new(self.viewers.clone(), &chat.login)
            .resolve()
            .await
        {
            Ok(viewer) => viewer,
            Err(e) => {
                warn!(error = %e, "caller could not be resolved, dropping command");
                return Dispatch::Unresolved {
                    login: chat.login.clone(),
                };
            }
        };

        info!(command = %command.name, kind = ?command.kind, "dispatching command");
        match command.kind {
            CommandType::Video => Dispatch::Executed {
                action: self.video(&command).await,
                command: command.name,
            },
            CommandType::Audio => Dispatch::Executed {
                action: Some(BotAction::Announce {
                    path: command.path.clone(),
                    message: command.message.clone(),
                    viewer: caller,
                }),
                command: command.name,
            },
            CommandType::Blank => Dispatch::Executed {
                command: command.name,
                action: None,
            },
            CommandType::Native(action) => self.native(action, command, chat).await,
        }
    }

    async fn native(
        &self,
        action: NativeAction,
        command: Command,
        chat: &ChatMessage,
    ) -> Dispatch {
        let action = match action {
            NativeAction::Commands => {
                let names = self
                    .registry
                    .names(false)
                    .iter()
                    .map(|name| format!("{}{}", COMMAND_MARKER, name))
                    .collect::<Vec<_>>();
                Some(BotAction::Say(format!("Commands: {}", names.join(", "))))
            }

            NativeAction::Shoutout => {
                let target = command
                    .message
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches('@');

                if target.is_empty() {
                    warn!("shoutout without a target");
                    None
                } else {
                    match ViewerResolver::new(self.viewers.clone(), target).resolve().await {
                        Ok(viewer) => Some(self.shoutout(viewer).await),
                        Err(e) => {
                            warn!(error = %e, "shoutout target unknown");
                            return Dispatch::Unresolved {
                                login: target.to_lowercase(),
                            };
                        }
                    }
                }
            }

            NativeAction::Volume if command.message.trim().is_empty() => {
                Some(BotAction::VolumeFadeAborted {
                    volume: self.fader.abort().await,
                })
            }

            NativeAction::Volume => match parse_volume(&command.message) {
                Some((target, over)) => {
                    self.fader.fade(target, over).await;
                    Some(BotAction::VolumeFade { target, over })
                }
                None => {
                    warn!(args = %command.message, "expected !volume <0-100> [seconds]");
                    None
                }
            },

            // never runs for unprivileged callers, whatever its registry entry says
            NativeAction::Panic if !chat.privileged() => {
                warn!("panic rejected for unprivileged caller");
                return Dispatch::Rejected {
                    command: command.name,
                    login: chat.login.clone(),
                };
            }

            NativeAction::Panic => {
                warn!(invoked_by = %chat.login, "panic requested");
                Some(BotAction::Panic {
                    invoked_by: chat.login.clone(),
                })
            }
        };

        Dispatch::Executed {
            command: command.name,
            action,
        }
    }

    async fn shoutout(&self, viewer: Viewer) -> BotAction {
        let image = match &self.assets {
            Some(assets) => match assets.profile_image(&viewer).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "shoutout without profile image");
                    None
                }
            },
            None => None,
        };

        BotAction::Shoutout { viewer, image }
    }

    async fn video(&self, command: &Command) -> Option<BotAction> {
        let Some(path) = &command.path else {
            warn!(command = %command.name, "video command has no path");
            return None;
        };

        let path = match command.random {
            true => pick_random_file(path).await?,
            false => path.clone(),
        };

        Some(BotAction::PlayVideo { path })
    }
}

/// `<0-100> [seconds]` → (volume fraction, fade duration)
fn parse_volume(args: &str) -> Option<(f32, Duration)> {
    let mut parts = args.split_whitespace();

    let level = parts.next()?.parse::<u8>().ok().filter(|level| *level <= 100)?;
    let seconds = match parts.next() {
        Some(raw) => raw.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0)?,
        None => 0.0,
    };

    Some((level as f32 / 100.0, Duration::from_secs_f64(seconds)))
}

pub fn idx(max: usize) -> usize {
    let seed = ClockSeed::default().next_u64();
    let mut rng = StdRand::seed(seed);

    rng.next_range(0..max)
}

/// Uniform pick among the regular files directly inside `dir`
async fn pick_random_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "unable to read video directory");
            return None;
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|kind| kind.is_file()) {
            files.push(entry.path());
        }
    }

    if files.is_empty() {
        warn!(dir = %dir.display(), "no videos to pick from");
        return None;
    }

    Some(files.swap_remove(idx(files.len())))
}
