//! Process configuration, read once from the environment (and `.env`, when present).
//!
//! Values are deserialized from the raw `(name, value)` pairs with serde's `MapDeserializer`, so
//! any variable not named by `Env` is ignored and optional settings fall back to their defaults.

use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::constants::{API_HELIX_URL, DEFAULT_CACHE_DIR, DEFAULT_COMMANDS_PATH, IRC_WEBSOCKET_URL};

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

pub async fn env() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = env().await?;
    Ok(match var {
        Var::Token => &vars.twitch_token,
        Var::ClientId => &vars.twitch_client_id,
        Var::Login => &vars.twitch_login,
        Var::Channel => &vars.twitch_channel,
        Var::CommandsPath => &vars.commands_path,
        Var::CacheDir => &vars.cache_dir,
        Var::IrcUrl => &vars.irc_url,
        Var::HelixUrl => &vars.helix_url,
        Var::LogFormat => &vars.log_format,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub twitch_token: String,
    pub twitch_client_id: String,
    pub twitch_login: String,
    /// Channel to join; its owner is also the primary administrator
    pub twitch_channel: String,

    #[serde(default = "default_commands_path")]
    pub commands_path: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_irc_url")]
    pub irc_url: String,
    #[serde(default = "default_helix_url")]
    pub helix_url: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Env {
    /// Seeds the process environment from `.env` when one exists, then reads it
    pub fn new() -> EnvResult<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        Ok(from_env::<Env>()?)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Var {
    Token,
    ClientId,
    Login,
    Channel,
    CommandsPath,
    CacheDir,
    IrcUrl,
    HelixUrl,
    LogFormat,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

fn default_commands_path() -> String {
    DEFAULT_COMMANDS_PATH.to_string()
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_irc_url() -> String {
    IRC_WEBSOCKET_URL.to_string()
}

fn default_helix_url() -> String {
    API_HELIX_URL.to_string()
}

fn default_log_format() -> String {
    String::from("pretty")
}

pub fn from_env<T>() -> Result<T, EnvDeserializeError>
where
    T: serde::de::DeserializeOwned,
{
    from_iter(dotenvy::vars())
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: serde::de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    T::deserialize(MapDeserializer::<_, EnvDeserializeError>::new(
        iter.into_iter(),
    ))
}

impl serde::de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.to_uppercase())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}
