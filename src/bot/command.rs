use std::path::PathBuf;

use serde::Deserialize;

/// Built-in behaviours, kept apart from command names so renaming a command never breaks it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeAction {
    Commands,
    Shoutout,
    Volume,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Native(NativeAction),
    Video,
    Audio,
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub description: String,
    pub kind: CommandType,
    pub random: bool,
    pub path: Option<PathBuf>,
    pub message: String,
    pub protected: bool,
}

impl Command {
    pub fn native(name: &str, description: &str, action: NativeAction, protected: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: CommandType::Native(action),
            random: false,
            path: None,
            message: String::new(),
            protected,
        }
    }

    /// The command as invoked with trailing arguments; only `message` changes
    pub fn bind(&self, rest: &str) -> Self {
        Self {
            message: rest.to_string(),
            ..self.clone()
        }
    }

    /// A value copy under another name; later edits to `self` do not reach it
    pub fn alias(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Native,
    Video,
    Announce,
}

/// One entry of the user command list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandConfig {
    pub command: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ConfigType,
    #[serde(default)]
    pub random: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub protected: bool,
}

impl From<&CommandConfig> for Command {
    fn from(config: &CommandConfig) -> Self {
        let kind = match config.kind {
            ConfigType::Video => CommandType::Video,
            ConfigType::Announce => CommandType::Audio,
            // the registry resolves these against the built-in table before converting
            ConfigType::Native => CommandType::Blank,
        };

        Self {
            name: config.command.clone(),
            description: config.description.clone(),
            kind,
            random: config.random,
            path: config.path.as_ref().map(PathBuf::from),
            message: config.message.clone().unwrap_or_default(),
            protected: config.protected,
        }
    }
}
