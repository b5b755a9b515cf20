use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::bot::command::{Command, CommandConfig, CommandType, ConfigType, NativeAction};

pub type RegistryResult<T> = core::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unable to read command list '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed command list: {0}")]
    Format(#[from] serde_json::Error),
}

/// Built-ins registered ahead of any user command: (name, description, action, protected)
const NATIVES: [(&str, &str, NativeAction, bool); 4] = [
    ("commands", "List the available commands", NativeAction::Commands, false),
    ("so", "Shout out another streamer", NativeAction::Shoutout, true),
    ("volume", "Fade the player volume: !volume <0-100> [seconds]", NativeAction::Volume, true),
    ("panic", "Simulate a fatal failure", NativeAction::Panic, true),
];

/// Name → command map; first registration of a name wins
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn with_natives() -> Self {
        let mut registry = Self::default();
        for (name, description, action, protected) in NATIVES {
            registry.insert(Command::native(name, description, action, protected));
        }

        registry
    }

    /// Builds the full registry from the command list on disk; any failure here is fatal
    #[instrument]
    pub fn load(path: &str) -> RegistryResult<Self> {
        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| RegistryError::Io {
            path: path.to_string(),
            source,
        })?;

        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> RegistryResult<Self> {
        let configs: Vec<CommandConfig> = serde_json::from_str(raw)?;

        let mut registry = Self::with_natives();
        let added = registry.merge(&configs);

        info!(added, total = registry.len(), "command registry loaded");
        Ok(registry)
    }

    /// Adds user commands and their aliases, skipping every name already taken
    ///
    /// A `native` entry adds nothing of its own; it names a built-in to hang aliases on.
    pub fn merge(&mut self, configs: &[CommandConfig]) -> usize {
        let mut added = 0;

        for config in configs {
            if config.kind == ConfigType::Native {
                added += self.alias_native(config);
                continue;
            }

            let command = Command::from(config);
            if !self.insert(command.clone()) {
                continue;
            }
            added += 1;

            for alias in &config.aliases {
                if self.insert(command.alias(alias)) {
                    added += 1;
                }
            }
        }

        added
    }

    fn alias_native(&mut self, config: &CommandConfig) -> usize {
        let native = match self.commands.get(&config.command) {
            Some(command) if matches!(command.kind, CommandType::Native(_)) => command.clone(),
            _ => {
                warn!(name = %config.command, "no built-in command by that name, skipping");
                return 0;
            }
        };

        config
            .aliases
            .iter()
            .filter(|alias| self.insert(native.alias(alias)))
            .count()
    }

    fn insert(&mut self, command: Command) -> bool {
        if self.commands.contains_key(&command.name) {
            warn!(name = %command.name, "command name already registered, skipping");
            return false;
        }

        debug!(name = %command.name, kind = ?command.kind, "registered command");
        self.order.push(command.name.clone());
        self.commands.insert(command.name.clone(), command);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Names in registration order, optionally leaving out protected commands
    pub fn names(&self, include_protected: bool) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|name| self.commands.get(name))
            .filter(|command| include_protected || !command.protected)
            .map(|command| command.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const COMMANDS: &str = r#"[
        { "command": "foo", "description": "foo video", "type": "video", "path": "videos/foo.mp4", "message": "foo!", "aliases": ["bar", "so"] },
        { "command": "so", "description": "shadowed", "type": "announce", "path": "audio/so.mp3" },
        { "command": "foo", "description": "duplicate", "type": "announce" },
        { "command": "secret", "type": "announce", "path": "audio/secret.mp3", "protected": true }
    ]"#;

    #[test]
    fn test_natives_win_collisions() {
        let registry = CommandRegistry::from_json(COMMANDS).unwrap();

        let so = registry.get("so").unwrap();
        assert_eq!(so.kind, CommandType::Native(NativeAction::Shoutout));
        assert_eq!(registry.get("foo").unwrap().description, "foo video");
    }

    #[test]
    fn test_alias_is_value_copy() {
        let registry = CommandRegistry::from_json(COMMANDS).unwrap();

        let foo = registry.get("foo").unwrap();
        let bar = registry.get("bar").unwrap();
        assert_eq!(bar.name, "bar");
        assert_eq!(bar.kind, foo.kind);
        assert_eq!(bar.path, foo.path);
        assert_eq!(bar.message, foo.message);

        let mut edited = registry.clone();
        if let Some(foo) = edited.commands.get_mut("foo") {
            foo.message = String::from("changed");
        }
        assert_eq!(edited.get("bar").unwrap().message, "foo!");
    }

    #[test]
    fn test_names_in_registration_order() {
        let registry = CommandRegistry::from_json(COMMANDS).unwrap();

        assert_eq!(registry.names(false), vec!["commands", "foo", "bar"]);
        assert_eq!(
            registry.names(true),
            vec!["commands", "so", "volume", "panic", "foo", "bar", "secret"]
        );
    }

    #[test]
    fn test_native_entries_alias_builtins() {
        let registry = CommandRegistry::from_json(
            r#"[
                { "command": "so", "type": "native", "aliases": ["shoutout", "commands"] },
                { "command": "dance", "type": "native", "aliases": ["boogie"] }
            ]"#,
        )
        .unwrap();

        let so = registry.get("so").unwrap();
        let shoutout = registry.get("shoutout").unwrap();
        assert_eq!(shoutout.kind, CommandType::Native(NativeAction::Shoutout));
        assert_eq!(shoutout.protected, so.protected);
        assert_eq!(shoutout.description, so.description);

        // built-in `commands` keeps its own behaviour
        assert_eq!(
            registry.get("commands").unwrap().kind,
            CommandType::Native(NativeAction::Commands)
        );
        assert!(registry.get("dance").is_none());
        assert!(registry.get("boogie").is_none());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_load_failures_are_errors() {
        assert!(matches!(
            CommandRegistry::load("/definitely/not/here.json"),
            Err(RegistryError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{ "command": "x", "type": "gif" }}]"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(
            CommandRegistry::load(&path),
            Err(RegistryError::Format(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(COMMANDS.as_bytes()).unwrap();

        let registry = CommandRegistry::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(registry.len(), 7);
    }
}
