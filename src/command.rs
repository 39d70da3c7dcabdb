use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use crate::error::CommandError;

/// Permission predicates checked before a command runs, in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub user_required: bool,
    pub admin_required: bool,
    pub room_user_required: bool,
    pub room_admin_required: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            user_required: true,
            admin_required: false,
            room_user_required: false,
            room_admin_required: false,
        }
    }
}

/// Argument shape a handler accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterSpec {
    pub required: usize,
    pub optional: usize,
    /// Accept any number of trailing tokens as-is.
    pub variadic: bool,
}

/// A registered command. Never mutated once it sits in the registry.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    /// Identifier the owning plugin dispatches on.
    pub handler: String,
    /// Owning plugin; filled in by [`CommandRegistry::register`].
    pub plugin: String,
    pub doc: String,
    pub permissions: Permissions,
    pub params: ParameterSpec,
    pub reply_output: bool,
    pub stream_output: bool,
}

impl Command {
    pub fn new(name: &str, doc: &str) -> Self {
        let name = name.trim().replace('_', "-").to_lowercase();
        Self {
            handler: name.clone(),
            name,
            plugin: String::new(),
            doc: doc.trim().to_string(),
            permissions: Permissions::default(),
            params: ParameterSpec::default(),
            reply_output: true,
            stream_output: false,
        }
    }

    pub fn admin_required(mut self) -> Self {
        self.permissions.admin_required = true;
        self
    }

    pub fn required(mut self, count: usize) -> Self {
        self.params.required = count;
        self
    }

    pub fn optional(mut self, count: usize) -> Self {
        self.params.optional = count;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.params.variadic = true;
        self
    }

    pub fn stream_output(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    pub fn reply_output(mut self, reply: bool) -> Self {
        self.reply_output = reply;
        self
    }

    /// First line of the documentation, used in command listings.
    pub fn summary(&self) -> &str {
        self.doc.lines().next().unwrap_or("").trim()
    }
}

/// Duplicate registration; the existing command is kept.
#[derive(Debug, thiserror::Error)]
#[error("Command \"{name}\" from plugin \"{plugin}\" overlaps with existing command from plugin \"{existing}\"")]
pub struct DuplicateCommandError {
    pub name: String,
    pub plugin: String,
    pub existing: String,
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<Command>>,
    sorted: OnceLock<Vec<String>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: &str, mut command: Command) -> Result<(), DuplicateCommandError> {
        if let Some(existing) = self.commands.get(&command.name) {
            let err = DuplicateCommandError {
                name: command.name,
                plugin: plugin.to_string(),
                existing: existing.plugin.clone(),
            };
            log::error!("{}", err);
            return Err(err);
        }

        if command.doc.is_empty() {
            log::error!("Missing documentation for command \"{}\"", command.name);
        }

        command.plugin = plugin.to_string();
        log::debug!("Registered command \"{}\" from plugin \"{}\"", command.name, plugin);
        self.commands.insert(command.name.clone(), Arc::new(command));
        self.sorted.take();
        Ok(())
    }

    /// Remove every command owned by `plugin`. Returns how many were removed.
    pub fn unregister_module(&mut self, plugin: &str) -> usize {
        let before = self.commands.len();
        self.commands.retain(|_, c| c.plugin != plugin);
        let removed = before - self.commands.len();
        if removed > 0 {
            self.sorted.take();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.sorted.take();
    }

    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    /// Exact match first, then the first command (in sorted order) whose name
    /// starts with `token`.
    pub fn resolve(&self, token: &str) -> Option<Arc<Command>> {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return None;
        }
        if let Some(cmd) = self.commands.get(&token) {
            return Some(Arc::clone(cmd));
        }
        self.list_sorted()
            .iter()
            .find(|name| name.starts_with(&token))
            .and_then(|name| self.commands.get(name))
            .cloned()
    }

    pub fn list_sorted(&self) -> &[String] {
        self.sorted.get_or_init(|| {
            let mut names: Vec<String> = self.commands.keys().cloned().collect();
            names.sort();
            names
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Positional arguments handed to a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<String>);

impl Args {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|s| s.as_str())
    }

    pub fn require(&self, index: usize) -> Result<&str, CommandError> {
        self.get(index)
            .filter(|s| !s.is_empty())
            .ok_or(CommandError::MissingParameter)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl Deref for Args {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

/// Tokenize `raw` (shell rules, quotes group words) and shape the tokens to
/// `spec`.
pub fn parse_args(spec: &ParameterSpec, raw: &str) -> Result<Args, CommandError> {
    let mut tokens = shell_words::split(raw)
        .map_err(|_| CommandError::new("Could not parse command parameters"))?;

    let present = tokens.iter().filter(|t| !t.is_empty()).count();
    if present < spec.required {
        return Err(CommandError::MissingParameter);
    }

    let slots = spec.required + spec.optional;
    if !spec.variadic && tokens.len() > slots {
        if slots == 0 {
            tokens.clear();
        } else {
            let tail = tokens.split_off(slots - 1).join(" ");
            tokens.push(tail);
        }
    }

    Ok(Args(tokens))
}
