use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("menu node at {path} has an empty id")]
    EmptyId { path: String },

    #[error("duplicate menu id '{id}' under {parent}")]
    DuplicateId { id: String, parent: String },

    #[error("menu '{id}' references unknown tool '{tool}'")]
    UnknownTool { id: String, tool: String },

    #[error("menu '{id}' uses unknown widget '{widget}'")]
    UnknownWidget { id: String, widget: String },

    #[error("menu '{id}' is a submenu without children")]
    EmptySubmenu { id: String },

    #[error("menu '{id}' declares kind '{declared}' but its fields describe a {derived}")]
    KindMismatch {
        id: String,
        declared: String,
        derived: &'static str,
    },

    #[error("command template for '{id}' is empty")]
    EmptyTemplate { id: String },

    #[error("command template for '{id}' has no parameter placeholder: {template}")]
    MissingPlaceholder { id: String, template: String },

    #[error("command template for '{id}' cannot be split into arguments: {template}")]
    UnbalancedQuotes { id: String, template: String },

    #[error("command template for '{id}' has a malformed placeholder in '{token}'")]
    MalformedPlaceholder { id: String, token: String },

    #[error("tools.{tool}.{command} must be a string template")]
    InvalidToolEntry { tool: String, command: String },

    #[error("invalid configuration: {0}")]
    Schema(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result '{0}' not found")]
    NotFound(String),

    #[error("job {0} has not reached a terminal status")]
    NotTerminal(u64),

    #[error("writing {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("key path '{0}' is empty")]
    EmptyPath(String),

    #[error("'{segment}' in '{path}' is not a mapping")]
    NotAMapping { path: String, segment: String },

    #[error("parsing {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("serializing settings: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("saving {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("refusing to start an empty command")]
    EmptyCommand,
}
