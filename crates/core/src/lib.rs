pub mod config;
pub mod domain;
pub mod errors;
pub mod secrets;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::category::{Category, ClassificationResult};
pub use domain::message::{Message, ToolCall, ToolResult};
pub use domain::state::ConversationState;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use secrets::{
    require_secret, CachedSecretStore, EnvSecretStore, JsonFileSecretStore, SecretError,
    SecretStore,
};
