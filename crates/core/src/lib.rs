pub mod auth;
pub mod config;
pub mod export;
pub mod metrics;
pub mod retry;
pub mod testing;

pub use auth::{
    create_token_provider, AuthError, CachedTokenProvider, ClientCredentialsProvider, Credential,
    TokenCache, TokenProvider,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use export::{
    ExportApi, ExportArtifact, ExportError, ExportFormat, ExportOrchestrator, ExportRequest,
    ExportStatus, PollSettings, PowerBiClient,
};
pub use retry::RetryConfig;
