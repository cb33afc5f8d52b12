mod settings;

pub use settings::{
    BackendConfig, ConnectionConfig, LoggingConfig, SessionConfig, Settings, SpeechConfig,
};
