pub mod adapter;
pub mod config;
pub mod conversion;
pub mod enrich;
pub mod events;
pub mod fallback;
pub mod format;
pub mod metrics;
pub mod orchestrator;
pub mod scratch;
pub mod testing;
pub mod usage;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    UsageMethod,
};
pub use conversion::{
    ConversionError, ConversionOptions, ConversionRequest, ConversionResult, Converter, ErrorKind,
};
pub use enrich::{default_enrichers, Enricher};
pub use events::{
    create_event_system, ConversionEvent, EventFilter, EventHandle, EventRecord, EventStore,
    SqliteEventStore,
};
pub use fallback::{FallbackConverter, RemoteConverter};
pub use format::{capable_adapter, AdapterId, FormatTag, Route};
pub use orchestrator::Orchestrator;
pub use usage::{create_usage_gate, DailyQuotaGate, UnlimitedGate, UsageGate};
