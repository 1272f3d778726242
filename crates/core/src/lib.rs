pub mod acquirer;
pub mod archive;
pub mod config;
pub mod converter;
pub mod fetcher;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod source;
pub mod testing;

pub use acquirer::{AcquireError, AcquireProgress, AcquisitionReport, SetAcquirer};
pub use archive::{ArchiveError, ArchiveManifest, ArchiveSplitter, SplitError, DEFAULT_SIZE_LIMIT};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use converter::{
    CommandRunner, ConverterConfig, ConverterError, GifTranscoder, TranscodeOrchestrator,
    TranscodeOutcome, TranscodeReport,
};
pub use fetcher::{FetchOutcome, UnitFetcher};
pub use pipeline::{
    PipelineError, PipelineProgress, PipelineReport, PipelineRequest, PipelineSettings,
    StickerPipeline,
};
pub use pool::{PoolError, UnitResult, WorkPool};
pub use session::{
    InMemorySessionStore, SessionEvent, SessionState, SessionStore, SessionTransition,
};
pub use source::{
    is_set_link, parse_set_name, CollectionDescriptor, FormatTag, MediaItem, SourceError,
    StickerSource, TelegramConfig, TelegramSource,
};
