//! Núcleo de tunedrop: detecta audio nuevo, lo identifica, completa sus
//! etiquetas y lo coloca en la biblioteca.

pub mod config;
pub mod error;
pub mod extensions;
pub mod keyword;
pub mod metadata;
pub mod pipeline;
pub mod placement;
pub mod stability;
pub mod traits;
pub mod watcher;

pub use config::{IngestConfig, PlacementMode};
pub use error::{AbortReason, CodecError, ConfigError, IngestError, PlacementError, Stage, StabilityError, WatchError};
pub use extensions::SupportedExtension;
pub use keyword::KeywordResolver;
pub use metadata::{CodecRegistry, CoverArt, LoftyCodec, TagCodec, TrackMetadata, TrackMetadataBuilder, WriteOutcome};
pub use pipeline::{IngestPipeline, PipelineState};
pub use placement::{PlacementTemplate, Placer};
pub use stability::{FsSampler, Sampler, StabilityDetector, StabilitySample, StabilityTracker, Verdict};
pub use traits::{CatalogClient, InferenceClient};
pub use watcher::{DirectoryWatcher, WatchHandle};
