pub mod codec;
pub mod covers;
pub mod lofty;
pub mod merge;
pub mod model;

pub use codec::{CodecRegistry, TagCodec, WriteOutcome};
pub use covers::{CoverError, CoverRef, parse_cover_ref, sniff_mime};
pub use self::lofty::LoftyCodec;
pub use merge::merge;
pub use model::{CoverArt, TrackMetadata, TrackMetadataBuilder};
