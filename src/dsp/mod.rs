//! Signal processing: mel filterbank, streaming feature extraction, and the
//! bounded frame history shared with display readers.

pub mod extractor;
pub mod mel;
pub mod ring;

pub use extractor::{ExtractorConfig, FeatureExtractor};
pub use mel::{MelConfig, MelFilterbank};
pub use ring::{FrameRing, FrameSnapshot};
