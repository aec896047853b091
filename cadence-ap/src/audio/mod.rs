//! Audio subsystem: decoding, source resolution, and the output graph

pub mod decoder;
pub mod graph;
pub mod headless;
pub mod mixer;
pub mod output;
pub mod resampler;
pub mod resolver;
pub mod source;
pub mod types;

pub use graph::{ChannelEnded, EndSignal, OutputBackend, OutputPath};
pub use headless::{HeadlessBackend, HeadlessProbe};
pub use mixer::{EffectChain, Mixer};
pub use output::{AudioOutput, CpalBackend};
pub use resolver::{MemoryBackend, SourceBackend, SourceResolver, StreamingBackend, TrackResolver};
pub use source::{AudioSource, FrameReader};
pub use types::{ChannelId, PcmBuffer};
