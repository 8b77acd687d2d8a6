pub mod config;
pub mod edit;
pub mod engine;
pub mod error;
pub mod event;
pub mod progress;
pub mod stream;

pub use config::EngineConfig;
pub use edit::{EditKind, EditRecord, EditStore, KindFilter};
pub use engine::{
    selection_len, CommitOutcome, CommitReport, CommitState, CommitStrategy, Engine, FindMatches,
    ReadOnlyFallback,
};
pub use error::{EngineError, Result};
pub use event::{EngineEvent, LongProcess};
pub use progress::{CancelToken, Outcome};
pub use stream::{Capabilities, FileSource, MappedSource, MemorySource, StreamSource};
