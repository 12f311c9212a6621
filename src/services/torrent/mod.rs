pub mod client;
pub mod engine;
pub mod service;

pub use client::TorrentServiceConfig;
pub use engine::{
    EngineError, EngineFile, EngineState, EngineStatus, InfoHash, ResolvedSource, TransferEngine,
};
pub use service::TorrentService;
