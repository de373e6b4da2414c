#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod coords;
pub mod dump;
pub mod error;
pub mod events;
pub mod expand;
pub mod host;
pub mod layout;
pub mod model;
pub mod registry;
pub mod slots;
pub mod sync;

pub use config::EngineConfig;
pub use error::{FlowError, HostError, OpFailure};
pub use host::{InMemoryHost, RenderHost};
pub use model::{EdgeInput, FlowDocument, NodeInput, NodeKind, Point};
pub use sync::GraphStateSync;

#[cfg(feature = "cli")]
pub use cli::run;
