//! Client core for the drawing viewer: merges nested drawings, schedules
//! requests against the drawing endpoint and stages responses in shadow
//! sessions before they go live.

pub mod config;
pub mod error;
pub mod fold;
pub mod merge;
pub mod registry;
pub mod scheduler;
pub mod shadow;
pub mod store;
pub mod transform;
pub mod translator;
pub mod transport;
pub mod viewer;

pub use config::{base_url_for_target_ip, ViewerConfig};
pub use error::ViewerError;
pub use merge::merge_all;
pub use registry::{Drawing, DrawingMeta, Item, ItemKind, MergedCollections, Registry, TouchZone};
pub use scheduler::{RequestKind, RequestScheduler, SessionKind};
pub use shadow::ShadowCoordinator;
pub use store::{JsonFileStore, MemoryStateStore, StateStore, WindowDimensions};
pub use translator::{MenuTranslator, MissingMenuTranslator, PfodMenuTranslator};
pub use transport::{DrawingTransport, HttpTransport, MissingTransport};
pub use viewer::{Dispatch, LiveView, TouchRequest, Viewer, ViewerCommand, ViewerEvent};
