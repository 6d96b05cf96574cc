//! avtrack-core: Audio track extraction from video files

pub mod config;
pub mod converter;
pub mod enhancer;
pub mod error;
pub mod extractor;
pub mod naming;
pub mod probe;
pub mod session;
pub mod temp;

pub use config::Config;
pub use converter::OutputFormat;
pub use error::{AvTrackError, Result, Stage};
pub use probe::AudioStreamDescriptor;
pub use session::{Delivered, Session, SessionConfig, SessionEvent, SessionState, ToolPaths};
