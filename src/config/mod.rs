// src/config/mod.rs
pub mod ai;
pub mod events;

pub use ai::{AiConfig, AiProviderKind};
pub use events::{EventsConfig, Origin};
