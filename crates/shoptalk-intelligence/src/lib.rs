pub mod anthropic;
pub mod config;
pub mod gateway;
pub mod openai;
pub mod provider;

pub use gateway::{FALLBACK_REPLY, IntelligenceGateway};
