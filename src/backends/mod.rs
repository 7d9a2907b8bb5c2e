//! Generation backend implementations

pub mod http;
pub mod mock;

pub use http::{GenerationParameters, HttpGenerationBackend};
pub use mock::MockGenerationBackend;
