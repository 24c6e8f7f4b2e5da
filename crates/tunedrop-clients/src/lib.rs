//! Adaptadores HTTP para los colaboradores del pipeline.

mod error;
mod netease;
mod openai;

pub use error::ClientError;
pub use netease::NeteaseClient;
pub use openai::OpenAiClient;
