mod endpoint;
mod gemini;
mod wire;

pub use endpoint::{DEFAULT_BASE_URL, DEFAULT_MODEL, generate_url};
pub use gemini::{GeminiModel, api_key_from_env};
