//! Configuration, paths, errors and logging setup for the summarizer client.

mod config;
mod error;
mod logging;
mod paths;
mod timings;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_ANON_KEY,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use timings::AuthTimings;
