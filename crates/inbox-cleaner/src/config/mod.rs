pub mod settings;

pub use settings::{parse_bool, parse_database_url, LogFormat, Settings};
