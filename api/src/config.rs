use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STORE_ADDRESS: &str = "mem://localhost/versions_track";

/// Settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_address: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", DEFAULT_PORT),
            store_address: try_load("STORE_ADDRESS", DEFAULT_STORE_ADDRESS.to_string()),
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => {
                info!("Using {key}={value} from environment.");
                value
            }
            Err(e) => {
                warn!("Invalid {key} value '{raw}': {e}. Using default {default}.");
                default
            }
        },
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
