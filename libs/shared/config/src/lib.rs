use std::env;
use tracing::warn;

pub const DEFAULT_FLEET_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLEET_PROGRESS_THRESHOLD: usize = 500;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub redis_url: Option<String>,
    /// Cities whose therapists are eligible anywhere in their state.
    pub hub_cities: Vec<String>,
    pub fleet_batch_size: usize,
    pub fleet_progress_threshold: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            hub_cities: env::var("HUB_CITIES")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|city| !city.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            fleet_batch_size: parse_env_usize("FLEET_BATCH_SIZE", DEFAULT_FLEET_BATCH_SIZE),
            fleet_progress_threshold: parse_env_usize(
                "FLEET_PROGRESS_THRESHOLD",
                DEFAULT_FLEET_PROGRESS_THRESHOLD,
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_cache_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_env_usize(name: &str, default: usize) -> usize {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid number, using default {}", name, default);
            default
        }),
        Err(_) => default,
    }
}
