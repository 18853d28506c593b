use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub realtime_connect_timeout_secs: u64,
    pub realtime_max_subscribers_per_room: usize,
    pub realtime_reconnect_max_attempts: u32,
    pub realtime_reconnect_backoff_ms: u64,
    pub port: u16,
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
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            realtime_connect_timeout_secs: parse_var("REALTIME_CONNECT_TIMEOUT_SECS", 10),
            realtime_max_subscribers_per_room: parse_var("REALTIME_MAX_SUBSCRIBERS_PER_ROOM", 16),
            realtime_reconnect_max_attempts: parse_var("REALTIME_RECONNECT_MAX_ATTEMPTS", 5),
            realtime_reconnect_backoff_ms: parse_var("REALTIME_RECONNECT_BACKOFF_MS", 500),
            port: parse_var("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime_connect_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.realtime_reconnect_backoff_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            realtime_connect_timeout_secs: 10,
            realtime_max_subscribers_per_room: 16,
            realtime_reconnect_max_attempts: 5,
            realtime_reconnect_backoff_ms: 500,
            port: 3000,
        }
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
