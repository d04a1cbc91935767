use config::{Config, Environment, File};
use serde::Deserialize;

use crate::types::pagination::PageSettings;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub log_level: String,
    pub port: u16,
    pub database_host: String,
    pub database_port: u16,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,
    pub token_key: String,
    pub token_lifetime_hours: i64,
    pub media_root: String,
    pub media_url: String,
    pub public_url: String,
    pub page_size: i64,
    pub max_page_size: i64,
}

impl Settings {
    /// Reads `setup.toml` from the working directory, then `FOODGRAM_*`
    /// environment variables on top.
    pub fn load() -> Result<Self, handle_errors::Error> {
        Config::builder()
            .add_source(File::with_name("setup"))
            .add_source(Environment::with_prefix("FOODGRAM"))
            .build()
            .and_then(|config| config.try_deserialize::<Settings>())
            .map_err(|e| handle_errors::Error::Configuration(e.to_string()))
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database_username,
            self.database_password,
            self.database_host,
            self.database_port,
            self.database_name
        )
    }

    pub fn log_filter(&self) -> String {
        format!(
            "handle_errors={},foodgram={},warp={}",
            self.log_level, self.log_level, self.log_level
        )
    }

    pub fn page_settings(&self) -> PageSettings {
        PageSettings {
            public_url: self.public_url.trim_end_matches('/').to_string(),
            page_size: self.page_size.max(1),
            max_page_size: self.max_page_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            log_level: "debug".to_string(),
            port: 8080,
            database_host: "db".to_string(),
            database_port: 5432,
            database_name: "foodgram".to_string(),
            database_username: "chef".to_string(),
            database_password: "secret".to_string(),
            token_key: "0123456789abcdef0123456789abcdef".to_string(),
            token_lifetime_hours: 24,
            media_root: "media".to_string(),
            media_url: "http://localhost/media".to_string(),
            public_url: "http://localhost/".to_string(),
            page_size: 6,
            max_page_size: 0,
        }
    }

    #[test]
    fn builds_database_url() {
        assert_eq!(
            settings().database_url(),
            "postgres://chef:secret@db:5432/foodgram"
        );
    }

    #[test]
    fn page_settings_trim_url_and_clamp_sizes() {
        let pages = settings().page_settings();
        assert_eq!(pages.public_url, "http://localhost");
        assert_eq!(pages.page_size, 6);
        assert_eq!(pages.max_page_size, 1);
    }

    #[test]
    fn log_filter_covers_crates() {
        assert_eq!(
            settings().log_filter(),
            "handle_errors=debug,foodgram=debug,warp=debug"
        );
    }
}
