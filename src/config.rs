use std::env;
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;

use crate::services::datetime::{HourOverflow, WeekdayRollover};

#[derive(Clone, Debug)]
pub enum StoreConfig {
    Sqlite { path: String },
    Supabase { url: String, service_key: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreConfig,
    pub timezone: Tz,
    pub llm_fallback: bool,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub llm_actions: bool,
    pub completion_timeout: Duration,
    pub history_limit: usize,
    pub weekday_rollover: WeekdayRollover,
    pub hour_overflow: HourOverflow,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source. Missing store settings are
    /// fatal; everything else has a default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store = match var("STORE_BACKEND").as_deref().unwrap_or("sqlite") {
            "sqlite" => StoreConfig::Sqlite {
                path: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            },
            "supabase" => StoreConfig::Supabase {
                url: var("SUPABASE_URL").context("SUPABASE_URL must be set")?,
                service_key: var("SUPABASE_SERVICE_ROLE_KEY")
                    .context("SUPABASE_SERVICE_ROLE_KEY must be set")?,
            },
            other => anyhow::bail!("unknown STORE_BACKEND: {other}"),
        };

        let timezone: Tz = match var("TIMEZONE") {
            Some(name) => name
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid TIMEZONE {name:?}: {e}"))?,
            None => chrono_tz::America::Sao_Paulo,
        };

        let llm_fallback = parse_flag(var("LLM_FALLBACK").as_deref());
        let openai_api_key = var("OPENAI_API_KEY").unwrap_or_default();
        anyhow::ensure!(
            !llm_fallback || !openai_api_key.is_empty(),
            "OPENAI_API_KEY must be set when LLM_FALLBACK is enabled"
        );

        let weekday_rollover = match var("WEEKDAY_ROLLOVER").as_deref() {
            None | Some("next_week") => WeekdayRollover::NextWeek,
            Some("same_day") => WeekdayRollover::SameDay,
            Some(other) => anyhow::bail!("invalid WEEKDAY_ROLLOVER: {other}"),
        };
        let hour_overflow = match var("HOUR_OVERFLOW").as_deref() {
            None | Some("wrap") => HourOverflow::Wrap,
            Some("reject") => HourOverflow::Reject,
            Some(other) => anyhow::bail!("invalid HOUR_OVERFLOW: {other}"),
        };

        Ok(Self {
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000),
            store,
            timezone,
            llm_fallback,
            openai_api_key,
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            llm_actions: parse_flag(var("LLM_ACTIONS").as_deref()),
            completion_timeout: Duration::from_secs(
                var("COMPLETION_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
            history_limit: var("HISTORY_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            weekday_rollover,
            hour_overflow,
        })
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "secretary.db")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.timezone, chrono_tz::America::Sao_Paulo);
        assert!(!config.llm_fallback);
        assert!(!config.llm_actions);
        assert_eq!(config.completion_timeout, Duration::from_secs(15));
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.weekday_rollover, WeekdayRollover::NextWeek);
        assert_eq!(config.hour_overflow, HourOverflow::Wrap);
        assert!(matches!(config.store, StoreConfig::Sqlite { ref path } if path == "secretary.db"));
    }

    #[test]
    fn test_missing_store_url_is_fatal() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = config_from(&[("STORE_BACKEND", "supabase"), ("SUPABASE_URL", "http://x")])
            .unwrap_err();
        assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));
    }

    #[test]
    fn test_supabase_backend() {
        let config = config_from(&[
            ("STORE_BACKEND", "supabase"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
        ])
        .unwrap();
        assert!(matches!(config.store, StoreConfig::Supabase { .. }));
    }

    #[test]
    fn test_fallback_requires_api_key() {
        let err = config_from(&[("DATABASE_URL", ":memory:"), ("LLM_FALLBACK", "true")])
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let config = config_from(&[
            ("DATABASE_URL", ":memory:"),
            ("LLM_FALLBACK", "1"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert!(config.llm_fallback);
    }

    #[test]
    fn test_timezone_and_policies() {
        let config = config_from(&[
            ("DATABASE_URL", ":memory:"),
            ("TIMEZONE", "Europe/Lisbon"),
            ("WEEKDAY_ROLLOVER", "same_day"),
            ("HOUR_OVERFLOW", "reject"),
        ])
        .unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Lisbon);
        assert_eq!(config.weekday_rollover, WeekdayRollover::SameDay);
        assert_eq!(config.hour_overflow, HourOverflow::Reject);

        assert!(config_from(&[("DATABASE_URL", ":memory:"), ("TIMEZONE", "Mars/Olympus")]).is_err());
    }
}
