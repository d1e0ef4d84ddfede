use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

/// Endpoint and access key of the hosted backend. Both are required; without
/// them every remote operation is a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub key: String,
}

impl RemoteConfig {
    /// `None` (remote disabled) unless both values are present and non-blank.
    pub fn resolve(url: Option<String>, key: Option<String>) -> Option<Self> {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
        let key = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())?;
        let url = if url.starts_with("http") {
            url
        } else {
            format!("https://{url}")
        };
        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            key,
        })
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Give up on a push after this long.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub channel_topic: String,
    /// Re-pull period while the realtime channel is unavailable.
    pub fallback_poll_interval: Duration,
    pub join_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
    /// How long a CLI command waits for queued pushes before exiting.
    pub exit_flush_limit: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            channel_topic: crate::metadata::CHANNEL_TOPIC.to_string(),
            fallback_poll_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
            retry: RetryPolicy::default(),
            exit_flush_limit: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_config_needs_both_values() {
        assert_eq!(RemoteConfig::resolve(None, Some("key".into())), None);
        assert_eq!(RemoteConfig::resolve(Some("https://x.supabase.co".into()), None), None);
        assert_eq!(
            RemoteConfig::resolve(Some("  ".into()), Some("key".into())),
            None
        );
    }

    #[test]
    fn defaults_come_from_package_metadata() {
        let settings = SyncSettings::default();
        assert_eq!(settings.channel_topic, "realtime:bricktrack");
        assert_eq!(settings.exit_flush_limit, Duration::from_secs(5));
        assert_eq!(crate::metadata::DATA_DIR_NAME, ".bricktrack");
        assert_eq!(crate::metadata::PKG_NAME, "bricktrack");
    }

    #[test]
    fn remote_config_normalises_the_endpoint() {
        let config =
            RemoteConfig::resolve(Some("abc.supabase.co/".into()), Some(" anon ".into())).unwrap();
        assert_eq!(config.url, "https://abc.supabase.co");
        assert_eq!(config.key, "anon");
    }
}
