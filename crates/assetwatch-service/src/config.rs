use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the gateway.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: match env::var("STATSD_SERVER") {
                Ok(metrics_statsd) => Some(metrics_statsd),
                Err(_) => None,
            },
            prefix: "assetwatch".into(),
            hostname_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Freshness and eviction windows for one cache.
#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// How long an entry counts as fresh (served with no network traffic).
    #[serde(with = "humantime_serde")]
    pub stale_time: Duration,

    /// How long an entry is retained at all. Must be >= `stale_time`.
    ///
    /// Between `stale_time` and `gc_time` an entry is served stale while a
    /// background refresh runs.
    #[serde(with = "humantime_serde")]
    pub gc_time: Duration,

    /// Total size budget for this cache, in bytes.
    ///
    /// Entries are weighed by their approximate in-memory size, bookkeeping
    /// included; the least recently used entries are evicted once the budget
    /// is exceeded.
    pub capacity: u64,

    /// Maximum number of concurrently running background refreshes.
    pub max_lazy_refreshes: isize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(15 * 60),
            gc_time: Duration::from_secs(2 * 3600),
            capacity: 32 * 1024 * 1024,
            max_lazy_refreshes: 20,
        }
    }
}

/// Per-cache settings.
///
/// Component listings change rarely and are expensive to recompute upstream,
/// so they get the longest windows. Dashboard stats shift with every CVE feed
/// update and get the shortest.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfigs {
    pub components: CacheSettings,
    pub devices: CacheSettings,
    pub stats: CacheSettings,
}

impl Default for CacheConfigs {
    fn default() -> Self {
        Self {
            components: CacheSettings::default(),
            devices: CacheSettings {
                stale_time: Duration::from_secs(5 * 60),
                gc_time: Duration::from_secs(30 * 60),
                capacity: 1024 * 1024,
                max_lazy_refreshes: 4,
            },
            stats: CacheSettings {
                stale_time: Duration::from_secs(2 * 60),
                gc_time: Duration::from_secs(10 * 60),
                capacity: 1024 * 1024,
                max_lazy_refreshes: 4,
            },
        }
    }
}

/// The main service configuration, read from YAML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which directory to bind to.
    pub bind: String,

    /// Base URL of the upstream inventory/CPE backend.
    pub upstream: Url,

    /// If set, reports errors to this Sentry DSN.
    pub sentry_dsn: Option<Dsn>,

    /// Connect timeout for upstream requests.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Overall timeout for one upstream request.
    ///
    /// This also bounds how long a component can be stuck with
    /// `matching_in_progress` set.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub logging: Logging,
    pub metrics: Metrics,
    pub caches: CacheConfigs,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3021".to_owned(),
            upstream: "http://127.0.0.1:8000/"
                .parse()
                .expect("static url must parse"),
            sentry_dsn: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            logging: Logging::default(),
            metrics: Metrics::default(),
            caches: CacheConfigs::default(),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            )?,
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }

    /// Rejects configurations that would violate cache invariants.
    fn validate(&self) -> Result<()> {
        for (name, settings) in [
            ("components", &self.caches.components),
            ("devices", &self.caches.devices),
            ("stats", &self.caches.stats),
        ] {
            if settings.stale_time > settings.gc_time {
                anyhow::bail!(
                    "cache `{name}`: stale_time ({:?}) must not exceed gc_time ({:?})",
                    settings.stale_time,
                    settings.gc_time
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config() {
        // It should be possible to set individual caches in reasonable units
        // without affecting other caches' default values.
        let cfg = Config::get(None).unwrap();
        assert_eq!(
            cfg.caches.components.stale_time,
            Duration::from_secs(15 * 60)
        );

        let yaml = r#"
            caches:
              components:
                stale_time: 1h
                gc_time: 4h
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.caches.components.stale_time, Duration::from_secs(3600));
        assert_eq!(
            cfg.caches.components.gc_time,
            Duration::from_secs(4 * 3600)
        );
        // untouched defaults survive
        assert_eq!(
            cfg.caches.components.capacity,
            CacheSettings::default().capacity
        );
        assert_eq!(cfg.caches.devices, CacheConfigs::default().devices);
        assert_eq!(cfg.caches.stats, CacheConfigs::default().stats);
    }

    #[test]
    fn test_stale_time_must_not_exceed_gc_time() {
        let yaml = r#"
            caches:
              stats:
                stale_time: 1h
                gc_time: 10m
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_upstream_and_timeouts() {
        let yaml = r#"
            upstream: "http://inventory.internal:8000/"
            request_timeout: 45s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.upstream.as_str(), "http://inventory.internal:8000/");
        assert_eq!(cfg.request_timeout, Duration::from_secs(45));
        assert_eq!(cfg.connect_timeout, Config::default().connect_timeout);
    }

    #[test]
    fn test_unknown_fields() {
        // Unknown fields should not cause failure
        let yaml = r#"
            caches:
              not_a_cache:
                stale_time: 1h
        "#;
        let cfg = Config::from_reader(yaml.as_bytes());
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_empty_file() {
        // Empty files aren't supported
        let yaml = r#""#;
        let result = Config::from_reader(yaml.as_bytes());
        assert!(result.is_err());
    }
}
