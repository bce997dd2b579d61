use std::fmt;

/// Names of the caches assetwatch maintains.
///
/// Used as the moka cache name, as the `cache` tag on metrics, and in the
/// diagnostic `cache/info` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheName {
    /// Asset-component listings, keyed by asset id.
    Components,
    /// The device list (single entry).
    Devices,
    /// Dashboard statistics (single entry).
    Stats,
}

impl AsRef<str> for CacheName {
    fn as_ref(&self) -> &str {
        match self {
            CacheName::Components => "components",
            CacheName::Devices => "devices",
            CacheName::Stats => "stats",
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}
