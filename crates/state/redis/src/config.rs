use std::time::Duration;

/// Configuration for the Redis store adapter backend.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Use `rediss://` scheme for TLS connections. When `tls_enabled` is set,
    /// the URL scheme is automatically upgraded to `rediss://`.
    pub url: String,

    /// Password for Redis `AUTH`, if the deployment requires one. Embedded
    /// into the connection URL's userinfo by [`Self::effective_url`] rather
    /// than passed to the client separately, matching how `redis-rs` expects
    /// credentials on a `ConnectionInfo`.
    pub password: Option<String>,

    /// Key prefix applied to every Redis key to avoid collisions.
    pub prefix: String,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection.
    pub connection_timeout: Duration,

    /// Whether TLS is enabled. When `true`, a `redis://` URL is automatically
    /// upgraded to `rediss://`.
    pub tls_enabled: bool,

    /// Accept invalid certificates (dev/test only). Only applies when using
    /// `rediss://` connections.
    pub tls_insecure: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            password: None,
            prefix: String::from("gatekeep"),
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
            tls_enabled: false,
            tls_insecure: false,
        }
    }
}

impl RedisConfig {
    /// Return the effective connection URL: upgraded to `rediss://` when TLS
    /// is enabled, and with `password` embedded as userinfo when set.
    #[must_use]
    pub fn effective_url(&self) -> String {
        let url = if self.tls_enabled && self.url.starts_with("redis://") {
            self.url.replacen("redis://", "rediss://", 1)
        } else {
            self.url.clone()
        };

        match &self.password {
            Some(password) if !password.is_empty() => {
                let scheme_end = url.find("://").map_or(0, |i| i + 3);
                let (scheme, rest) = url.split_at(scheme_end);
                format!("{scheme}:{}@{rest}", urlencoding_minimal(password))
            }
            _ => url,
        }
    }
}

/// Percent-encode the handful of characters that would otherwise break the
/// `scheme://:password@host` URL grammar if present in a Redis password.
/// Not a general-purpose URL encoder — just enough for userinfo.
fn urlencoding_minimal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b':' | b'@' | b'/' | b'%' => out.push_str(&format!("%{byte:02X}")),
            _ => out.push(byte as char),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.prefix, "gatekeep");
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn tls_upgrades_scheme() {
        let cfg = RedisConfig {
            tls_enabled: true,
            ..RedisConfig::default()
        };
        assert_eq!(cfg.effective_url(), "rediss://127.0.0.1:6379");
    }

    #[test]
    fn password_is_embedded_as_userinfo() {
        let cfg = RedisConfig {
            password: Some("s3cret".to_owned()),
            ..RedisConfig::default()
        };
        assert_eq!(cfg.effective_url(), "redis://:s3cret@127.0.0.1:6379");
    }

    #[test]
    fn password_special_characters_are_escaped() {
        let cfg = RedisConfig {
            password: Some("a:b@c".to_owned()),
            ..RedisConfig::default()
        };
        assert_eq!(cfg.effective_url(), "redis://:a%3Ab%40c@127.0.0.1:6379");
    }

    #[test]
    fn empty_password_is_not_embedded() {
        let cfg = RedisConfig {
            password: Some(String::new()),
            ..RedisConfig::default()
        };
        assert_eq!(cfg.effective_url(), "redis://127.0.0.1:6379");
    }
}
