//! Environment-variable configuration (§6, §10.C), loaded via `clap`'s
//! derive API so the same binary also accepts equivalent CLI flags for
//! local development — `env` is consulted first, so this is an ergonomic
//! override, not a contradiction of "environment, canonical names".

use clap::Parser;
use secrecy::SecretString;

/// Top-level Gatekeep server configuration.
#[derive(Parser, Debug)]
#[command(name = "gatekeep-server", about = "Admission-control queue service")]
pub struct GatekeepConfig {
    /// HTTP port the admission API listens on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Port the Prometheus `/metrics` and `/health` endpoints listen on.
    ///
    /// Must differ from `PORT`; startup refuses to run otherwise.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Backend to use for the store adapter: `memory` or `redis`.
    #[arg(long, env = "STORE_BACKEND", default_value = "redis")]
    pub store_backend: String,

    /// Redis connection address, e.g. `redis://127.0.0.1:6379`.
    #[arg(long, env = "REDIS_ADDR")]
    pub redis_addr: Option<String>,

    /// Redis password, if the deployment requires one.
    #[arg(long, env = "REDIS_PASSWORD", value_parser = parse_secret)]
    pub redis_password: Option<SecretString>,

    /// HMAC signing secret for admission tokens. Must be at least 32 bytes.
    #[arg(long, env = "TOKEN_SECRET", value_parser = parse_secret)]
    pub token_secret: SecretString,

    /// Admin API key, checked in constant time against `X-API-Key` /
    /// `Authorization: Bearer` on `/admin/*` routes.
    #[arg(long, env = "ADMIN_API_KEY", value_parser = parse_secret)]
    pub admin_api_key: SecretString,

    /// Minimum log level: `debug`, `info`, `warn`, or `error`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Optional HMAC secret used to sign outbound admission webhooks.
    #[arg(long, env = "WEBHOOK_HMAC_SECRET")]
    pub webhook_hmac_secret: Option<String>,
}

/// `clap` has no blanket `FromStr` for `secrecy::SecretString`; wrap the raw
/// argument without validation here and defer length checks to `validate()`.
fn parse_secret(raw: &str) -> Result<SecretString, std::convert::Infallible> {
    Ok(SecretString::from(raw.to_owned()))
}

/// Minimum acceptable length, in bytes, for `TOKEN_SECRET` (§4.B Key constraints).
const MIN_TOKEN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TOKEN_SECRET must be at least {MIN_TOKEN_SECRET_LEN} bytes")]
    SecretTooShort,

    #[error("METRICS_PORT ({metrics_port}) must differ from PORT ({port})")]
    PortCollision { port: u16, metrics_port: u16 },

    #[error("REDIS_ADDR is required when STORE_BACKEND=redis")]
    MissingRedisAddr,
}

impl GatekeepConfig {
    /// Validate startup invariants (§10.C): secret length and port collision.
    /// Refuses to start with a descriptive error rather than failing later
    /// on first request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.token_secret.expose_secret().len() < MIN_TOKEN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort);
        }
        if self.port == self.metrics_port {
            return Err(ConfigError::PortCollision {
                port: self.port,
                metrics_port: self.metrics_port,
            });
        }
        if self.store_backend == "redis" && self.redis_addr.is_none() {
            return Err(ConfigError::MissingRedisAddr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GatekeepConfig {
        GatekeepConfig {
            port: 8080,
            metrics_port: 9090,
            store_backend: "memory".to_owned(),
            redis_addr: None,
            redis_password: None,
            token_secret: SecretString::from("a-long-enough-test-secret-value".to_owned()),
            admin_api_key: SecretString::from("admin-key".to_owned()),
            log_level: "info".to_owned(),
            webhook_hmac_secret: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_short_secret() {
        let mut cfg = base_config();
        cfg.token_secret = SecretString::from("short".to_owned());
        assert!(matches!(cfg.validate(), Err(ConfigError::SecretTooShort)));
    }

    #[test]
    fn rejects_port_collision() {
        let mut cfg = base_config();
        cfg.metrics_port = cfg.port;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PortCollision { .. })
        ));
    }

    #[test]
    fn rejects_redis_backend_without_addr() {
        let mut cfg = base_config();
        cfg.store_backend = "redis".to_owned();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingRedisAddr)));
    }
}
