use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SchoolConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageBackend,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub admin: AdminConfig,
    pub security: SecurityConfig,
    pub password_hashing: PasswordHashConfig,
    pub federated: Option<FederatedConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Which authentication strategy serves this process. Chosen once at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategyKind {
    Dev,
    Custom,
    Federated,
}

impl AuthStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategyKind::Dev => "dev",
            AuthStrategyKind::Custom => "custom",
            AuthStrategyKind::Federated => "federated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub strategy: AuthStrategyKind,
    /// Organization the dev accounts belong to.
    pub dev_organization_id: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: Secret<String>,
    pub cookie_name: String,
    pub ttl_hours: i64,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub email: Option<String>,
    pub password: Option<Secret<String>>,
    pub password_hash: Option<String>,
    pub organization_id: i64,
    pub allow_setup: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Exact origins (scheme://host[:port]) accepted as CORS origins and redirect targets.
    pub allowed_origins: Vec<String>,
    /// Bare hostnames of this deployment accepted as redirect targets.
    pub deployment_hosts: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct FederatedConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub default_organization_id: Option<i64>,
}

impl SchoolConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(common, &vars)
    }

    /// Build from an explicit variable map. Used by `from_env` and by tests.
    pub fn from_vars(
        common: core_config::Config,
        vars: &HashMap<String, String>,
    ) -> Result<Self, AppError> {
        let env = Vars(vars);

        let environment: Environment = env.parse("ENVIRONMENT", "dev")?;
        let is_prod = environment == Environment::Prod;

        let strategy: AuthStrategyKind = env.parse("AUTH_STRATEGY", "dev")?;
        let default_storage = if is_prod { "postgres" } else { "memory" };
        let storage: StorageBackend = env.parse("STORAGE_BACKEND", default_storage)?;

        let database = match storage {
            StorageBackend::Memory => None,
            StorageBackend::Postgres => Some(DatabaseConfig {
                url: env.require("DATABASE_URL")?,
                max_connections: env.parse("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: env.parse("DATABASE_MIN_CONNECTIONS", "1")?,
            }),
        };

        let secret = match env.optional("SESSION_SECRET") {
            Some(secret) => Secret::new(secret),
            None if strategy == AuthStrategyKind::Dev && !is_prod => {
                tracing::warn!("SESSION_SECRET not set; using an ephemeral secret for dev");
                Secret::new(random_secret())
            }
            None => {
                return Err(config_error(format!(
                    "SESSION_SECRET is required for the {} auth strategy",
                    strategy.as_str()
                )))
            }
        };

        let federated = if strategy == AuthStrategyKind::Federated {
            Some(FederatedConfig {
                issuer: env.require("FEDERATED_ISSUER")?,
                client_id: env.require("FEDERATED_CLIENT_ID")?,
                client_secret: Secret::new(env.require("FEDERATED_CLIENT_SECRET")?),
                authorize_url: env.require("FEDERATED_AUTHORIZE_URL")?,
                token_url: env.require("FEDERATED_TOKEN_URL")?,
                redirect_uri: env.require("FEDERATED_REDIRECT_URI")?,
                default_organization_id: env.parse_optional("FEDERATED_DEFAULT_ORGANIZATION_ID")?,
            })
        } else {
            None
        };

        let config = SchoolConfig {
            common,
            environment,
            service_name: env.get("SERVICE_NAME", "school-service"),
            service_version: env.get("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            log_level: env.get("LOG_LEVEL", "info"),
            otlp_endpoint: env.optional("OTLP_ENDPOINT"),
            storage,
            database,
            auth: AuthConfig {
                strategy,
                dev_organization_id: env.parse("DEV_ORGANIZATION_ID", "1")?,
            },
            session: SessionConfig {
                secret,
                cookie_name: env.get("SESSION_COOKIE_NAME", "school.sid"),
                ttl_hours: env.parse("SESSION_TTL_HOURS", "168")?,
                secure_cookie: is_prod || parse_flag(&env.get("SESSION_COOKIE_SECURE", "false")),
            },
            admin: AdminConfig {
                email: env.optional("ADMIN_EMAIL").map(|e| e.trim().to_lowercase()),
                password: env.optional("ADMIN_PASSWORD").map(Secret::new),
                password_hash: env.optional("ADMIN_PASSWORD_HASH"),
                organization_id: env.parse("ADMIN_ORGANIZATION_ID", "1")?,
                allow_setup: parse_flag(&env.get("ALLOW_ADMIN_SETUP", "false")),
            },
            security: SecurityConfig {
                allowed_origins: split_list(&env.get("ALLOWED_ORIGINS", "http://localhost:3000")),
                deployment_hosts: split_list(&env.get("DEPLOYMENT_HOSTS", "")),
            },
            password_hashing: PasswordHashConfig {
                memory_kib: env.parse("PASSWORD_HASH_MEMORY_KIB", "19456")?,
                iterations: env.parse("PASSWORD_HASH_ITERATIONS", "2")?,
                parallelism: env.parse("PASSWORD_HASH_PARALLELISM", "1")?,
            },
            federated,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.session.ttl_hours <= 0 {
            return Err(config_error("SESSION_TTL_HOURS must be positive"));
        }

        if self.session.secret.expose_secret().len() < MIN_SESSION_SECRET_LEN {
            return Err(config_error(format!(
                "SESSION_SECRET must be at least {} characters",
                MIN_SESSION_SECRET_LEN
            )));
        }

        if self.auth.strategy == AuthStrategyKind::Custom {
            if self.admin.email.is_none() {
                return Err(config_error("ADMIN_EMAIL is required for the custom auth strategy"));
            }
            if self.admin.password.is_none() && self.admin.password_hash.is_none() {
                return Err(config_error(
                    "ADMIN_PASSWORD or ADMIN_PASSWORD_HASH is required for the custom auth strategy",
                ));
            }
        }

        if self.environment == Environment::Prod {
            if self.auth.strategy == AuthStrategyKind::Dev {
                return Err(config_error("The dev auth strategy cannot run in production"));
            }

            if self.storage == StorageBackend::Memory {
                return Err(config_error("In-memory storage cannot run in production"));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.admin.allow_setup {
                tracing::warn!("ALLOW_ADMIN_SETUP is enabled in production");
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

struct Vars<'a>(&'a HashMap<String, String>);

impl Vars<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str) -> Result<String, AppError> {
        self.optional(key)
            .ok_or_else(|| config_error(format!("{} is required but not set", key)))
    }

    fn parse<T>(&self, key: &str, default: &str) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key, default);
        raw.parse()
            .map_err(|e: T::Err| config_error(format!("{} has invalid value '{}': {}", key, raw, e)))
    }

    fn parse_optional<T>(&self, key: &str) -> Result<Option<T>, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| {
                    config_error(format!("{} has invalid value '{}': {}", key, raw, e))
                })
            })
            .transpose()
    }
}

fn config_error(message: impl std::fmt::Display) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn random_secret() -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl FromStr for AuthStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(AuthStrategyKind::Dev),
            "custom" => Ok(AuthStrategyKind::Custom),
            "federated" => Ok(AuthStrategyKind::Federated),
            _ => Err(format!("Invalid auth strategy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<SchoolConfig, AppError> {
        SchoolConfig::from_vars(core_config::Config::default(), &vars(pairs))
    }

    #[test]
    fn test_defaults_to_dev_strategy_with_ephemeral_secret() {
        let config = load(&[]).unwrap();
        assert_eq!(config.auth.strategy, AuthStrategyKind::Dev);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.session.ttl_hours, 168);
        assert!(config.session.secret.expose_secret().len() >= MIN_SESSION_SECRET_LEN);
        assert!(!config.session.secure_cookie);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(load(&[("AUTH_STRATEGY", "magic")]).is_err());
    }

    #[test]
    fn test_custom_requires_secret_and_admin_credential() {
        assert!(load(&[("AUTH_STRATEGY", "custom")]).is_err());
        assert!(load(&[
            ("AUTH_STRATEGY", "custom"),
            ("SESSION_SECRET", SECRET),
            ("ADMIN_EMAIL", "admin@school.org"),
        ])
        .is_err());

        let config = load(&[
            ("AUTH_STRATEGY", "custom"),
            ("SESSION_SECRET", SECRET),
            ("ADMIN_EMAIL", "Admin@School.org"),
            ("ADMIN_PASSWORD", "s3cret-pass"),
        ])
        .unwrap();
        assert_eq!(config.admin.email.as_deref(), Some("admin@school.org"));
        assert!(!config.admin.allow_setup);
    }

    #[test]
    fn test_short_session_secret_is_rejected() {
        let result = load(&[
            ("AUTH_STRATEGY", "custom"),
            ("SESSION_SECRET", "short"),
            ("ADMIN_EMAIL", "admin@school.org"),
            ("ADMIN_PASSWORD_HASH", "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_dev_strategy_refused_in_production() {
        let result = load(&[
            ("ENVIRONMENT", "prod"),
            ("SESSION_SECRET", SECRET),
            ("DATABASE_URL", "postgres://localhost/school"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_production_forces_secure_cookie() {
        let config = load(&[
            ("ENVIRONMENT", "prod"),
            ("AUTH_STRATEGY", "custom"),
            ("SESSION_SECRET", SECRET),
            ("ADMIN_EMAIL", "admin@school.org"),
            ("ADMIN_PASSWORD", "pw"),
            ("DATABASE_URL", "postgres://localhost/school"),
            ("ALLOWED_ORIGINS", "https://school.example"),
        ])
        .unwrap();
        assert!(config.session.secure_cookie);
        assert_eq!(config.storage, StorageBackend::Postgres);
    }

    #[test]
    fn test_federated_requires_provider_settings() {
        let base = [("AUTH_STRATEGY", "federated"), ("SESSION_SECRET", SECRET)];
        assert!(load(&base).is_err());

        let mut full = base.to_vec();
        full.extend([
            ("FEDERATED_ISSUER", "https://idp.example"),
            ("FEDERATED_CLIENT_ID", "school"),
            ("FEDERATED_CLIENT_SECRET", "client-secret"),
            ("FEDERATED_AUTHORIZE_URL", "https://idp.example/authorize"),
            ("FEDERATED_TOKEN_URL", "https://idp.example/token"),
            ("FEDERATED_REDIRECT_URI", "http://localhost:5000/api/callback"),
            ("FEDERATED_DEFAULT_ORGANIZATION_ID", "3"),
        ]);
        let config = load(&full).unwrap();
        let federated = config.federated.unwrap();
        assert_eq!(federated.default_organization_id, Some(3));
    }

    #[test]
    fn test_allow_admin_setup_flag_parsing() {
        let config = load(&[("ALLOW_ADMIN_SETUP", "1")]).unwrap();
        assert!(config.admin.allow_setup);
        let config = load(&[("ALLOW_ADMIN_SETUP", "TRUE")]).unwrap();
        assert!(config.admin.allow_setup);
    }
}
