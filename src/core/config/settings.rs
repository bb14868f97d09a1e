use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_deadlines, parse_environment, parse_i32,
    parse_store_backend, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    ApiSettings, ConfigError, DatabaseSettings, DialogSettings, RedisSettings, ReviewSettings,
    RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings,
    StoreSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("PRB_HOST", "0.0.0.0");
        let port = env_or_default("PRB_PORT", "8000");

        let environment =
            parse_environment(env_optional("PRB_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("PRB_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Peer Review API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let service_token = env_or_default("PRB_SERVICE_TOKEN", "");

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "peer_review");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "peer_review_db");
        let database_url = env_optional("DATABASE_URL");

        let backend = parse_store_backend(env_optional("PRB_STORE_BACKEND"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let n_graders = parse_usize("PRB_N_GRADERS", env_or_default("PRB_N_GRADERS", "2"))?;
        let max_late = parse_u32("PRB_MAX_LATE", env_or_default("PRB_MAX_LATE", "3"))?;
        let default_late_days =
            parse_i32("PRB_DEFAULT_LATE_DAYS", env_or_default("PRB_DEFAULT_LATE_DAYS", "12"))?;
        let max_task_number =
            parse_i32("PRB_MAX_TASK_NUMBER", env_or_default("PRB_MAX_TASK_NUMBER", "7"))?;
        let claim_rounds = parse_u32("PRB_CLAIM_ROUNDS", env_or_default("PRB_CLAIM_ROUNDS", "3"))?;
        let conflict_retries =
            parse_u32("PRB_CONFLICT_RETRIES", env_or_default("PRB_CONFLICT_RETRIES", "3"))?;
        let deadlines = parse_deadlines(env_optional("PRB_DEADLINES"))?;

        let dialog_ttl_seconds =
            parse_u64("PRB_DIALOG_TTL_SECONDS", env_or_default("PRB_DIALOG_TTL_SECONDS", "86400"))?;

        let log_level = env_or_default("PRB_LOG_LEVEL", "info");
        let json = env_optional("PRB_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { service_token },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            store: StoreSettings { backend },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            review: ReviewSettings {
                n_graders,
                max_late: i64::from(max_late),
                default_late_days,
                max_task_number,
                claim_rounds,
                conflict_retries,
                deadlines,
            },
            dialog: DialogSettings { ttl_seconds: dialog_ttl_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn review(&self) -> &ReviewSettings {
        &self.review
    }

    pub(crate) fn dialog(&self) -> &DialogSettings {
        &self.dialog
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.review.n_graders == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PRB_N_GRADERS",
                value: self.review.n_graders.to_string(),
            });
        }
        if self.review.default_late_days < 0 {
            return Err(ConfigError::InvalidValue {
                field: "PRB_DEFAULT_LATE_DAYS",
                value: self.review.default_late_days.to_string(),
            });
        }
        if self.review.max_task_number < 1 {
            return Err(ConfigError::InvalidValue {
                field: "PRB_MAX_TASK_NUMBER",
                value: self.review.max_task_number.to_string(),
            });
        }
        if self.review.claim_rounds == 0 {
            return Err(ConfigError::InvalidValue { field: "PRB_CLAIM_ROUNDS", value: "0".into() });
        }
        if self.review.conflict_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PRB_CONFLICT_RETRIES",
                value: "0".into(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.security.service_token.is_empty() {
            return Err(ConfigError::MissingSecret("PRB_SERVICE_TOKEN"));
        }

        if self.store.backend == super::types::StoreBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.review.deadlines.is_empty() {
            return Err(ConfigError::InvalidDeadlines("PRB_DEADLINES is empty".to_string()));
        }

        Ok(())
    }
}
