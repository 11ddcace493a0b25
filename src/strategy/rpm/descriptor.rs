use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use url::Url;

use crate::{PubSubError, PubSubResult};

/// Префикс схемы удалённых брокеров (`rpm+<backend>://...`).
pub const REMOTE_SCHEME: &str = "rpm";

/// Поддерживаемые удалённые брокеры.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Backend {
    Mqtt,
    Redis,
    Nats,
    Pgsql,
}

impl Backend {
    pub const ALL: [Backend; 4] = [Self::Mqtt, Self::Redis, Self::Nats, Self::Pgsql];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::Redis => "redis",
            Self::Nats => "nats",
            Self::Pgsql => "pgsql",
        }
    }

    /// Имя стратегии для сообщений об ошибках (`rpm+mqtt` и т.д.).
    pub fn strategy_name(self) -> &'static str {
        match self {
            Self::Mqtt => "rpm+mqtt",
            Self::Redis => "rpm+redis",
            Self::Nats => "rpm+nats",
            Self::Pgsql => "rpm+pgsql",
        }
    }

    /// Порт по умолчанию, если в дескрипторе он не указан.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Mqtt => 1883,
            Self::Redis => 6379,
            Self::Nats => 4242,
            Self::Pgsql => 5432,
        }
    }
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Backend {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Параметры TLS из строки запроса (`tls`, `ca`, `key`, `crt`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub ca: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
}

impl TlsOptions {
    /// Проверка сертификата брокера включается только вместе с `ca`.
    pub fn verify_peer(&self) -> bool {
        self.ca.is_some()
    }
}

/// Разобранный дескриптор удалённого брокера:
/// `rpm+<backend>://[user[:pass]@]host[:port]/[scope][?options]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Первый сегмент пути; префикс пространства имён топиков.
    pub scope: Option<String>,
    /// Путь целиком, для `pgsql` это имя базы данных.
    pub database: Option<String>,
    pub tls: Option<TlsOptions>,
    /// Все параметры строки запроса.
    pub options: BTreeMap<String, String>,
    raw: String,
}

impl RemoteDescriptor {
    pub fn parse(descriptor: &str) -> PubSubResult<Self> {
        let backend = parse_scheme(descriptor)?;

        let url = Url::parse(descriptor).map_err(|e| invalid(descriptor, e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(descriptor, "missing host"))?
            .to_string();

        let user = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let password = url.password().map(str::to_string);

        let path = url.path().trim_start_matches('/');
        let scope = path
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let database = Some(path).filter(|p| !p.is_empty()).map(str::to_string);

        if backend == Backend::Pgsql && database.is_none() {
            return Err(invalid(descriptor, "a database path is required"));
        }

        let options: BTreeMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let tls = ["tls", "ca", "key", "crt"]
            .iter()
            .any(|key| options.contains_key(*key))
            .then(|| TlsOptions {
                ca: options.get("ca").map(PathBuf::from),
                key: options.get("key").map(PathBuf::from),
                cert: options.get("crt").map(PathBuf::from),
            });

        Ok(Self {
            backend,
            host,
            port: url.port().unwrap_or_else(|| backend.default_port()),
            user,
            password,
            scope,
            database,
            tls,
            options,
            raw: descriptor.to_string(),
        })
    }

    /// Исходная строка дескриптора.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `host:port` для подключения клиента.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for RemoteDescriptor {
    type Err = PubSubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Проверяет схему `rpm+<backend>` до разбора остального дескриптора.
fn parse_scheme(descriptor: &str) -> PubSubResult<Backend> {
    let unknown = |reason: String| PubSubError::UnknownStrategy {
        descriptor: descriptor.to_string(),
        reason,
    };

    let scheme = descriptor
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| unknown("missing scheme".to_string()))?;
    let sub = scheme
        .strip_prefix(REMOTE_SCHEME)
        .ok_or_else(|| unknown(format!("scheme '{scheme}' is not remote")))?;
    let name = sub
        .strip_prefix('+')
        .ok_or_else(|| unknown("missing remote backend".to_string()))?;

    name.parse()
        .map_err(|_| unknown(format!("unsupported remote backend '{name}'")))
}

fn invalid(
    descriptor: &str,
    reason: impl Into<String>,
) -> PubSubError {
    PubSubError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: reason.into(),
    }
}
