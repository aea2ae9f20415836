use std::net::SocketAddr;

const DEFAULT_BIND: &str = "0.0.0.0:8081";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";
const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    /// Seeded as an active ADMIN on boot when no user has this email yet.
    pub admin_email: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;

        let bind_raw = lookup("OPHUB_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid OPHUB_BIND {bind_raw:?}: {e}"))?;

        // Examples:
        // - OPHUB_ALLOWED_ORIGINS=http://localhost:5173
        // - OPHUB_ALLOWED_ORIGINS=https://ops.example.com,https://admin.example.com
        let origins_raw = lookup("OPHUB_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string());

        let admin_email = lookup("OPHUB_ADMIN_EMAIL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());

        Ok(Self {
            database_url,
            bind_addr,
            allowed_origins: parse_allowed_origins(&origins_raw),
            admin_email,
        })
    }
}

fn parse_allowed_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8081".parse().unwrap());
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.admin_email, "admin@localhost");
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ophub"),
            ("OPHUB_ALLOWED_ORIGINS", " https://a.example , ,https://b.example"),
            ("OPHUB_BIND", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("OPHUB_BIND", "not-an-addr"),
        ]));
        assert!(result.is_err());
    }
}
