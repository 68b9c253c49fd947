use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::auth::Credentials;
use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::util::{non_empty, strip_quotes};

pub(crate) const ENV_URL: &str = "BDDS_URL";
pub(crate) const ENV_USERNAME: &str = "BDDS_USERNAME";
pub(crate) const ENV_PASSWORD: &str = "BDDS_PASSWORD";
pub(crate) const ENV_RC: &str = "BDDS_RC";

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Explicit values passed by the caller; they win over every other source.
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) url: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
}

pub(crate) fn load_config(overrides: Overrides) -> Result<ClientConfig> {
    resolve(overrides, |k| std::env::var(k).ok(), &rc_candidates())
}

fn resolve<E>(overrides: Overrides, env: E, rc_candidates: &[PathBuf]) -> Result<ClientConfig>
where
    E: Fn(&str) -> Option<String>,
{
    let mut url = non_empty(overrides.url).or_else(|| non_empty(env(ENV_URL)));
    let mut username = non_empty(overrides.username).or_else(|| non_empty(env(ENV_USERNAME)));
    let mut password = non_empty(overrides.password).or_else(|| non_empty(env(ENV_PASSWORD)));

    if url.is_none() || username.is_none() || password.is_none() {
        for rc_path in rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path)
                    .with_context(|| {
                        format!("failed to read configuration file {}", rc_path.display())
                    })
                    .map_err(|e| Error::Config(format!("{:#}", e)))?;

                url = url.or(non_empty(cfg.url));
                username = username.or(non_empty(cfg.username));
                password = password.or(non_empty(cfg.password));
                break;
            }
        }
    }

    let credentials = match (username, password) {
        (Some(u), Some(p)) => Some(Credentials::new(u, p)),
        (None, None) => None,
        (Some(_), None) => {
            return Err(Error::Config(missing_hint(
                "password",
                ENV_PASSWORD,
                rc_candidates,
            )));
        }
        (None, Some(_)) => {
            return Err(Error::Config(missing_hint(
                "username",
                ENV_USERNAME,
                rc_candidates,
            )));
        }
    };

    let mut cfg = ClientConfig {
        credentials,
        ..ClientConfig::default()
    };
    if let Some(url) = url {
        cfg.base_url = url;
    }
    Ok(cfg)
}

fn missing_hint(field: &str, env_var: &str, rc_candidates: &[PathBuf]) -> String {
    if rc_candidates.is_empty() {
        return format!(
            "{} is required when the other credential is set (set {} or create .bddsrc)",
            field, env_var
        );
    }
    format!(
        "{} is required when the other credential is set (set {} or put `{}:` in one of: {})",
        field,
        env_var,
        field,
        rc_candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn read_rc(path: &Path) -> anyhow::Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    // A key may be left empty with its value on the following line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let entry = line
            .split_once(':')
            .map(|(k, v)| (k.trim(), v))
            .filter(|(k, _)| is_known_key(k));

        if let Some(pk) = pending_key.take() {
            if entry.is_none() {
                assign(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = entry {
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(k);
            } else {
                assign(&mut cfg, k, v);
            }
        }
    }

    Ok(cfg)
}

fn is_known_key(k: &str) -> bool {
    matches!(k, "url" | "username" | "password")
}

fn assign(cfg: &mut RcConfig, key: &str, value: &str) {
    let value = Some(value.to_string());
    match key {
        "url" => cfg.url = value,
        "username" => cfg.username = value,
        "password" => cfg.password = value,
        _ => {}
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) BDDS_RC (explicit)
    // 2) ./.bddsrc
    // 3) ~/.bddsrc
    if let Ok(p) = std::env::var(ENV_RC) {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".bddsrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".bddsrc"));
    }
    v
}
