// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `./emqpg.toml` > `~/.config/emqpg/emqpg.toml` > `/etc/emqpg/emqpg.toml`,
//! with `EMQPG_*` environment variables on top of all of them.

// figment::Error is external and cannot be boxed without a wrapper.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::EmqpgConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/emqpg/emqpg.toml";
pub(crate) const LOCAL_CONFIG: &str = "emqpg.toml";

pub(crate) fn user_config() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("emqpg/emqpg.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/emqpg/emqpg.toml`
/// 3. `~/.config/emqpg/emqpg.toml`
/// 4. `./emqpg.toml`
/// 5. `EMQPG_*` environment variables
pub fn load_config() -> Result<EmqpgConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<EmqpgConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EmqpgConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EmqpgConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EmqpgConfig::default()))
        .merge(Toml::file_exact(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for hierarchy loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(EmqpgConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Variables under the `EMQPG_` prefix that belong to the test suites, not
/// to the service.
const NON_CONFIG_VARS: [&str; 1] = ["TEST_DATABASE_URL"];

/// Environment provider mapping `EMQPG_SECTION_KEY` onto `section.key`.
///
/// Uses an explicit `map()` instead of `split("_")`: `EMQPG_BROKER_CLIENT_ID`
/// must land on `broker.client_id`, not `broker.client.id`.
fn env_provider() -> Env {
    Env::prefixed("EMQPG_")
        .ignore(&NON_CONFIG_VARS)
        .map(|key| map_env_key(key.as_str()).into())
}

/// Maps a prefix-stripped env var name, in any case, to a dotted config path.
pub fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 4] = ["broker_tls", "broker", "postgres", "log"];

    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{}.{rest}", section.replace('_', "."));
        }
    }
    key
}
