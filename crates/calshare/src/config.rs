use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Hard ceiling of ids in one remote membership query.
pub const MAX_MEMBERSHIP_QUERY_IDS: usize = 10;

pub const DEFAULT_CACHE_KEY: &str = "current_user";
const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub membership_batch_size: usize,
    /// Start and stop per-group event/proposal subscriptions as the group
    /// list changes.
    pub follow_group_calendars: bool,
    pub cache_key: String,
    pub data_dir: Option<PathBuf>,
    pub bus_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            membership_batch_size: MAX_MEMBERSHIP_QUERY_IDS,
            follow_group_calendars: true,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            data_dir: None,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `CALSHARE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            membership_batch_size: read_limit("CALSHARE_BATCH_SIZE", defaults.membership_batch_size),
            follow_group_calendars: read_flag(
                "CALSHARE_FOLLOW_GROUPS",
                defaults.follow_group_calendars,
            ),
            cache_key: env::var("CALSHARE_CACHE_KEY")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.cache_key),
            data_dir: env::var_os("CALSHARE_DATA_DIR").map(PathBuf::from),
            bus_capacity: read_limit("CALSHARE_BUS_CAPACITY", defaults.bus_capacity),
        }
        .normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.membership_batch_size = self
            .membership_batch_size
            .clamp(1, MAX_MEMBERSHIP_QUERY_IDS);
        if self.bus_capacity == 0 {
            self.bus_capacity = DEFAULT_BUS_CAPACITY;
        }
        self
    }
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_flag(name: &str, default: bool) -> bool {
    match env::var(name).ok().as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped_to_remote_ceiling() {
        let config = SyncConfig {
            membership_batch_size: 25,
            ..SyncConfig::default()
        }
        .normalized();
        assert_eq!(config.membership_batch_size, MAX_MEMBERSHIP_QUERY_IDS);

        let config = SyncConfig {
            membership_batch_size: 0,
            ..SyncConfig::default()
        }
        .normalized();
        assert_eq!(config.membership_batch_size, 1);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{ "follow_group_calendars": false }"#).expect("parse");
        assert!(!config.follow_group_calendars);
        assert_eq!(config.cache_key, DEFAULT_CACHE_KEY);
        assert_eq!(config.membership_batch_size, 10);
    }
}
