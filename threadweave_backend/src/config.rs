use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_MAX_DEPTH: usize = 2;
/// Hard ceiling on reply levels a single read may expand.
pub const MAX_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct ThreadweaveConfig {
    pub api_port: u16,
    pub paths: ThreadweavePaths,
    pub listing: ListingConfig,
}

impl ThreadweaveConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("THREADWEAVE_HOME") {
            Ok(raw) if !raw.trim().is_empty() => ThreadweavePaths::from_base_dir(raw.trim())?,
            _ => ThreadweavePaths::discover()?,
        };
        let api_port = env::var("THREADWEAVE_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);
        Ok(Self {
            api_port,
            paths,
            listing: ListingConfig::from_env(),
        })
    }

    pub fn new(api_port: u16, paths: ThreadweavePaths) -> Self {
        Self {
            api_port,
            paths,
            listing: ListingConfig::default(),
        }
    }
}

/// Knobs for how much of the reply tree a read expands.
#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub default_page_size: usize,
    /// Nesting levels `get_by_id` expands before leaving child ids as-is.
    pub max_depth: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ListingConfig {
    pub fn from_env() -> Self {
        let default_page_size = env::var("THREADWEAVE_PAGE_SIZE")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let max_depth = env::var("THREADWEAVE_MAX_DEPTH")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_DEPTH)
            .min(MAX_EXPANSION_DEPTH);
        Self {
            default_page_size,
            max_depth,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ThreadweavePaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl ThreadweavePaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("threadweave.db");
        let logs_dir = base.join("logs");

        Ok(Self {
            base,
            data_dir,
            db_path,
            logs_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_base_dir() {
        let paths = ThreadweavePaths::from_base_dir("/srv/threadweave").unwrap();
        assert_eq!(paths.data_dir, PathBuf::from("/srv/threadweave/data"));
        assert_eq!(
            paths.db_path,
            PathBuf::from("/srv/threadweave/data/threadweave.db")
        );
        assert_eq!(paths.logs_dir, PathBuf::from("/srv/threadweave/logs"));
    }

    #[test]
    fn listing_defaults_bound_expansion_at_two_levels() {
        let listing = ListingConfig::default();
        assert_eq!(listing.max_depth, 2);
        assert_eq!(listing.default_page_size, 20);
    }

    #[test]
    fn oversized_depth_from_env_is_clamped() {
        env::set_var("THREADWEAVE_MAX_DEPTH", "100000");
        let listing = ListingConfig::from_env();
        env::remove_var("THREADWEAVE_MAX_DEPTH");
        assert_eq!(listing.max_depth, MAX_EXPANSION_DEPTH);
    }
}
