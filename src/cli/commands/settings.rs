//! Configuration command.

use std::path::Path;

use crate::config::{self, Config};

/// Print the effective configuration, or write it out with `--init`.
pub fn cmd_config(config: &Config, path: Option<&Path>, init: bool) -> anyhow::Result<()> {
    if !init {
        print!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }

    match path {
        Some(path) => config::save_to(config, path)?,
        None => config::save(config)?,
    }
    let shown = path.map(Path::to_path_buf).or_else(config::config_path);
    if let Some(shown) = shown {
        println!("Wrote {}", shown.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.decision.electronic = true;

        cmd_config(&config, Some(&path), true).unwrap();

        assert_eq!(config::load_from(&path), config);
    }
}
