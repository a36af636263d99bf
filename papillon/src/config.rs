use std::path::{Path, PathBuf};

use crate::Campaign;

pub const CONFIG_ENV: &str = "PAPILLON_CONFIG";

/// Find the campaign file using the following precedence:
/// 1. `--config` on the command line
/// 2. `PAPILLON_CONFIG` environment variable
/// 3. ./papillon.config.ron (current working directory)
/// 4. /etc/papillon/papillon.config.ron (system-wide config)
///
/// # Errors
///
/// Fails when an explicitly named file does not exist, or when none of the
/// default locations hold a file.
pub fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let default_paths = [
        PathBuf::from("./papillon.config.ron"),
        PathBuf::from("/etc/papillon/papillon.config.ron"),
    ];

    find_in(explicit, std::env::var(CONFIG_ENV).ok(), &default_paths)
}

fn find_in(
    explicit: Option<PathBuf>,
    env_path: Option<String>,
    default_paths: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    for path in default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config argument\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Reads and parses a campaign file.
///
/// # Errors
///
/// Fails when the file cannot be read or is not a valid campaign.
pub fn load(path: &Path) -> anyhow::Result<Campaign> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
    })?;

    ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid campaign in {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"(
        server: (
            host: "smtp.example.com",
            port: 587,
            username: "news",
            password: "secret",
            sender_display_name: "News",
            sender_address: "news@example.com",
        ),
        template: (subject: "Hi", body: "Hello {{name}}"),
    )"#;

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("campaign.ron");
        std::fs::write(&explicit, MINIMAL).unwrap();
        let fallback = dir.path().join("fallback.ron");
        std::fs::write(&fallback, MINIMAL).unwrap();

        let found = find_in(
            Some(explicit.clone()),
            Some(fallback.display().to_string()),
            &[fallback],
        )
        .unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn test_missing_env_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ron");

        let err = find_in(None, Some(missing.display().to_string()), &[]).unwrap_err();
        assert!(err.to_string().contains(CONFIG_ENV));
    }

    #[test]
    fn test_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.ron");
        let present = dir.path().join("present.ron");
        std::fs::write(&present, MINIMAL).unwrap();

        let found = find_in(None, None, &[absent.clone(), present.clone()]).unwrap();
        assert_eq!(found, present);

        let err = find_in(None, None, &[absent]).unwrap_err();
        assert!(err.to_string().starts_with("No configuration file found"));
    }

    #[test]
    fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let campaign = load(file.path()).unwrap();
        assert_eq!(campaign.server.port, 587);
        assert!(campaign.contacts.is_empty());
        assert!(!campaign.sent_folder.enabled);
        assert_eq!(campaign.rate_limit.max_per_minute, 30);
    }

    #[test]
    fn test_sample_config_parses() {
        let campaign: Campaign =
            ron::from_str(include_str!("../../papillon.config.ron")).unwrap();

        assert!(campaign.validate().is_ok());
        assert!(campaign.missing_variables().is_empty());
        assert_eq!(campaign.preview().len(), 2);
    }

    #[test]
    fn test_load_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"(server: ())").unwrap();

        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid campaign in"));
    }
}
