use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_CONFIG_FILE: &str = "academy.yml";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub log_file: PathBuf,
    pub export_dir: PathBuf,
}

/// Optional settings file. The API token is only ever read from the environment.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    log_file: Option<PathBuf>,
    export_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let file = match env::var("ACADEMY_CONFIG") {
            Ok(path) => read_file_config(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                read_file_config(Path::new(DEFAULT_CONFIG_FILE))?
            }
            Err(_) => FileConfig::default(),
        };

        let api_token = env::var("ACADEMY_API_TOKEN")
            .context("ACADEMY_API_TOKEN not found. Please set it in .env file or environment")?;

        if api_token.trim().is_empty() {
            anyhow::bail!("ACADEMY_API_TOKEN is empty");
        }

        let api_base_url = env::var("ACADEMY_API_URL")
            .ok()
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let log_file = env::var("ACADEMY_LOG_FILE")
            .ok()
            .map(PathBuf::from)
            .or(file.log_file)
            .unwrap_or_else(|| PathBuf::from("academy-desk.log"));

        Ok(Config {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_token: api_token.trim().to_string(),
            request_timeout_secs: file.request_timeout_secs.unwrap_or(120),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(30),
            log_file,
            export_dir: file.export_dir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_file_config(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn parse_file_config(content: &str) -> Result<FileConfig> {
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_config() {
        let yaml = r#"
api_base_url: "https://crm.example.edu/"
request_timeout_secs: 15
export_dir: exports
"#;

        let file = parse_file_config(yaml).unwrap();
        assert_eq!(file.api_base_url.as_deref(), Some("https://crm.example.edu/"));
        assert_eq!(file.request_timeout_secs, Some(15));
        assert_eq!(file.connect_timeout_secs, None);
        assert_eq!(file.export_dir, Some(PathBuf::from("exports")));
    }

    #[test]
    fn test_empty_file_config() {
        let file = parse_file_config("\n").unwrap();
        assert!(file.api_base_url.is_none());
        assert!(parse_file_config("request_timeout_secs: soon").is_err());
    }
}
