//! TOML parser with helpful error messages

use super::LoaderConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse config.toml with detailed error messages
pub fn parse_config(path: &Path) -> Result<LoaderConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse config.toml content from string
pub fn parse_config_str(content: &str) -> Result<LoaderConfig> {
    let config: LoaderConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Enhance TOML parsing errors with the offending line
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    let line_num = error
        .span()
        .map(|span| content[..span.start.min(content.len())].matches('\n').count() + 1);

    if let Some(line_num) = line_num {
        let context = get_line_context(content, line_num);
        anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            context,
            message
        )
    } else {
        anyhow::anyhow!("TOML parsing error: {}", message)
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &LoaderConfig) -> Result<String> {
    toml::to_string_pretty(config).with_context(|| "Failed to serialize configuration to TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
default_model = "gpt-4o"
request_timeout = 10
resolve_timeout = 60
working_dir = "/srv/tools"
"#;

        let config = parse_config_str(toml).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.request_timeout, 10);
        assert_eq!(config.resolve_timeout, Some(60));
        assert_eq!(
            config.working_dir.as_deref(),
            Some(std::path::Path::new("/srv/tools"))
        );
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_parse_error_reports_line() {
        let toml = "default_model = \"a\"\nrequest_timeout = \"soon\"\n";
        let err = parse_config_str(toml).unwrap_err().to_string();
        assert!(err.contains("line 2"), "unexpected error: {}", err);
        assert!(err.contains(">>>"));
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        assert!(parse_config_str("default_model = \"\"").is_err());
    }

    #[test]
    fn test_parse_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "default_model = \"from-file\"").unwrap();

        let config = parse_config(file.path()).unwrap();
        assert_eq!(config.default_model, "from-file");
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = LoaderConfig {
            resolve_timeout: Some(5),
            ..LoaderConfig::default()
        };
        let text = to_toml(&config).unwrap();
        assert_eq!(parse_config_str(&text).unwrap(), config);
    }
}
