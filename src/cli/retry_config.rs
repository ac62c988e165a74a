//! Retry limits for network operations.

use crate::EnvConfig;

/// Highest accepted retry count
const MAX_RETRIES: u32 = 20;

/// Retry limits per kind of operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Max retries for GitHub API calls (lookup, publish)
    pub github_api: u32,

    /// Max retries for each asset upload
    pub file_uploads: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            github_api: 5,
            file_uploads: 5,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            github_api: 0,
            file_uploads: 0,
        }
    }

    /// Parse a retry count, clamped to `max`; unparsable values fall back
    /// to `default`
    fn parse_retry_env(env: &EnvConfig, var_name: &str, default: u32, max: u32) -> u32 {
        env.get(var_name)
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(|v| v.min(max))
            .unwrap_or(default)
    }

    /// Read `CV_RELEASE_RETRY_GITHUB` and `CV_RELEASE_RETRY_UPLOADS`
    pub fn from_env(env: &EnvConfig) -> Self {
        let defaults = Self::default();
        Self {
            github_api: Self::parse_retry_env(
                env,
                "CV_RELEASE_RETRY_GITHUB",
                defaults.github_api,
                MAX_RETRIES,
            ),
            file_uploads: Self::parse_retry_env(
                env,
                "CV_RELEASE_RETRY_UPLOADS",
                defaults.file_uploads,
                MAX_RETRIES,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_clamps_limits() {
        let env = EnvConfig::from_pairs([
            ("CV_RELEASE_RETRY_GITHUB", "2"),
            ("CV_RELEASE_RETRY_UPLOADS", "500"),
        ]);
        let config = RetryConfig::from_env(&env);
        assert_eq!(config.github_api, 2);
        assert_eq!(config.file_uploads, MAX_RETRIES);
    }

    #[test]
    fn invalid_values_use_defaults() {
        let env = EnvConfig::from_pairs([("CV_RELEASE_RETRY_GITHUB", "lots")]);
        assert_eq!(RetryConfig::from_env(&env), RetryConfig::default());
    }
}
