use crate::sync::RecordId;
use crate::types::Environment;

/// Application configuration.
pub struct Config {
    pub container: String,
    pub api_token: String,
    pub web_auth_token: Option<String>,
    pub api_root: String,
    pub timeout_secs: u64,
    pub environment: Environment,
    pub testing: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("container", &self.container)
            .field("environment", &self.environment)
            .field("api_token", &"<redacted>")
            .field(
                "web_auth_token",
                &self.web_auth_token.as_ref().map(|_| "<redacted>"),
            )
            .field("api_root", &self.api_root)
            .field("testing", &self.testing)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_cli(cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        let container = cli.container.trim().to_string();
        if container.is_empty() || container.contains('/') {
            anyhow::bail!("Invalid container identifier '{}'", cli.container);
        }
        if cli.api_token.trim().is_empty() {
            anyhow::bail!("--api-token (or CLOUDKIT_API_TOKEN) must not be empty");
        }
        if !(cli.api_root.starts_with("https://") || cli.api_root.starts_with("http://")) {
            anyhow::bail!("--api-root must be an http(s) URL, got '{}'", cli.api_root);
        }
        if cli.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        // An empty token from the environment means "not signed in".
        let web_auth_token = cli
            .web_auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Self {
            container,
            api_token: cli.api_token.trim().to_string(),
            web_auth_token,
            api_root: cli.api_root.trim_end_matches('/').to_string(),
            timeout_secs: cli.timeout,
            environment: cli.environment,
            testing: cli.testing,
        })
    }

    pub fn record_id(&self) -> RecordId {
        RecordId::for_testing(self.testing)
    }
}
