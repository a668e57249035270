use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::client::HttpScoringClient;
use crate::identity::AuthContext;

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Base URL of the scoring service
    #[arg(long, global = true, env = "FRAUD_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Sent as the X-API-Key header
    #[arg(long, global = true, env = "FRAUD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "FRAUD_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Identity provider key; leave unset for demo mode
    #[arg(long, global = true, env = "FRAUD_IDENTITY_KEY", hide_env_values = true)]
    pub identity_key: Option<String>,

    #[arg(long, global = true, env = "FRAUD_USER_NAME")]
    pub user_name: Option<String>,

    #[arg(long, global = true, env = "FRAUD_USER_EMAIL")]
    pub user_email: Option<String>,

    /// JSON array of registered users, only counted
    #[arg(long, global = true, env = "FRAUD_USER_REGISTRY", default_value = "registered_users.json")]
    pub user_registry: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub auth: AuthContext,
    pub user_registry: PathBuf,
}

impl Config {
    pub fn from_args(args: ServiceArgs) -> anyhow::Result<Self> {
        let url = reqwest::Url::parse(&args.api_url)
            .with_context(|| format!("FRAUD_API_URL is not a valid URL: {}", args.api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("FRAUD_API_URL must use http or https, got {}", url.scheme());
        }
        if args.timeout_secs == 0 {
            anyhow::bail!("FRAUD_TIMEOUT_SECS must be at least 1");
        }

        let auth = AuthContext::resolve(
            args.identity_key.as_deref(),
            args.user_name.as_deref(),
            args.user_email.as_deref(),
        )?;

        Ok(Self {
            api_url: args.api_url,
            api_key: args.api_key.filter(|key| !key.trim().is_empty()),
            timeout: Duration::from_secs(args.timeout_secs),
            auth,
            user_registry: args.user_registry,
        })
    }

    pub fn client(&self) -> anyhow::Result<HttpScoringClient> {
        HttpScoringClient::new(&self.api_url, self.api_key.as_deref(), self.timeout)
            .context("failed to build HTTP client")
    }
}
