//! Runtime configuration from environment and flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::dispatch::AnswerPolicy;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_GRAPH_API_VERSION: &str = "v21.0";
const DEFAULT_RECORDINGS_DIR: &str = "./recordings";

/// Command-line overrides. Everything not given here is read from the
/// environment.
#[derive(Debug, Parser)]
#[command(
    name = "wacall-relay",
    about = "WhatsApp Business calling webhook relay"
)]
pub struct Cli {
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// How inbound calls are answered: manual, preaccept or accept
    /// (overrides ANSWER_POLICY).
    #[arg(long)]
    pub answer_policy: Option<AnswerPolicy>,

    /// Directory uploaded call recordings are written to (overrides
    /// RECORDINGS_DIR).
    #[arg(long)]
    pub recordings_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub verify_token: String,
    pub graph: GraphApiConfig,
    pub answer_policy: AnswerPolicy,
    pub recordings_dir: PathBuf,
    pub oauth: Option<OauthConfig>,
}

#[derive(Debug, Clone)]
pub struct GraphApiConfig {
    pub base_url: String,
    pub api_version: String,
    pub phone_number_id: String,
    pub access_token: String,
}

/// Settings for the optional authorization-code exchange endpoint.
/// Present only when OAUTH_TOKEN_URL is configured.
#[derive(Debug, Clone)]
pub struct OauthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
}

impl RelayConfig {
    pub fn load(cli: &Cli) -> Result<Self> {
        let verify_token = required_env("WEBHOOK_VERIFY_TOKEN")?;
        let access_token = required_env("GRAPH_API_TOKEN")?;
        let phone_number_id = required_env("PHONE_NUMBER_ID")?;

        let port = match cli.port {
            Some(port) => port,
            None => match std::env::var("PORT") {
                Ok(raw) => raw
                    .parse()
                    .with_context(|| format!("PORT is not a valid port number: {raw}"))?,
                Err(_) => DEFAULT_PORT,
            },
        };

        let answer_policy = match cli.answer_policy {
            Some(policy) => policy,
            None => match std::env::var("ANSWER_POLICY") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))
                    .context("ANSWER_POLICY is not a valid answer policy")?,
                Err(_) => AnswerPolicy::default(),
            },
        };

        let recordings_dir = cli
            .recordings_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(env_or("RECORDINGS_DIR", DEFAULT_RECORDINGS_DIR)));

        // Either the whole OAuth block is configured or none of it; a
        // half-configured exchange should fail loudly at startup.
        let oauth = match std::env::var("OAUTH_TOKEN_URL") {
            Ok(token_url) => Some(OauthConfig {
                token_url,
                client_id: required_env("OAUTH_CLIENT_ID")?,
                client_secret: required_env("OAUTH_CLIENT_SECRET")?,
                redirect_uri: std::env::var("OAUTH_REDIRECT_URI").ok(),
            }),
            Err(_) => None,
        };

        Ok(Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            verify_token,
            graph: GraphApiConfig {
                base_url: env_or("GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL),
                api_version: env_or("GRAPH_API_VERSION", DEFAULT_GRAPH_API_VERSION),
                phone_number_id,
                access_token,
            },
            answer_policy,
            recordings_dir,
            oauth,
        })
    }
}

fn required_env(name: &'static str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_parse() {
        let cli = Cli::try_parse_from([
            "wacall-relay",
            "--port",
            "8080",
            "--answer-policy",
            "preaccept",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.answer_policy, Some(AnswerPolicy::PreAccept));
        assert!(cli.recordings_dir.is_none());

        assert!(Cli::try_parse_from(["wacall-relay", "--answer-policy", "bogus"]).is_err());
    }
}
