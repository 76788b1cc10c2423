use std::{path::Path, time::Duration};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    idgate_auth::{TokenCodec, TokenStatus},
    idgate_config::IdgateConfig,
};

#[derive(Subcommand)]
pub enum TokenAction {
    /// Check a token against the configured signing key and print its claims.
    Inspect {
        /// The token to check.
        token: String,
    },
}

pub fn handle_token(action: TokenAction, config_path: Option<&Path>) -> Result<()> {
    let config = idgate_config::load(config_path)?;
    match action {
        TokenAction::Inspect { token } => inspect(&config, &token),
    }
}

fn inspect(config: &IdgateConfig, token: &str) -> Result<()> {
    let status = codec(config)?.validate(token.trim());
    println!("{}", serde_json::to_string_pretty(&render(&status))?);
    Ok(())
}

fn codec(config: &IdgateConfig) -> Result<TokenCodec> {
    let key = config
        .auth
        .signing_key
        .as_ref()
        .context("no signing key configured (set auth.signing_key or IDGATE_JWT_KEY)")?;
    Ok(TokenCodec::new(
        key,
        Duration::from_secs(config.auth.token_ttl_secs),
    )?)
}

fn render(status: &TokenStatus) -> serde_json::Value {
    match status {
        TokenStatus::Valid(claims) => serde_json::json!({
            "valid": true,
            "user_uuid": claims.user_id,
            "tenant_id": claims.tenant_id,
            "role": claims.role,
        }),
        TokenStatus::Invalid(reason) => serde_json::json!({
            "valid": false,
            "reason": reason,
        }),
    }
}
