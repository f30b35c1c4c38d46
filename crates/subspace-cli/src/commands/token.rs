use clap::Subcommand;
use subspace_auth::SessionManager;

use crate::pout;

#[derive(Debug, Subcommand)]
pub enum TokenCommands {
    /// Issue a session token (prints the Set-Cookie value)
    Issue {
        #[arg(long)]
        admin: bool,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Validate a token and print its record
    Inspect { token: String },
}

pub fn cmd_token(command: TokenCommands, sessions: &SessionManager, json: bool) -> anyhow::Result<()> {
    match command {
        TokenCommands::Issue { admin, user_id } => {
            let artifact = sessions.issue(admin, user_id.as_deref().unwrap_or_default())?;
            pout(
                json,
                serde_json::json!({
                    "record": artifact.record,
                    "token": artifact.token,
                    "set_cookie": artifact.set_cookie,
                }),
                &artifact.set_cookie,
            )?;
        }
        TokenCommands::Inspect { token } => match sessions.validate(Some(&token)) {
            Ok(record) => {
                pout(
                    json,
                    serde_json::json!({"valid": true, "record": record}),
                    &format!(
                        "valid: admin={} user_id={:?}",
                        record.is_admin, record.user_id
                    ),
                )?;
            }
            Err(e) if e.is_session_rejection() => {
                pout(
                    json,
                    serde_json::json!({"valid": false, "reason": e.to_string()}),
                    &format!("invalid: {e}"),
                )?;
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}
