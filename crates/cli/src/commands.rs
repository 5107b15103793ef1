//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use latch_http::{AuthClient, ClientConfig, Credentials, Method, SessionController, UserProfile};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login {
        /// Account email
        #[arg(long, short)]
        email: String,

        /// Account password
        #[arg(long, short, env = "LATCH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the signed-in user, resuming a stored session if needed
    Whoami,

    /// Create an account
    Register {
        /// Account email
        #[arg(long, short)]
        email: String,

        /// Account password (at least 6 characters)
        #[arg(long, short, env = "LATCH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Call an authenticated endpoint and print the JSON response
    Get {
        /// Path relative to the base URL, e.g. `/auth/profile`
        path: String,
    },
}

impl Commands {
    pub async fn execute(self, config: ClientConfig) -> Result<()> {
        let client = AuthClient::from_config(&config)?;
        config.state_dir().create_directories().await?;
        let session = SessionController::new(client);

        match self {
            Self::Login { email, password } => {
                let user = session.login(&Credentials::new(email, password)).await?;
                info!(email = %user.email, "session stored");
                println!("Logged in as {}", display_name(&user));
            }
            Self::Logout => {
                session.logout().await?;
                println!("Logged out");
            }
            Self::Whoami => match session.bootstrap().await {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
                None => bail!("not logged in"),
            },
            Self::Register { email, password } => {
                let response = session
                    .register(&Credentials::new(email, password))
                    .await?;
                println!("Registered");
                if !response.is_null() {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
            }
            Self::Get { path } => {
                let client = session.client();
                let body: serde_json::Value = client
                    .execute(client.request(Method::GET, &path))
                    .await
                    .with_context(|| format!("request to {path} failed"))?;
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }

        Ok(())
    }
}

fn display_name(user: &UserProfile) -> &str {
    user.name.as_deref().unwrap_or(&user.email)
}
