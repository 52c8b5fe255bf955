//! Auth subcommand: Google OAuth login / logout / status per owner.

use std::sync::Arc;

use clap::Subcommand;
use taskshoot_core::storage::{Config, SyncStateDb};
use taskshoot_core::sync::credentials::{
    load_client_credentials, store_client_credentials, CredentialStore, KeyringTokenStore,
};
use taskshoot_core::sync::{oauth, OAuthConfig};

use super::owner_or_default;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Google: login / logout / status
    Google {
        #[command(subcommand)]
        action: AuthOp,
    },
}

#[derive(Subcommand)]
pub enum AuthOp {
    /// Run the OAuth flow and store tokens for the owner
    Login {
        /// Owner to authenticate (defaults to "default")
        #[arg(long)]
        owner: Option<String>,
        /// OAuth client ID (stored in the keyring on first use)
        #[arg(long)]
        client_id: Option<String>,
        /// OAuth client secret (stored in the keyring on first use)
        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Remove stored tokens for the owner
    Logout {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Check authentication status for the owner
    Status {
        #[arg(long)]
        owner: Option<String>,
    },
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Google { action } => match action {
            AuthOp::Login {
                owner,
                client_id,
                client_secret,
            } => login(owner_or_default(owner), client_id, client_secret),
            AuthOp::Logout { owner } => logout(owner_or_default(owner)),
            AuthOp::Status { owner } => status(owner_or_default(owner)),
        },
    }
}

fn oauth_config() -> Result<OAuthConfig, Box<dyn std::error::Error>> {
    let (client_id, client_secret) = load_client_credentials()?
        .ok_or("Google client_id / client_secret not configured. Pass --client-id and --client-secret once.")?;
    let config = Config::load()?;
    Ok(OAuthConfig {
        redirect_port: config.oauth.redirect_port,
        ..OAuthConfig::google(client_id, client_secret)
    })
}

fn login(
    owner: String,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(id), Some(secret)) = (&client_id, &client_secret) {
        store_client_credentials(id, secret)?;
    }
    let config = oauth_config()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let tokens = runtime.block_on(oauth::authorize(&config))?;

    let credentials = CredentialStore::new(config, Arc::new(KeyringTokenStore));
    credentials.store_tokens(&owner, &tokens)?;

    // A fresh grant clears any pending reconnect flag.
    let db = SyncStateDb::open()?;
    db.set_reconnect_required(&owner, false)?;

    println!("Authenticated {owner} with Google Calendar.");
    Ok(())
}

fn logout(owner: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = OAuthConfig::google("", "");
    let credentials = CredentialStore::new(config, Arc::new(KeyringTokenStore));
    credentials.clear_tokens(&owner)?;
    println!("Removed Google Calendar tokens for {owner}.");
    Ok(())
}

fn status(owner: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = OAuthConfig::google("", "");
    let credentials = CredentialStore::new(config, Arc::new(KeyringTokenStore));

    if !credentials.is_authenticated(&owner) {
        println!("{owner}: not authenticated");
        return Ok(());
    }

    let db = SyncStateDb::open()?;
    if db.reconnect_required(&owner)? {
        println!("{owner}: reconnect required (refresh token rejected); run `auth google login`");
    } else {
        println!("{owner}: authenticated");
    }
    Ok(())
}
