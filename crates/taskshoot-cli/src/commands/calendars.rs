//! Calendars subcommand: list the calendars visible to an owner.

use std::sync::Arc;

use taskshoot_core::sync::credentials::{
    load_client_credentials, CredentialStore, KeyringTokenStore,
};
use taskshoot_core::sync::{CalendarApi, GcalClient, OAuthConfig};

use super::owner_or_default;

pub fn run(owner: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let owner = owner_or_default(owner);
    let (client_id, client_secret) = load_client_credentials()?.unwrap_or_default();
    let credentials = CredentialStore::new(
        OAuthConfig::google(client_id, client_secret),
        Arc::new(KeyringTokenStore),
    );
    let client = GcalClient::new();

    let runtime = tokio::runtime::Runtime::new()?;
    let calendars = runtime.block_on(async {
        let token = credentials.get_valid_token(&owner).await?;
        client.list_calendars(&token).await
    })?;

    if calendars.is_empty() {
        println!("No calendars visible to {owner}.");
        return Ok(());
    }
    for calendar in calendars {
        let marker = if calendar.primary { " (primary)" } else { "" };
        println!("{}  {}{}", calendar.id, calendar.summary, marker);
    }
    Ok(())
}
