//! Terminal credential prompts

use async_trait::async_trait;
use bulk_downloader::{CredentialProvider, Credentials};
use dialoguer::{Input, Password};
use std::io::IsTerminal;
use tracing::warn;

/// Uses command-line credentials first, then asks on the terminal
pub struct PromptCredentials {
    username: Option<String>,
    password: Option<String>,
}

impl PromptCredentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn credentials(&mut self, attempt: usize) -> Option<Credentials> {
        if attempt == 1 {
            if let (Some(username), Some(password)) = (self.username.clone(), self.password.take()) {
                return Some(Credentials::new(username, password));
            }
        }

        if !std::io::stdin().is_terminal() {
            warn!("No terminal available to ask for Earthdata credentials");
            return None;
        }

        let known_username = self.username.clone();
        let prompted = tokio::task::spawn_blocking(move || prompt(known_username)).await;
        match prompted {
            Ok(Ok(credentials)) => {
                self.username = Some(credentials.username().to_string());
                Some(credentials)
            }
            Ok(Err(e)) => {
                warn!("Credential prompt aborted: {}", e);
                None
            }
            Err(e) => {
                warn!("Credential prompt failed: {}", e);
                None
            }
        }
    }
}

fn prompt(known_username: Option<String>) -> dialoguer::Result<Credentials> {
    println!("\nPlease enter your Earthdata Login credentials");
    println!("If you do not have an account, register at https://urs.earthdata.nasa.gov\n");

    let mut input = Input::<String>::new().with_prompt("Username");
    if let Some(username) = known_username {
        input = input.default(username);
    }
    let username = input.interact_text()?;
    let password = Password::new()
        .with_prompt("Password (will not be displayed)")
        .interact()?;

    Ok(Credentials::new(username, password))
}
