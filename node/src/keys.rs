//! On-disk secrets: the node key and the API token.

use std::path::Path;

use shroud_crypto::{is_token, random_token, KeyWallet};

use crate::NodeError;

const API_TOKEN_LEN: usize = 32;

/// Load the node wallet, creating its key on first start.
pub fn load_wallet(path: &Path) -> Result<KeyWallet, NodeError> {
    Ok(KeyWallet::load_or_create(path)?)
}

/// Load the API token guarding write routes, creating it on first start.
pub fn load_or_create_api_token(path: &Path) -> Result<String, NodeError> {
    if path.exists() {
        let token = std::fs::read_to_string(path)?.trim().to_string();
        if !is_token(&token, API_TOKEN_LEN, API_TOKEN_LEN) {
            return Err(NodeError::Config(format!(
                "{}: malformed API token",
                path.display()
            )));
        }
        return Ok(token);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let token = random_token(API_TOKEN_LEN);
    std::fs::write(path, &token)?;
    tracing::info!(path = %path.display(), "created API token");
    Ok(token)
}
