//! Signed transactions.

use serde::{Deserialize, Serialize};
use shroud_crypto::{is_token, random_token, verify_signature, Wallet};
use shroud_types::{PublicKey, Signature};

use crate::command::Command;
use crate::error::LedgerError;

pub const MAX_IDENT_LEN: usize = 32;
pub const MAX_COMMANDS: usize = 128;
const DEFAULT_IDENT_LEN: usize = 8;

/// A list of commands signed by `origin`. `(origin, ident)` is unique within
/// a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub ident: String,
    pub origin: PublicKey,
    /// Unix milliseconds at creation.
    pub timestamp: u64,
    pub commands: Vec<Command>,
    pub sig: Signature,
}

impl Transaction {
    /// Build and sign a transaction. A random ident is drawn when none is given.
    pub fn create(
        wallet: &dyn Wallet,
        commands: Vec<Command>,
        ident: Option<&str>,
        timestamp: u64,
    ) -> Result<Self, LedgerError> {
        let ident = match ident {
            Some(i) => i.to_string(),
            None => random_token(DEFAULT_IDENT_LEN),
        };
        let origin = wallet.public_key();
        let bytes = signing_bytes(&ident, &origin, timestamp, &commands)?;
        let tx = Self {
            sig: wallet.sign(&bytes),
            ident,
            origin,
            timestamp,
            commands,
        };
        tx.check()?;
        Ok(tx)
    }

    /// Structure, command sequence and signature.
    pub fn check(&self) -> Result<(), LedgerError> {
        self.check_structure()?;
        let bytes = signing_bytes(&self.ident, &self.origin, self.timestamp, &self.commands)?;
        if !verify_signature(&bytes, &self.sig, &self.origin) {
            return Err(self.invalid("signature does not verify"));
        }
        Ok(())
    }

    /// Everything except the signature. Genesis transactions are only held
    /// to this standard.
    pub fn check_structure(&self) -> Result<(), LedgerError> {
        if !is_token(&self.ident, 1, MAX_IDENT_LEN) {
            return Err(self.invalid("malformed ident"));
        }
        if self.commands.is_empty() || self.commands.len() > MAX_COMMANDS {
            return Err(self.invalid("command count out of range"));
        }
        for (i, cmd) in self.commands.iter().enumerate() {
            cmd.check(i as u32 + 1)?;
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> LedgerError {
        LedgerError::InvalidTransaction {
            ident: self.ident.clone(),
            reason: reason.to_string(),
        }
    }
}

fn signing_bytes(
    ident: &str,
    origin: &PublicKey,
    timestamp: u64,
    commands: &[Command],
) -> Result<Vec<u8>, LedgerError> {
    Ok(bincode::serialize(&(ident, origin, timestamp, commands))?)
}
