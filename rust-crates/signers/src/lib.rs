//! Server wallet credentials for the dispatch pool.
//!
//! Keys come either from the environment (`SERVER_WALLET_KEY`,
//! `SERVER_WALLET_KEY_2`, ...) or from forc-wallet keystores.

use anyhow::{
    Context,
    Result,
    anyhow,
};
use fuels::{
    crypto::SecretKey,
    prelude::{
        Provider,
        Wallet,
        derivation::DEFAULT_DERIVATION_PATH,
        private_key::PrivateKeySigner,
    },
    types::Address,
};
use wallet_dispatch::SignerSpec;

pub mod env;
pub mod keystore;

pub use env::{
    server_keys_from_env,
    server_keys_from_lookup,
};
pub use keystore::Keystore;

/// One server wallet able to sign ledger updates.
#[derive(Clone, Debug)]
pub struct ServerKey {
    name: String,
    signer: PrivateKeySigner,
}

impl ServerKey {
    pub fn new(name: impl Into<String>, secret: SecretKey) -> Self {
        Self {
            name: name.into(),
            signer: PrivateKeySigner::new(secret),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn address_hex(&self) -> String {
        format!("{:#x}", self.address())
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Wallet bound to `provider`, for issuing contract calls.
    pub fn connect(&self, provider: &Provider) -> Wallet {
        Wallet::new(self.signer.clone(), provider.clone())
    }

    pub fn into_spec(self) -> SignerSpec<PrivateKeySigner> {
        let address = self.address_hex();
        SignerSpec::new(self.name, address, self.signer)
    }
}

pub fn into_specs(keys: Vec<ServerKey>) -> Vec<SignerSpec<PrivateKeySigner>> {
    keys.into_iter().map(ServerKey::into_spec).collect()
}

/// Accepts raw key bytes or a UTF-8 mnemonic of at least 12 words.
pub fn decode_key_material(name: &str, material: &[u8]) -> Result<SecretKey> {
    if let Ok(secret_key) = SecretKey::try_from(material) {
        return Ok(secret_key);
    }

    if let Ok(mnemonic) = std::str::from_utf8(material) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            let private_key = SecretKey::new_from_mnemonic_phrase_with_path(
                mnemonic.trim(),
                DEFAULT_DERIVATION_PATH,
            )?;
            return Ok(private_key);
        }
    }

    Err(anyhow!("Wallet '{name}' contained unsupported key material"))
}

/// Parses a hex private key (with or without `0x`) or a mnemonic phrase.
pub fn parse_secret(name: &str, raw: &str) -> Result<SecretKey> {
    let trimmed = raw.trim();
    let cleaned = trimmed.trim_start_matches("0x");
    if cleaned.len() == 64 && cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        let bytes = hex::decode(cleaned)
            .with_context(|| format!("decoding private key for '{name}'"))?;
        return decode_key_material(name, &bytes);
    }
    decode_key_material(name, trimmed.as_bytes())
}
