use crate::{
    ServerKey,
    parse_secret,
};
use anyhow::{
    Result,
    bail,
};

const PRIMARY_KEY_VAR: &str = "SERVER_WALLET_KEY";
const MAX_SERVER_KEYS: usize = 16;

fn key_var(slot: usize) -> String {
    if slot == 1 {
        PRIMARY_KEY_VAR.to_owned()
    } else {
        format!("{PRIMARY_KEY_VAR}_{slot}")
    }
}

fn key_name(slot: usize) -> String {
    if slot == 1 {
        "Wallet-1 (Primary)".to_owned()
    } else {
        format!("Wallet-{slot}")
    }
}

/// Reads server keys from the process environment.
pub fn server_keys_from_env() -> Result<Vec<ServerKey>> {
    server_keys_from_lookup(|var| std::env::var(var).ok())
}

/// Scans `SERVER_WALLET_KEY` and `SERVER_WALLET_KEY_2` through
/// `SERVER_WALLET_KEY_16`. Unset or blank slots are skipped; the signer keeps
/// the name of its slot.
pub fn server_keys_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Vec<ServerKey>> {
    let mut keys = Vec::new();
    for slot in 1..=MAX_SERVER_KEYS {
        let var = key_var(slot);
        let Some(raw) = lookup(&var).filter(|raw| !raw.trim().is_empty()) else {
            continue;
        };
        let name = key_name(slot);
        let secret = parse_secret(&name, &raw)?;
        let key = ServerKey::new(name, secret);
        tracing::info!("loaded {} from {var}: {}", key.name(), key.address_hex());
        keys.push(key);
    }
    if keys.is_empty() {
        bail!("no server wallet configured; set {PRIMARY_KEY_VAR}");
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use std::collections::HashMap;

    fn arb_key(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    fn arb_env(vars: Vec<(&str, String)>) -> HashMap<String, String> {
        vars.into_iter()
            .map(|(var, value)| (var.to_owned(), value))
            .collect()
    }

    #[test]
    fn server_keys_from_lookup__four_keys__names_them_by_slot() {
        // given
        let vars = arb_env(vec![
            ("SERVER_WALLET_KEY", arb_key(1)),
            ("SERVER_WALLET_KEY_2", arb_key(2)),
            ("SERVER_WALLET_KEY_3", arb_key(3)),
            ("SERVER_WALLET_KEY_4", arb_key(4)),
        ]);

        // when
        let keys = server_keys_from_lookup(|var| vars.get(var).cloned()).unwrap();

        // then
        let names: Vec<_> = keys.iter().map(ServerKey::name).collect();
        assert_eq!(
            names,
            vec!["Wallet-1 (Primary)", "Wallet-2", "Wallet-3", "Wallet-4"]
        );
    }

    #[test]
    fn server_keys_from_lookup__gap__skips_missing_slot() {
        // given
        let vars = arb_env(vec![
            ("SERVER_WALLET_KEY", arb_key(1)),
            ("SERVER_WALLET_KEY_3", arb_key(3)),
            ("SERVER_WALLET_KEY_4", "  ".to_owned()),
        ]);

        // when
        let keys = server_keys_from_lookup(|var| vars.get(var).cloned()).unwrap();

        // then
        let names: Vec<_> = keys.iter().map(ServerKey::name).collect();
        assert_eq!(names, vec!["Wallet-1 (Primary)", "Wallet-3"]);
    }

    #[test]
    fn server_keys_from_lookup__nothing_set__is_an_error() {
        let err = server_keys_from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("SERVER_WALLET_KEY"));
    }

    #[test]
    fn server_keys_from_lookup__bad_key__names_the_wallet() {
        // given
        let vars = arb_env(vec![
            ("SERVER_WALLET_KEY", arb_key(1)),
            ("SERVER_WALLET_KEY_2", "0xnothex".to_owned()),
        ]);

        // when
        let err = server_keys_from_lookup(|var| vars.get(var).cloned()).unwrap_err();

        // then
        assert!(err.to_string().contains("Wallet-2"));
    }
}
