use crate::{
    ServerKey,
    decode_key_material,
};
use anyhow::{
    Context,
    Result,
    anyhow,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const KEYSTORE_EXTENSION: &str = "wallet";

/// A forc-wallet directory holding `<name>.wallet` keystores that can be
/// unlocked into server keys.
#[derive(Clone, Debug)]
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `dir` with `~` expanded, or `~/.fuel/wallets` when absent.
    pub fn open(dir: Option<&str>) -> Result<Self> {
        let dir = match dir {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            None => {
                let home = std::env::var("HOME").context("HOME environment variable not set")?;
                Path::new(&home).join(".fuel").join("wallets")
            }
        };
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the keystores present, sorted. A missing directory holds none.
    pub fn names(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("reading wallet directory {}", self.dir.display()))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.context("reading wallet entry")?.path();
            let is_keystore = path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(KEYSTORE_EXTENSION);
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()).filter(|_| is_keystore) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{name}.{KEYSTORE_EXTENSION}"));
        if !path.is_file() {
            return Err(anyhow!("wallet '{name}' not found in {}", self.dir.display()));
        }
        Ok(path)
    }

    /// Prompts for the password of `name` and decrypts it into a server key
    /// carrying the keystore's name.
    pub fn unlock(&self, name: &str) -> Result<ServerKey> {
        let path = self.path_of(name)?;
        let password = prompt_password(format!("Enter password for wallet '{name}': "))
            .context("reading wallet password")?;
        let material = decrypt_key(&path, password.as_bytes())
            .map_err(|_| anyhow!("invalid password for wallet '{name}'"))?;
        let key = ServerKey::new(name, decode_key_material(name, &material)?);
        tracing::info!("unlocked {} ({})", key.name(), key.address_hex());
        Ok(key)
    }

    /// Unlocks `names` in order; the first becomes the primary signer.
    pub fn unlock_all(&self, names: &[String]) -> Result<Vec<ServerKey>> {
        names.iter().map(|name| self.unlock(name)).collect()
    }
}
