mod simulate;

use anyhow::{
    Context,
    Result,
};
use clap::{
    Parser,
    Subcommand,
};
use fuels::crypto::SecretKey;
use signers::{
    Keystore,
    ServerKey,
    server_keys_from_env,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use wallet_dispatch::DispatchConfig;

use crate::simulate::SimulateArgs;

#[derive(Parser, Debug)]
#[command(
    name = "wallet-dispatch",
    about = "Inspect server wallets and exercise the transaction dispatcher",
    version
)]
struct Args {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured server wallets
    Wallets {
        #[command(flatten)]
        source: SignerSource,
    },
    /// Push synthetic requests through a dispatcher and report the outcome
    Simulate {
        #[command(flatten)]
        source: SignerSource,

        /// Use this many throwaway signers instead of configured wallets
        #[arg(long = "signers")]
        synthetic: Option<u8>,

        /// JSON dispatcher config (defaults to DISPATCH_* environment variables)
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        load: SimulateArgs,
    },
}

#[derive(clap::Args, Debug)]
struct SignerSource {
    /// forc-wallet keystore names to unlock instead of SERVER_WALLET_KEY*
    #[arg(long = "from-keystore")]
    from_keystore: Vec<String>,

    /// Override forc-wallet directory (defaults to ~/.fuel/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,
}

impl SignerSource {
    fn load(&self) -> Result<Vec<ServerKey>> {
        if self.from_keystore.is_empty() {
            return server_keys_from_env().context("loading SERVER_WALLET_KEY*");
        }
        Keystore::open(self.wallet_dir.as_deref())
            .context("resolving wallet directory")?
            .unlock_all(&self.from_keystore)
            .context("unlocking forc-wallet profiles")
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling::daily(dir, "combined.log"));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
    guard
}

/// Deterministic throwaway keys named like configured wallets.
fn synthetic_keys(count: u8) -> Result<Vec<ServerKey>> {
    (1..=count)
        .map(|slot| {
            let secret = SecretKey::try_from([slot; 32].as_slice())
                .map_err(|e| anyhow::anyhow!("deriving synthetic key {slot}: {e:?}"))?;
            let name = if slot == 1 {
                "Wallet-1 (Primary)".to_owned()
            } else {
                format!("Wallet-{slot}")
            };
            Ok(ServerKey::new(name, secret))
        })
        .collect()
}

fn print_wallets(source: &SignerSource) -> Result<()> {
    let keys = source.load()?;
    println!("{} server wallet(s):", keys.len());
    for key in &keys {
        println!("  {:<20} {}", key.name(), key.address_hex());
    }

    if source.from_keystore.is_empty() {
        let keystore = Keystore::open(source.wallet_dir.as_deref())?;
        let names = keystore.names()?;
        if !names.is_empty() {
            println!("keystores in {}:", keystore.dir().display());
            for name in names {
                println!("  {name}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(args.log_dir.as_deref());

    match args.command {
        Command::Wallets { source } => print_wallets(&source),
        Command::Simulate {
            source,
            synthetic,
            config,
            load,
        } => {
            let config = match config {
                Some(path) => DispatchConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => DispatchConfig::from_env().context("reading DISPATCH_* variables")?,
            };
            let keys = match synthetic {
                Some(count) => synthetic_keys(count)?,
                None => source.load()?,
            };
            let report = simulate::run(signers::into_specs(keys), &config, &load).await?;
            report.print();
            println!("{}", serde_json::to_string_pretty(&report.stats)?);
            Ok(())
        }
    }
}
