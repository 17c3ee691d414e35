use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use ingest_core::config::{IngestConfig, ENV_KEYRING_PASSPHRASE, ENV_VAULT_SECRET};
use ingest_core::events::InboundEvent;
use ingest_core::keyring::{legacy_encrypt, KeyRingFile};
use ingest_core::service::{EventOutcome, IngestionService};
use ingest_core::stream::{decrypt, ArmorWriter, EncryptOptions, ARMOR_LABEL};
use ingest_core::vault::KeyVault;

#[derive(Subcommand)]
pub enum Commands {
    /// Process one inbound event
    Process {
        /// Worker configuration (TOML)
        #[arg(short, long, env = "INGEST_CONFIG")]
        config: PathBuf,

        /// Event JSON file, or `-` for stdin
        #[arg(short, long)]
        event: String,
    },

    /// Finish the execution this instance left unfinished, if any
    Resume {
        #[arg(short, long, env = "INGEST_CONFIG")]
        config: PathBuf,
    },

    /// Create a keyring with one fresh key pair
    KeyringNew {
        /// Where to write the keyring (must not exist)
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, env = ENV_KEYRING_PASSPHRASE, hide_env_values = true)]
        passphrase: String,
    },

    /// Encrypt a plaintext file to the first keyring key (legacy envelope)
    SealLegacy {
        #[arg(short, long)]
        keyring: PathBuf,

        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Write ASCII armor instead of binary
        #[arg(long)]
        armor: bool,
    },

    /// Decrypt a re-encrypted output with its sealed key
    Decrypt {
        #[arg(short, long)]
        input: PathBuf,

        /// `encryption_key` from the completion event
        #[arg(short = 'k', long)]
        sealed_key: String,

        #[arg(long, env = ENV_VAULT_SECRET, hide_env_values = true)]
        vault_secret: String,

        /// Output file, or stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Process { config, event } => process(&config, &event),
        Commands::Resume { config } => resume(&config),
        Commands::KeyringNew { out, passphrase } => keyring_new(&out, &passphrase),
        Commands::SealLegacy { keyring, input, output, armor } => seal_legacy(&keyring, &input, &output, armor),
        Commands::Decrypt { input, sealed_key, vault_secret, output } => {
            decrypt_output(&input, &sealed_key, &vault_secret, output.as_deref())
        }
    }
}

fn service(config: &Path) -> Result<IngestionService> {
    let config = IngestConfig::load(config).with_context(|| format!("loading {}", config.display()))?;
    info!(instance_id = %config.instance_id, "configuration loaded");
    IngestionService::from_config(&config).context("starting ingestion service")
}

fn process(config: &Path, event: &str) -> Result<()> {
    let text = if event == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("reading event from stdin")?;
        text
    } else {
        fs::read_to_string(event).with_context(|| format!("reading event {event}"))?
    };
    let event: InboundEvent = serde_json::from_str(&text).context("parsing event")?;

    let service = service(config)?;
    // A crashed predecessor's claim must finish before this instance can
    // take a new one.
    service.resume().context("resuming unfinished execution")?;

    match service.handle_event(&event).context("handling event")? {
        EventOutcome::Completed(status) => println!("{status}"),
        EventOutcome::Skipped { reason } => println!("SKIPPED: {reason}"),
        EventOutcome::Duplicate => println!("DUPLICATE"),
    }
    Ok(())
}

fn resume(config: &Path) -> Result<()> {
    let service = service(config)?;
    match service.resume().context("resuming unfinished execution")? {
        Some(result) => println!("{}", result.status()),
        None => println!("nothing to resume"),
    }
    Ok(())
}

fn keyring_new(out: &Path, passphrase: &str) -> Result<()> {
    if out.exists() {
        bail!("{} already exists", out.display());
    }
    if passphrase.is_empty() {
        bail!("passphrase must not be empty");
    }
    let ring = KeyRingFile::generate(passphrase).context("generating keyring")?;
    ring.save(out).with_context(|| format!("writing {}", out.display()))?;
    for key in &ring.keys {
        println!("{}", key.fingerprint);
    }
    Ok(())
}

fn seal_legacy(keyring: &Path, input: &Path, output: &Path, armor: bool) -> Result<()> {
    let ring = KeyRingFile::load(keyring).with_context(|| format!("reading {}", keyring.display()))?;
    let recipient = ring
        .public_keys()
        .context("reading keyring public keys")?
        .into_iter()
        .next()
        .context("keyring has no keys")?;

    let mut source = BufReader::new(File::open(input).with_context(|| format!("opening {}", input.display()))?);
    let sink = BufWriter::new(File::create(output).with_context(|| format!("creating {}", output.display()))?);

    let written = if armor {
        let armored = ArmorWriter::new(sink, ARMOR_LABEL)?;
        let mut writer = legacy_encrypt(armored, &recipient, EncryptOptions::default())?;
        io::copy(&mut source, &mut writer)?;
        let checksum = writer.finish()?;
        writer.into_inner().finish()?.flush()?;
        checksum
    } else {
        let mut writer = legacy_encrypt(sink, &recipient, EncryptOptions::default())?;
        io::copy(&mut source, &mut writer)?;
        let checksum = writer.finish()?;
        writer.into_inner().flush()?;
        checksum
    };
    println!("{}  {}", written.md5, input.display());
    Ok(())
}

fn decrypt_output(input: &Path, sealed_key: &str, vault_secret: &str, output: Option<&Path>) -> Result<()> {
    let vault = KeyVault::new(vault_secret)?;
    let key = vault.open(sealed_key).context("opening sealed key")?;
    let source = BufReader::new(File::open(input).with_context(|| format!("opening {}", input.display()))?);
    let mut reader = decrypt(source, key.as_bytes());

    let copied = match output {
        Some(path) => {
            let mut sink = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
            let n = io::copy(&mut reader, &mut sink)?;
            sink.flush()?;
            n
        }
        None => io::copy(&mut reader, &mut io::stdout().lock())?,
    };
    info!(bytes = copied, "decrypted");
    Ok(())
}
