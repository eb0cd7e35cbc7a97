use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ghostkey::keystore;
use ghostkey::{
    dearmor_certificate, generate_delegate_from_metadata, sign_message, verify, verify_message,
    DelegateMetadata, KeyPair, MessageSignature,
};
use rand::rngs::OsRng;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Authority and donor tooling for Freenet ghost key donation certificates.
#[derive(Parser, Debug)]
#[command(name = "ghostkey", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new master keypair
    GenerateMasterKey {
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Replace existing key files
        #[arg(long)]
        overwrite: bool,
    },
    /// Derive the master public key file from the master private key
    GenerateVerifyingKey {
        #[arg(long, value_name = "FILE", env = "GHOSTKEY_MASTER_KEY_FILE")]
        master_key_file: PathBuf,
        #[arg(long, value_name = "FILE")]
        output_file: PathBuf,
        #[arg(long)]
        overwrite: bool,
        /// Read the key even if group or others can access it
        #[arg(long)]
        ignore_permissions: bool,
    },
    /// Generate a delegate key and certificate for one amount
    GenerateDelegate {
        #[arg(long, value_name = "FILE", env = "GHOSTKEY_MASTER_KEY_FILE")]
        master_key_file: PathBuf,
        /// Metadata as JSON: {"action":"donation","amount":20,"created_at":1700000000}
        #[arg(
            long,
            value_name = "JSON",
            conflicts_with = "amount",
            required_unless_present = "amount"
        )]
        metadata: Option<String>,
        /// Shorthand for a donation delegate created now
        #[arg(long, value_name = "N")]
        amount: Option<u64>,
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Replace existing delegate files
        #[arg(long)]
        overwrite: bool,
        /// Read the master key even if group or others can access it
        #[arg(long)]
        ignore_permissions: bool,
    },
    /// Check a delegate certificate against the master public key
    VerifyDelegate {
        #[arg(long, value_name = "FILE", env = "GHOSTKEY_MASTER_PUBLIC_KEY_FILE")]
        master_public_key_file: PathBuf,
        #[arg(long, value_name = "FILE")]
        delegate_certificate_file: PathBuf,
    },
    /// Check a donor certificate against the master public key
    ///
    /// The file needs only the certificate block; a key block is ignored.
    VerifyCertificate {
        #[arg(long, value_name = "FILE", env = "GHOSTKEY_MASTER_PUBLIC_KEY_FILE")]
        master_public_key_file: PathBuf,
        #[arg(long, value_name = "FILE")]
        certificate_file: PathBuf,
    },
    /// Sign a message with the donor key from an exported certificate
    SignMessage {
        /// Exported certificate including its private key block
        #[arg(long, value_name = "FILE")]
        certificate_file: PathBuf,
        #[arg(long, value_name = "STRING", conflicts_with = "message_file")]
        message: Option<String>,
        #[arg(long, value_name = "FILE", required_unless_present = "message")]
        message_file: Option<PathBuf>,
        /// Where to write the signature; stdout when omitted
        #[arg(long, value_name = "FILE")]
        output_file: Option<PathBuf>,
        #[arg(long)]
        overwrite: bool,
        /// Read the certificate even if group or others can access it
        #[arg(long)]
        ignore_permissions: bool,
    },
    /// Check a message signature and the certificate chain behind it
    VerifySignature {
        #[arg(long, value_name = "FILE", env = "GHOSTKEY_MASTER_PUBLIC_KEY_FILE")]
        master_public_key_file: PathBuf,
        #[arg(long, value_name = "STRING", conflicts_with = "message_file")]
        message: Option<String>,
        #[arg(long, value_name = "FILE", required_unless_present = "message")]
        message_file: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        signature_file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before 1970")?
        .as_secs())
}

/// `--metadata` wins when given; `--amount` makes a donation stamped `now`.
fn resolve_metadata(
    metadata: Option<String>,
    amount: Option<u64>,
    now: impl FnOnce() -> Result<u64>,
) -> Result<DelegateMetadata> {
    match (metadata, amount) {
        (Some(json), _) => {
            serde_json::from_str::<DelegateMetadata>(&json).context("parsing --metadata")
        }
        (None, Some(amount)) => Ok(DelegateMetadata::donation(amount, now()?)),
        (None, None) => bail!("either --metadata or --amount is required"),
    }
}

fn read_message(message: Option<String>, message_file: Option<PathBuf>) -> Result<Vec<u8>> {
    match (message, message_file) {
        (Some(text), _) => Ok(text.into_bytes()),
        (None, Some(path)) => {
            fs::read(&path).with_context(|| format!("reading {}", path.display()))
        }
        (None, None) => bail!("either --message or --message-file is required"),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::GenerateMasterKey {
            output_dir,
            overwrite,
        } => {
            let master = KeyPair::generate(&mut OsRng)?;
            let (private, public) = keystore::write_master_key(&output_dir, &master, overwrite)?;
            println!("master private key: {}", private.display());
            println!("master public key:  {}", public.display());
        }
        Command::GenerateVerifyingKey {
            master_key_file,
            output_file,
            overwrite,
            ignore_permissions,
        } => {
            let master = keystore::read_master_key(&master_key_file, ignore_permissions)
                .with_context(|| format!("reading {}", master_key_file.display()))?;
            keystore::write_master_public_key(&output_file, &master.public_key(), overwrite)?;
            println!("master public key: {}", output_file.display());
        }
        Command::GenerateDelegate {
            master_key_file,
            metadata,
            amount,
            output_dir,
            overwrite,
            ignore_permissions,
        } => {
            let master = keystore::read_master_key(&master_key_file, ignore_permissions)
                .with_context(|| format!("reading {}", master_key_file.display()))?;
            let metadata = resolve_metadata(metadata, amount, unix_now)?;
            let (delegate, cert) =
                generate_delegate_from_metadata(master.secret_key(), metadata, &mut OsRng)?;
            let (key_path, cert_path) =
                keystore::write_delegate(&output_dir, &delegate, &cert, overwrite)?;
            println!(
                "delegate for amount {}: {} {}",
                cert.amount(),
                key_path.display(),
                cert_path.display()
            );
        }
        Command::VerifyDelegate {
            master_public_key_file,
            delegate_certificate_file,
        } => {
            let master_pk = keystore::read_master_public_key(&master_public_key_file)?;
            let cert = keystore::read_delegate_certificate(&delegate_certificate_file)?;
            cert.verify(&master_pk)?;
            println!(
                "valid delegate certificate: action={} amount={} created_at={}",
                cert.metadata.action, cert.metadata.amount, cert.metadata.created_at
            );
        }
        Command::VerifyCertificate {
            master_public_key_file,
            certificate_file,
        } => {
            let master_pk = keystore::read_master_public_key(&master_public_key_file)?;
            let text = fs::read_to_string(&certificate_file)
                .with_context(|| format!("reading {}", certificate_file.display()))?;
            let cert = dearmor_certificate(&text)?;
            let info = verify(&cert, &master_pk)?;
            println!(
                "valid donation certificate: amount={} created_at={}",
                info.amount, info.created_at
            );
        }
        Command::SignMessage {
            certificate_file,
            message,
            message_file,
            output_file,
            overwrite,
            ignore_permissions,
        } => {
            let (cert, donor_key) =
                keystore::read_certificate_with_key(&certificate_file, ignore_permissions)
                    .with_context(|| format!("reading {}", certificate_file.display()))?;
            let message = read_message(message, message_file)?;
            let signed = sign_message(&donor_key, &cert, &message)?;
            match output_file {
                Some(path) => {
                    keystore::write_message_signature(&path, &signed, overwrite)?;
                    println!("signature: {}", path.display());
                }
                None => print!("{}", signed.to_armored()?),
            }
        }
        Command::VerifySignature {
            master_public_key_file,
            message,
            message_file,
            signature_file,
        } => {
            let master_pk = keystore::read_master_public_key(&master_public_key_file)?;
            let message = read_message(message, message_file)?;
            let text = fs::read_to_string(&signature_file)
                .with_context(|| format!("reading {}", signature_file.display()))?;
            let signed = MessageSignature::from_armored(&text)?;
            let info = verify_message(&message, &signed, &master_pk)?;
            println!(
                "valid signature from a donor: amount={} created_at={}",
                info.amount, info.created_at
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn amount_shorthand_stamps_now() -> Result<()> {
        let metadata = resolve_metadata(None, Some(20), || Ok(1_700_000_000))?;
        assert_eq!(metadata, DelegateMetadata::donation(20, 1_700_000_000));
        Ok(())
    }

    #[test]
    fn metadata_json_is_used_verbatim() -> Result<()> {
        let json = r#"{"action":"donation","amount":50,"timestamp":42}"#;
        let metadata = resolve_metadata(Some(json.into()), None, || bail!("clock not needed"))?;
        assert_eq!(metadata, DelegateMetadata::donation(50, 42));
        Ok(())
    }

    #[test]
    fn bad_metadata_and_missing_inputs_fail() {
        let unknown_field = r#"{"action":"donation","amount":5,"created_at":1,"extra":true}"#;
        assert!(resolve_metadata(Some(unknown_field.into()), None, || Ok(0)).is_err());
        assert!(resolve_metadata(None, None, || Ok(0)).is_err());
    }

    #[test]
    fn metadata_and_amount_conflict_on_the_command_line() {
        let both = Cli::try_parse_from([
            "ghostkey",
            "generate-delegate",
            "--master-key-file",
            "master.pem",
            "--metadata",
            "{}",
            "--amount",
            "20",
            "--output-dir",
            "out",
        ]);
        assert!(both.is_err());

        let parsed = Cli::try_parse_from([
            "ghostkey",
            "generate-delegate",
            "--master-key-file",
            "master.pem",
            "--amount",
            "20",
            "--output-dir",
            "out",
            "--ignore-permissions",
        ]);
        assert!(matches!(
            parsed,
            Ok(Cli {
                command: Command::GenerateDelegate {
                    amount: Some(20),
                    metadata: None,
                    ignore_permissions: true,
                    ..
                }
            })
        ));
    }

    #[test]
    fn message_comes_from_text_or_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("message.txt");
        fs::write(&path, b"from a file")?;

        assert_eq!(read_message(Some("inline".into()), None)?, b"inline".to_vec());
        assert_eq!(read_message(None, Some(path))?, b"from a file".to_vec());
        assert!(read_message(None, None).is_err());
        Ok(())
    }
}
