//! Armored key and certificate files for the authority's tooling.
//!
//! Nothing is ever overwritten unless the caller asks for it, and the check
//! covers every output of an operation before the first file is written.
//! Files holding a secret key are refused on unix when group or others can
//! access them, unless the caller passes `ignore_permissions`.

use crate::armor::{armor, dearmor, import_certificate};
use crate::certificate::DonorCertificate;
use crate::delegate::DelegateCertificate;
use crate::error::{Error, Result};
use crate::keys::{public_key_from_bytes, KeyPair};
use crate::message::MessageSignature;
use blsttc::PublicKey;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MASTER_PRIVATE_KEY_LABEL: &str = "FREENET GHOSTKEY MASTER PRIVATE KEY";
pub const MASTER_PUBLIC_KEY_LABEL: &str = "FREENET GHOSTKEY MASTER PUBLIC KEY";
pub const DELEGATE_PRIVATE_KEY_LABEL: &str = "FREENET GHOSTKEY DELEGATE PRIVATE KEY";
pub const DELEGATE_CERTIFICATE_LABEL: &str = "FREENET GHOSTKEY DELEGATE CERTIFICATE";

pub const MASTER_PRIVATE_KEY_FILE: &str = "master_private_key.pem";
pub const MASTER_PUBLIC_KEY_FILE: &str = "master_public_key.pem";
pub const DELEGATE_PRIVATE_KEY_FILE: &str = "delegate_private_key.pem";
pub const DELEGATE_CERTIFICATE_FILE: &str = "delegate_certificate.pem";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Secrecy {
    Public,
    Private,
}

struct Output {
    path: PathBuf,
    contents: String,
    secrecy: Secrecy,
}

fn write_all(outputs: &[Output], overwrite: bool) -> Result<()> {
    if !overwrite {
        if let Some(existing) = outputs.iter().find(|o| o.path.exists()) {
            return Err(Error::OutputExists(existing.path.clone()));
        }
    }
    for output in outputs {
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            // still refuses if the file appeared after the check above
            options.create_new(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if output.secrecy == Secrecy::Private {
                options.mode(0o600);
            }
        }
        let mut file = options.open(&output.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                Error::OutputExists(output.path.clone())
            } else {
                Error::Io(e)
            }
        })?;
        file.write_all(output.contents.as_bytes())?;
        tracing::info!(path = %output.path.display(), "wrote file");
    }
    Ok(())
}

fn read_armored(path: &Path, label: &str) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)?;
    dearmor(label, &text)
}

/// Fails with [`Error::InsecurePermissions`] if group or others have any
/// access to `path`.
pub fn check_private_permissions(path: &Path, ignore_permissions: bool) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            if !ignore_permissions {
                return Err(Error::InsecurePermissions {
                    path: path.to_path_buf(),
                    mode,
                });
            }
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode),
                "ignoring loose key file permissions"
            );
        }
    }
    #[cfg(not(unix))]
    let _ = (path, ignore_permissions);
    Ok(())
}

fn read_private_armored(path: &Path, label: &str, ignore_permissions: bool) -> Result<Vec<u8>> {
    check_private_permissions(path, ignore_permissions)?;
    read_armored(path, label)
}

/// Writes the master keypair into `dir`, returning the private and public
/// key paths.
pub fn write_master_key(
    dir: &Path,
    master: &KeyPair,
    overwrite: bool,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let private = dir.join(MASTER_PRIVATE_KEY_FILE);
    let public = dir.join(MASTER_PUBLIC_KEY_FILE);
    write_all(
        &[
            Output {
                path: private.clone(),
                contents: armor(MASTER_PRIVATE_KEY_LABEL, &master.secret_key_bytes()),
                secrecy: Secrecy::Private,
            },
            Output {
                path: public.clone(),
                contents: armor(MASTER_PUBLIC_KEY_LABEL, &master.public_key_bytes()),
                secrecy: Secrecy::Public,
            },
        ],
        overwrite,
    )?;
    Ok((private, public))
}

/// Writes a delegate key and its certificate into `dir`, returning the key
/// and certificate paths.
pub fn write_delegate(
    dir: &Path,
    delegate: &KeyPair,
    certificate: &DelegateCertificate,
    overwrite: bool,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let private = dir.join(DELEGATE_PRIVATE_KEY_FILE);
    let cert = dir.join(DELEGATE_CERTIFICATE_FILE);
    write_all(
        &[
            Output {
                path: private.clone(),
                contents: armor(DELEGATE_PRIVATE_KEY_LABEL, &delegate.secret_key_bytes()),
                secrecy: Secrecy::Private,
            },
            Output {
                path: cert.clone(),
                contents: armor(DELEGATE_CERTIFICATE_LABEL, &certificate.to_bytes()?),
                secrecy: Secrecy::Public,
            },
        ],
        overwrite,
    )?;
    Ok((private, cert))
}

/// Writes just the master public key, e.g. one derived from a private key
/// file.
pub fn write_master_public_key(path: &Path, master: &PublicKey, overwrite: bool) -> Result<()> {
    write_all(
        &[Output {
            path: path.to_path_buf(),
            contents: armor(MASTER_PUBLIC_KEY_LABEL, &master.to_bytes()),
            secrecy: Secrecy::Public,
        }],
        overwrite,
    )
}

/// Writes an armored message signature. It holds no secrets.
pub fn write_message_signature(
    path: &Path,
    signature: &MessageSignature,
    overwrite: bool,
) -> Result<()> {
    write_all(
        &[Output {
            path: path.to_path_buf(),
            contents: signature.to_armored()?,
            secrecy: Secrecy::Public,
        }],
        overwrite,
    )
}

pub fn read_master_key(path: &Path, ignore_permissions: bool) -> Result<KeyPair> {
    let bytes = read_private_armored(path, MASTER_PRIVATE_KEY_LABEL, ignore_permissions)?;
    KeyPair::from_secret_bytes(&bytes)
}

pub fn read_master_public_key(path: &Path) -> Result<PublicKey> {
    public_key_from_bytes(&read_armored(path, MASTER_PUBLIC_KEY_LABEL)?)
}

pub fn read_delegate_key(path: &Path, ignore_permissions: bool) -> Result<KeyPair> {
    let bytes = read_private_armored(path, DELEGATE_PRIVATE_KEY_LABEL, ignore_permissions)?;
    KeyPair::from_secret_bytes(&bytes)
}

/// Reads a donor's exported certificate together with its secret key.
pub fn read_certificate_with_key(
    path: &Path,
    ignore_permissions: bool,
) -> Result<(DonorCertificate, KeyPair)> {
    check_private_permissions(path, ignore_permissions)?;
    import_certificate(&fs::read_to_string(path)?)
}

pub fn read_delegate_certificate(path: &Path) -> Result<DelegateCertificate> {
    DelegateCertificate::from_bytes(&read_armored(path, DELEGATE_CERTIFICATE_LABEL)?)
}

/// Loads a delegate key and certificate written by [`write_delegate`],
/// checking that they belong together.
pub fn read_delegate(
    dir: &Path,
    ignore_permissions: bool,
) -> Result<(KeyPair, DelegateCertificate)> {
    let key = read_delegate_key(&dir.join(DELEGATE_PRIVATE_KEY_FILE), ignore_permissions)?;
    let cert = read_delegate_certificate(&dir.join(DELEGATE_CERTIFICATE_FILE))?;
    if cert.delegate_public_key != key.public_key_bytes().to_vec() {
        return Err(Error::MalformedInput(format!(
            "delegate key in {} does not match its certificate",
            dir.display()
        )));
    }
    Ok((key, cert))
}
