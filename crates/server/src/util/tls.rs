// SPDX-License-Identifier: BSD-3-Clause

use std::fs;
use std::io::{self, BufReader};
use std::sync::Arc;

use anyhow::anyhow;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// Generates a self-signed certificate for the given subject alternative names.
///
/// Used when serving over TLS on localhost without a configured certificate.
pub fn generate_self_signed_cert(
  alt_names: Vec<String>,
) -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
  let certified = rcgen::generate_simple_self_signed(alt_names)?;

  let cert = certified.cert.der().clone();
  let key = PrivatePkcs8KeyDer::from(certified.signing_key.serialize_der());

  Ok((vec![cert], key.into()))
}

/// Creates a TLS server configuration from a certificate chain and its private key.
pub fn create_tls_config(
  certs: Vec<CertificateDer<'static>>,
  key: PrivateKeyDer<'static>,
) -> anyhow::Result<Arc<ServerConfig>> {
  let config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
  Ok(Arc::new(config))
}

/// Loads a PEM-encoded certificate chain.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid PEM, or holds no
/// certificate.
pub fn load_certs(filename: &str) -> anyhow::Result<Vec<CertificateDer<'static>>> {
  let mut reader = BufReader::new(fs::File::open(filename)?);
  let certs = load_certs_from_reader(&mut reader)?;

  if certs.is_empty() {
    return Err(anyhow!("no certificates found in {}", filename));
  }
  Ok(certs)
}

/// Loads a PEM-encoded private key.
///
/// PKCS#1, PKCS#8 and SEC1 keys are accepted. Encrypted keys are not.
pub fn load_private_key(filename: &str) -> anyhow::Result<PrivateKeyDer<'static>> {
  let mut reader = BufReader::new(fs::File::open(filename)?);
  load_key_from_reader(&mut reader).map_err(|err| anyhow!("{}: {}", filename, err))
}

fn load_certs_from_reader(rd: &mut dyn io::BufRead) -> io::Result<Vec<CertificateDer<'static>>> {
  rustls_pemfile::certs(rd).collect()
}

fn load_key_from_reader(rd: &mut dyn io::BufRead) -> anyhow::Result<PrivateKeyDer<'static>> {
  while let Some(item) = rustls_pemfile::read_one(rd)? {
    match item {
      rustls_pemfile::Item::Pkcs1Key(key) => return Ok(key.into()),
      rustls_pemfile::Item::Pkcs8Key(key) => return Ok(key.into()),
      rustls_pemfile::Item::Sec1Key(key) => return Ok(key.into()),
      _ => {},
    }
  }
  Err(anyhow!("no private key found (encrypted keys are not supported)"))
}
