// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PEM loading for the admission webhook listener.

use rustls::ServerConfig;
use rustls::crypto::ring::{self, sign};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls_pemfile::Item;
use snafu::{ResultExt, Snafu};
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("read '{}' error: {}", path, source))]
    ReadFile { path: String, source: io::Error },

    #[snafu(display("parse certificate error"))]
    InvalidCertificate { source: io::Error },

    #[snafu(display("no certificate"))]
    NonCertificate,

    #[snafu(display("parse private key error"))]
    InvalidPrivateKey { source: io::Error },

    #[snafu(display("no private key"))]
    NonPrivateKey,

    #[snafu(display("key pair match failed"))]
    MatchFailed { source: rustls::Error },

    #[snafu(display("no supported sign type"))]
    NoSupportedSignType { source: rustls::Error },

    #[snafu(display("no supported pem type"))]
    NoSupportedPEMType,

    #[snafu(display("build tls server config error: {}", source))]
    ServerConfig { source: rustls::Error },
}

fn load_certs(cert: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(cert))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .context(InvalidCertificateSnafu)?;

    if certs.is_empty() {
        return NonCertificateSnafu.fail();
    }

    Ok(certs)
}

fn load_private_key(private_key: &[u8]) -> Result<PrivateKeyDer<'static>, Error> {
    let item = rustls_pemfile::read_one(&mut Cursor::new(private_key))
        .context(InvalidPrivateKeySnafu)?
        .ok_or(Error::NonPrivateKey)?;

    // only pkcs8/pkcs1/sec1 supported
    match item {
        Item::Pkcs8Key(key) => Ok(key.into()),
        Item::Pkcs1Key(key) => Ok(key.into()),
        Item::Sec1Key(key) => Ok(key.into()),
        _ => NoSupportedPEMTypeSnafu.fail(),
    }
}

pub fn x509_key_pair<T: AsRef<[u8]>>(cert_pem: T, key_pem: T) -> Result<(), Error> {
    let certs = load_certs(cert_pem.as_ref())?;
    let private_key = load_private_key(key_pem.as_ref())?;

    let signing_key = sign::any_supported_type(&private_key).context(NoSupportedSignTypeSnafu)?;

    let certified_key = CertifiedKey::new(certs, signing_key);
    certified_key.keys_match().context(MatchFailedSnafu)
}

/// Server config for the webhook listener. The ring provider is passed
/// explicitly so no process-wide default needs to be installed.
pub fn server_config<T: AsRef<[u8]>>(cert_pem: T, key_pem: T) -> Result<ServerConfig, Error> {
    x509_key_pair(cert_pem.as_ref(), key_pem.as_ref())?;

    let certs = load_certs(cert_pem.as_ref())?;
    let private_key = load_private_key(key_pem.as_ref())?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context(ServerConfigSnafu)?
        .with_no_client_auth()
        .with_single_cert(certs, private_key)
        .context(ServerConfigSnafu)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

pub async fn server_config_from_files(
    cert_file: &Path,
    key_file: &Path,
) -> Result<ServerConfig, Error> {
    let cert_pem = tokio::fs::read(cert_file).await.context(ReadFileSnafu {
        path: cert_file.display().to_string(),
    })?;
    let key_pem = tokio::fs::read(key_file).await.context(ReadFileSnafu {
        path: key_file.display().to_string(),
    })?;

    server_config(cert_pem, key_pem)
}
