//! Trust Store - custom certificate authorities for coordinator connections
//!
//! A trust bundle is a text file of concatenated PEM certificate blocks. The
//! whole bundle is parsed and every block is validated as a trust anchor
//! before anything is installed, so a single bad block rejects the bundle and
//! the trust store is left exactly as it was.
//!
//! # Critical Invariants
//!
//! - **Atomic install**: either every block of a bundle is installed or none is
//! - **Strict blocks**: each block must decode to one X.509 certificate usable
//!   as a root; markers must pair up BEGIN/END with no nesting

use rustls::RootCertStore;
use rustls_pki_types::pem::{self, PemObject};
use rustls_pki_types::CertificateDer;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const END_MARKER: &str = "-----END CERTIFICATE-----";

/// Errors raised while loading a trust bundle
#[derive(Debug, Error)]
pub enum TrustLoadError {
    #[error("cannot read trust bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trust bundle contains no certificate blocks")]
    Empty,

    #[error("certificate block {block} is not valid base64: {message}")]
    InvalidBase64 { block: usize, message: String },

    #[error("certificate block {block} is not a usable root certificate: {message}")]
    InvalidCertificate { block: usize, message: String },

    #[error("certificate block {block} is malformed: {message}")]
    Malformed { block: usize, message: String },

    #[error("certificate block {block} is missing its END marker")]
    Unterminated { block: usize },

    #[error("unexpected '{marker}' on line {line}")]
    UnexpectedMarker { line: usize, marker: &'static str },

    #[error("illegal section start '{text}'")]
    IllegalMarker { text: String },

    #[error("TLS stack rejected the trust bundle: {message}")]
    Rejected { message: String },
}

/// A single trusted root, stored as DER
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificate {
    der: Vec<u8>,
}

impl TrustedCertificate {
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

/// Ordered, fully parsed set of certificate blocks
///
/// # Example
/// ```
/// use grid_worker_core::trust::TrustBundle;
///
/// let err = TrustBundle::parse("no certificates here").unwrap_err();
/// assert_eq!(err.to_string(), "trust bundle contains no certificate blocks");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TrustBundle {
    certificates: Vec<TrustedCertificate>,
}

impl TrustBundle {
    /// Parse PEM text into validated certificate blocks
    ///
    /// Lines outside BEGIN/END pairs are ignored (bundles often carry
    /// comments or subject names between blocks), as are PEM sections of
    /// other kinds.
    pub fn parse(pem: &str) -> Result<Self, TrustLoadError> {
        check_markers(pem)?;

        let mut certificates = Vec::new();
        for item in CertificateDer::pem_slice_iter(pem.as_bytes()) {
            let block = certificates.len() + 1;
            let der = item.map_err(|e| pem_error(block, e))?;
            let bytes = der.to_vec();
            RootCertStore::empty()
                .add(der)
                .map_err(|e| TrustLoadError::InvalidCertificate {
                    block,
                    message: e.to_string(),
                })?;
            certificates.push(TrustedCertificate { der: bytes });
        }

        if certificates.is_empty() {
            return Err(TrustLoadError::Empty);
        }

        Ok(Self { certificates })
    }

    /// Read and parse a bundle file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TrustLoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TrustLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn certificates(&self) -> &[TrustedCertificate] {
        &self.certificates
    }
}

/// Roots trusted by the coordinator connections of one run
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    roots: Vec<TrustedCertificate>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every certificate of a parsed bundle, returning how many were added
    pub fn install(&mut self, bundle: TrustBundle) -> usize {
        let added = bundle.certificates.len();
        self.roots.extend(bundle.certificates);
        added
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[TrustedCertificate] {
        &self.roots
    }
}

/// Reject nested BEGIN and stray END certificate markers
///
/// The PEM reader silently restarts a section on a second BEGIN and skips an
/// END with no open section; either would drop a block without an error.
fn check_markers(pem: &str) -> Result<(), TrustLoadError> {
    let mut open = false;
    for (index, raw_line) in pem.lines().enumerate() {
        let line = raw_line.trim_end();
        let marker = if line == BEGIN_MARKER {
            BEGIN_MARKER
        } else if line == END_MARKER {
            END_MARKER
        } else {
            continue;
        };
        if open == (marker == BEGIN_MARKER) {
            return Err(TrustLoadError::UnexpectedMarker {
                line: index + 1,
                marker,
            });
        }
        open = !open;
    }
    Ok(())
}

fn pem_error(block: usize, error: pem::Error) -> TrustLoadError {
    match error {
        pem::Error::Base64Decode(message) => TrustLoadError::InvalidBase64 { block, message },
        pem::Error::MissingSectionEnd { .. } => TrustLoadError::Unterminated { block },
        pem::Error::IllegalSectionStart { line } => TrustLoadError::IllegalMarker {
            text: String::from_utf8_lossy(&line).trim_end().to_string(),
        },
        other => TrustLoadError::Malformed {
            block,
            message: other.to_string(),
        },
    }
}
