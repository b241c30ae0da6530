//! TLS certificate parsing
//!
//! Secrets of type `kubernetes.io/tls` store a base64-encoded `tls.crt`.
//! The decoded bytes are usually PEM, occasionally raw DER; both are
//! handled. Only `not_after` is extracted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;

/// A certificate extracted from a TLS secret.
#[derive(Debug, Clone)]
pub struct ParsedCert {
    /// Full name of the owning secret, `Secret/<ns>/<name>`.
    pub secret: String,
    pub not_after: DateTime<Utc>,
}

/// Decode a secret's base64 `tls.crt` value and extract `not_after`.
pub fn parse_not_after(tls_crt_base64: &str) -> Result<DateTime<Utc>, String> {
    let decoded = BASE64
        .decode(tls_crt_base64.trim().as_bytes())
        .map_err(|e| format!("tls.crt is not valid base64: {e}"))?;
    not_after_from_bytes(&decoded)
}

/// Extract `not_after` from PEM or DER certificate bytes.
pub fn not_after_from_bytes(bytes: &[u8]) -> Result<DateTime<Utc>, String> {
    let der = if bytes.starts_with(b"-----BEGIN") {
        let (_, pem) =
            parse_x509_pem(bytes).map_err(|e| format!("invalid PEM in tls.crt: {e}"))?;
        pem.contents
    } else {
        bytes.to_vec()
    };

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| format!("invalid X.509 certificate: {e}"))?;
    let timestamp = cert.validity().not_after.timestamp();
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| "certificate notAfter out of range".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base64() {
        let err = parse_not_after("not base64 !!!").unwrap_err();
        assert!(err.contains("base64"));
    }

    #[test]
    fn rejects_bytes_that_are_not_a_certificate() {
        let not_cert = BASE64.encode(b"hello world");
        let err = parse_not_after(&not_cert).unwrap_err();
        assert!(err.contains("X.509"));
    }

    #[test]
    fn rejects_garbage_pem() {
        let pem = BASE64.encode(b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        assert!(parse_not_after(&pem).is_err());
    }
}
