//! Private key and PKCS#10 request construction for one host.

use std::path::{Path, PathBuf};

use base64::prelude::*;
use rcgen::{CertificateParams, CertificateSigningRequest, KeyPair};

use crate::{error::Result, hosts::HostRequest};

pub mod dn;
pub mod san;

/// A freshly generated key and the CSR signed with it.
///
/// The key stays in memory until the request has been accepted by the API.
pub struct HostCsr {
    common_name: String,
    alt_names: Vec<String>,
    key_pair: KeyPair,
    request: CertificateSigningRequest,
    output_dir: PathBuf,
}

impl HostCsr {
    pub fn build(host: &HostRequest, output_dir: &Path) -> Result<Self> {
        dn::validate_common_name(host.common_name())?;

        let mut params = CertificateParams::default();
        params.distinguished_name = dn::subject(host.common_name());
        params.subject_alt_names = san::dns_sans(host.alt_names())?;

        let key_pair = KeyPair::generate()?;
        let request = params.serialize_request(&key_pair)?;

        Ok(Self {
            common_name: host.common_name().to_owned(),
            alt_names: host.alt_names().to_vec(),
            key_pair,
            request,
            output_dir: output_dir.to_owned(),
        })
    }

    pub fn alt_names(&self) -> &[String] {
        &self.alt_names
    }

    /// Subject line as shown to the operator and sent in the request comment.
    pub fn subject(&self) -> String {
        format!("/CN={}", self.common_name)
    }

    pub fn der(&self) -> &[u8] {
        self.request.der()
    }

    pub fn pem(&self) -> Result<String> {
        Ok(self.request.pem()?)
    }

    /// Body of the enroll request.
    pub fn base64_csr(&self) -> String {
        BASE64_STANDARD.encode(self.der())
    }

    pub fn private_key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn key_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.key", sanitize_file_name(&self.common_name)))
    }

    pub fn cert_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}-cert.pem", sanitize_file_name(&self.common_name)))
    }
}

/// Replaces everything outside `[A-Za-z0-9._-]`, notably the `/` of
/// `service/hostname`, with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use rcgen::{CertificateSigningRequestParams, DnType, DnValue, SanType};

    fn parse(csr: &HostCsr) -> CertificateSigningRequestParams {
        CertificateSigningRequestParams::from_der(csr.request.der()).unwrap()
    }

    fn dns_names(params: &CertificateSigningRequestParams) -> Vec<String> {
        params
            .params
            .subject_alt_names
            .iter()
            .map(|san| match san {
                SanType::DnsName(name) => name.as_str().to_owned(),
                other => panic!("unexpected san {other:?}"),
            })
            .collect()
    }

    fn common_name(params: &CertificateSigningRequestParams) -> String {
        match params.params.distinguished_name.get(&DnType::CommonName) {
            Some(DnValue::Utf8String(cn)) => cn.clone(),
            other => panic!("unexpected common name {other:?}"),
        }
    }

    #[test]
    fn subject_and_sans_match_the_request() {
        let alts = ["z.example.org", "alt1.example.org", "m.example.org"];
        for n in 0..=alts.len() {
            let host = HostRequest::new("b.example.org", alts[..n].iter().copied()).unwrap();
            let csr = HostCsr::build(&host, Path::new("/out")).unwrap();
            let parsed = parse(&csr);
            assert_eq!(common_name(&parsed), "b.example.org");
            assert_eq!(dns_names(&parsed), alts[..n]);
        }
    }

    #[test]
    fn service_common_name() {
        let host = HostRequest::new("rsv/host.example.org", Vec::<String>::new()).unwrap();
        let csr = HostCsr::build(&host, Path::new("/out")).unwrap();
        assert_eq!(common_name(&parse(&csr)), "rsv/host.example.org");
        assert_eq!(csr.subject(), "/CN=rsv/host.example.org");
        assert_eq!(csr.key_path(), Path::new("/out/rsv_host.example.org.key"));
        assert_eq!(
            csr.cert_path(),
            Path::new("/out/rsv_host.example.org-cert.pem")
        );
    }

    #[test]
    fn base64_body_decodes_to_der() {
        let host = HostRequest::new("a.example.org", Vec::<String>::new()).unwrap();
        let csr = HostCsr::build(&host, Path::new(".")).unwrap();
        let der = BASE64_STANDARD.decode(csr.base64_csr()).unwrap();
        assert_eq!(der, csr.der());
        assert!(csr.pem().unwrap().starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        assert!(csr.private_key_pem().contains("PRIVATE KEY"));
    }

    #[test]
    fn each_csr_has_its_own_key() {
        let host = HostRequest::new("a.example.org", Vec::<String>::new()).unwrap();
        let first = HostCsr::build(&host, Path::new(".")).unwrap();
        let second = HostCsr::build(&host, Path::new(".")).unwrap();
        assert_ne!(first.private_key_pem(), second.private_key_pem());
    }

    #[test]
    fn invalid_names_fail_validation() {
        let host = HostRequest::new("bad_host!", Vec::<String>::new()).unwrap();
        assert!(matches!(
            HostCsr::build(&host, Path::new(".")),
            Err(RequestError::Validation(_))
        ));
        let host = HostRequest::new("a.example.org", ["not a host"]).unwrap();
        assert!(matches!(
            HostCsr::build(&host, Path::new(".")),
            Err(RequestError::Validation(_))
        ));
    }
}
