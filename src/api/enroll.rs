use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    cert_sign_request::{san, HostCsr},
    config::ApiConfig,
    error::Result,
    transport::{ApiHeaders, Transport},
};

/// Handle on an accepted enrollment, redeemed once by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentTicket {
    pub tracking_id: String,
    pub subject: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrollPayload {
    csr: String,
    org_id: u32,
    cert_type: u32,
    number_servers: u32,
    server_type: i32,
    term: u32,
    comments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subj_alt_names: Option<String>,
}

fn build_payload(config: &ApiConfig, csr: &HostCsr) -> EnrollPayload {
    let alt_names = csr.alt_names();
    // multi-domain is a different product, not a CSR property
    let (cert_type, subj_alt_names) = if alt_names.is_empty() {
        (config.server_cert_type, None)
    } else {
        (config.multi_domain_cert_type, Some(san::joined(alt_names)))
    };
    EnrollPayload {
        csr: csr.base64_csr(),
        org_id: config.department,
        cert_type,
        number_servers: 0,
        server_type: config.server_type,
        term: config.term,
        comments: format!("Certificate request for {}", csr.subject()),
        subj_alt_names,
    }
}

fn tracking_id(body: &[u8], field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get(field)? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Submits one enrollment request.
///
/// A rejected request or a response without a tracking id gives `Ok(None)`
/// so the batch can go on; transport failures are returned as errors.
pub fn submit_request<T: Transport>(
    transport: &mut T,
    config: &ApiConfig,
    headers: &ApiHeaders,
    csr: &HostCsr,
) -> Result<Option<EnrollmentTicket>> {
    let payload = serde_json::to_value(build_payload(config, csr))?;
    let response = transport.post(&config.enroll_path, headers, &payload)?;
    let text = response.text();
    debug!("response text: {text}");

    if !response.is_ok() {
        warn!(
            "Request for {} rejected: HTTP {} {}",
            csr.subject(),
            response.status,
            response.reason
        );
        return Ok(None);
    }
    match tracking_id(&response.body, &config.tracking_field) {
        Some(tracking_id) => Ok(Some(EnrollmentTicket {
            tracking_id,
            subject: csr.subject(),
        })),
        None => {
            warn!(
                "No {} in the response for {}",
                config.tracking_field,
                csr.subject()
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::{
        api::testing::*,
        error::RequestError,
        hosts::HostRequest,
    };

    fn csr(cn: &str, alts: &[&str]) -> HostCsr {
        let host = HostRequest::new(cn, alts.iter().copied()).unwrap();
        HostCsr::build(&host, Path::new(".")).unwrap()
    }

    fn posted_body(api: &ScriptedApi) -> serde_json::Value {
        match &api.calls()[0] {
            Call::Post(_, body) => body.clone(),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn single_name_request() {
        let config = ApiConfig::default();
        let headers = ApiHeaders::new(&config, "drao");
        let csr = csr("a.example.org", &[]);
        let mut api = ScriptedApi::new([ok(r#"{"sslId": 1234, "renewId": "x"}"#)]);

        let ticket = submit_request(&mut api, &config, &headers, &csr)
            .unwrap()
            .unwrap();
        assert_eq!(
            ticket,
            EnrollmentTicket {
                tracking_id: "1234".into(),
                subject: "/CN=a.example.org".into(),
            }
        );

        let body = posted_body(&api);
        assert_eq!(
            body,
            json!({
                "csr": csr.base64_csr(),
                "orgId": 9732,
                "certType": 215,
                "numberServers": 0,
                "serverType": -1,
                "term": 395,
                "comments": "Certificate request for /CN=a.example.org",
            })
        );
        assert_eq!(
            api.calls()[0],
            Call::Post(config.enroll_path.clone(), body.clone())
        );
    }

    #[test]
    fn alt_names_switch_the_cert_type() {
        let config = ApiConfig::default();
        let headers = ApiHeaders::new(&config, "drao");
        let csr = csr("b.example.org", &["alt1.example.org", "alt2.example.org"]);
        let mut api = ScriptedApi::new([ok(r#"{"sslId": "77"}"#)]);

        let ticket = submit_request(&mut api, &config, &headers, &csr).unwrap();
        assert_eq!(ticket.unwrap().tracking_id, "77");
        let body = posted_body(&api);
        assert_eq!(body["certType"], 283);
        assert_eq!(body["subjAltNames"], "alt1.example.org,alt2.example.org");
    }

    #[test]
    fn rejected_request_gives_no_ticket() {
        let config = ApiConfig::default();
        let headers = ApiHeaders::new(&config, "drao");
        let csr = csr("a.example.org", &[]);
        let mut api = ScriptedApi::new([status(400, "Bad Request")]);
        assert_eq!(
            submit_request(&mut api, &config, &headers, &csr).unwrap(),
            None
        );
    }

    #[test]
    fn missing_tracking_id_gives_no_ticket() {
        let config = ApiConfig::default();
        let headers = ApiHeaders::new(&config, "drao");
        let csr = csr("a.example.org", &[]);
        let mut api = ScriptedApi::new([ok(r#"{"renewId": "x"}"#), ok("not json")]);
        assert_eq!(
            submit_request(&mut api, &config, &headers, &csr).unwrap(),
            None
        );
        assert_eq!(
            submit_request(&mut api, &config, &headers, &csr).unwrap(),
            None
        );
    }

    #[test]
    fn transport_errors_propagate() {
        let config = ApiConfig::default();
        let headers = ApiHeaders::new(&config, "drao");
        let csr = csr("a.example.org", &[]);
        let mut api = ScriptedApi::new([pending()]);
        let err = submit_request(&mut api, &config, &headers, &csr).unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }
}
