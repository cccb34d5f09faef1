//! Staged batch run: build every CSR, submit them all, wait for approval,
//! then collect and store each certificate.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    api::{
        enroll::{submit_request, EnrollmentTicket},
        retrieve::{retrieve_cert, RetryPolicy},
    },
    artifact,
    cert_sign_request::HostCsr,
    config::ApiConfig,
    error::Result,
    hosts::{dedup_hosts, HostRequest},
    transport::{ApiHeaders, Connector, Transport},
    utils::{wait, Interrupt, Sleeper},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    /// Distinct hosts in the batch.
    pub requested: usize,
    /// Requests accepted with a tracking id.
    pub submitted: usize,
    pub retrieved: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requested, {} retrieved", self.requested, self.retrieved)
    }
}

pub struct BatchSettings<'a> {
    pub api: &'a ApiConfig,
    pub headers: &'a ApiHeaders,
    pub output_dir: &'a Path,
    pub approval_wait: Duration,
    pub retry: RetryPolicy,
    /// Checked between steps; a raised interrupt ends the run with
    /// `RequestError::Interrupted` once the current step is done.
    pub interrupt: &'a Interrupt,
}

struct Accepted {
    ticket: EnrollmentTicket,
    cert_path: PathBuf,
}

fn build_csrs(hosts: &[HostRequest], output_dir: &Path) -> Result<Vec<HostCsr>> {
    info!("Beginning request process for the following certificate(s):");
    info!("{}", "=".repeat(60));
    let csrs = hosts
        .iter()
        .map(|host| -> Result<HostCsr> {
            info!("CN: {}, SANS: {:?}", host.common_name(), host.alt_names());
            let csr = HostCsr::build(host, output_dir)?;
            debug!("{}", csr.pem()?);
            Ok(csr)
        })
        .collect::<Result<Vec<_>>>()?;
    info!("{}", "=".repeat(60));
    Ok(csrs)
}

/// Submits every CSR on one connection and writes the key of each accepted
/// request. Rejected hosts are skipped.
fn submit_all<T: Transport>(
    conn: &mut T,
    settings: &BatchSettings<'_>,
    csrs: Vec<HostCsr>,
) -> Result<Vec<Accepted>> {
    let mut accepted = Vec::new();
    for csr in csrs {
        settings.interrupt.check()?;
        info!("Requesting certificate for {}", csr.subject());
        match submit_request(conn, settings.api, settings.headers, &csr)? {
            Some(ticket) => {
                artifact::write_private_key(&csr.key_path(), csr.private_key_pem().as_bytes())?;
                accepted.push(Accepted {
                    ticket,
                    cert_path: csr.cert_path(),
                });
            }
            None => warn!("Skipping {}: no tracking id obtained", csr.subject()),
        }
    }
    Ok(accepted)
}

pub fn run_batch<C: Connector, S: Sleeper>(
    hosts: Vec<HostRequest>,
    settings: &BatchSettings<'_>,
    connector: &C,
    sleeper: &mut S,
) -> Result<Summary> {
    let hosts = dedup_hosts(hosts);
    let csrs = build_csrs(&hosts, settings.output_dir)?;
    settings.interrupt.check()?;
    let mut summary = Summary {
        requested: csrs.len(),
        ..Summary::default()
    };

    let mut conn = connector.connect()?;
    let submitted = submit_all(&mut conn, settings, csrs);
    // close before going idle, whatever the outcome
    conn.close();
    let accepted = submitted?;
    summary.submitted = accepted.len();

    if !accepted.is_empty() {
        wait(sleeper, settings.approval_wait, "for certificate approval...");
    }

    for Accepted { ticket, cert_path } in &accepted {
        settings.interrupt.check()?;
        info!("Retrieving certificate for {}", ticket.subject);
        let cert = retrieve_cert(
            connector,
            settings.api,
            settings.headers,
            ticket,
            &settings.retry,
            sleeper,
            settings.interrupt,
        )?;
        if let Some(cert) = cert {
            artifact::write_certificate(cert_path, &cert)?;
            summary.retrieved += 1;
        }
    }

    info!("{} certificates were specified", summary.requested);
    info!(
        "{} certificates were requested and {} retrieved successfully",
        summary.submitted, summary.retrieved
    );
    Ok(summary)
}
