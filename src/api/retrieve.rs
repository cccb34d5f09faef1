//! Certificate collection with a bounded retry budget.
//!
//! The collect endpoint has no notification mechanism: while a certificate
//! is still being signed it answers with a response the HTTP layer can't
//! frame. That single shape ([`TransportError::Malformed`]) and non-200
//! answers are retried on a new connection after a fixed pause; every other
//! transport error ends the poll immediately.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::enroll::EnrollmentTicket;
use crate::{
    config::ApiConfig,
    error::Result,
    transport::{ApiHeaders, Connector, Transport},
    utils::{wait, Interrupt, Sleeper},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Retrying { attempts_remaining: u32 },
    Delivered(Vec<u8>),
    Exhausted,
}

fn collect_path(config: &ApiConfig, ticket: &EnrollmentTicket) -> String {
    format!(
        "{}{}{}",
        config.retrieve_path, ticket.tracking_id, config.certificate_format
    )
}

/// One collect call on its own connection. `Ok(None)` means "not yet".
fn attempt<C: Connector>(
    connector: &C,
    path: &str,
    headers: &ApiHeaders,
) -> Result<Option<Vec<u8>>> {
    let mut conn = connector.connect()?;
    let outcome = conn.get(path, headers);
    conn.close();
    match outcome {
        Ok(response) => {
            debug!("response text: {}", response.text());
            if response.is_ok() && !response.body.is_empty() {
                Ok(Some(response.body))
            } else {
                debug!("HTTP {} {}", response.status, response.reason);
                Ok(None)
            }
        }
        Err(err) if err.is_transient() => {
            debug!("certificate not ready: {err}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Polls until the certificate is delivered or the budget runs out.
///
/// Returns `Ok(None)` when every attempt came back pending, and
/// `Err(Interrupted)` if `interrupt` is raised between attempts.
pub fn retrieve_cert<C: Connector, S: Sleeper>(
    connector: &C,
    config: &ApiConfig,
    headers: &ApiHeaders,
    ticket: &EnrollmentTicket,
    policy: &RetryPolicy,
    sleeper: &mut S,
    interrupt: &Interrupt,
) -> Result<Option<Vec<u8>>> {
    let path = collect_path(config, ticket);
    let mut state = PollState::Pending;

    loop {
        let attempts_remaining = match state {
            PollState::Pending => policy.attempts,
            PollState::Retrying { attempts_remaining } => {
                debug!("{attempts_remaining} retrieval attempts left");
                attempts_remaining
            }
            PollState::Delivered(cert) => {
                info!("Certificate for {} delivered", ticket.subject);
                return Ok(Some(cert));
            }
            PollState::Exhausted => {
                warn!(
                    "Certificate for {} not retrieved after {} attempts",
                    ticket.subject, policy.attempts
                );
                return Ok(None);
            }
        };
        if attempts_remaining == 0 {
            state = PollState::Exhausted;
            continue;
        }
        interrupt.check()?;

        state = match attempt(connector, &path, headers)? {
            Some(cert) => PollState::Delivered(cert),
            None if attempts_remaining == 1 => PollState::Exhausted,
            None => {
                wait(sleeper, policy.interval, "before retrying certificate retrieval");
                PollState::Retrying {
                    attempts_remaining: attempts_remaining - 1,
                }
            }
        };
    }
}
