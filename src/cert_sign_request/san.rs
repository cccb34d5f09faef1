use rcgen::SanType;

use super::dn::is_valid_hostname;
use crate::error::{RequestError, Result};

/// DNS subject alt names, in the order given.
pub fn dns_sans(alt_names: &[String]) -> Result<Vec<SanType>> {
    alt_names
        .iter()
        .map(|name| {
            if !is_valid_hostname(name) {
                return Err(RequestError::validation(format!(
                    "invalid alternative name {name:?}"
                )));
            }
            Ok(SanType::DnsName(name.clone().try_into()?))
        })
        .collect()
}

/// Comma separated form used by the enroll payload.
pub fn joined(alt_names: &[String]) -> String {
    alt_names.join(",")
}
