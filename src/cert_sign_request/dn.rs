use rcgen::{DistinguishedName, DnType};

use crate::error::{RequestError, Result};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn is_valid_hostname(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    !name.is_empty()
        && name.len() <= MAX_HOSTNAME_LEN
        && name.split('.').all(is_valid_label)
}

/// Accepts `hostname` or `service/hostname`.
pub fn validate_common_name(common_name: &str) -> Result<()> {
    let hostname = match common_name.split_once('/') {
        Some((service, hostname)) => {
            if service.is_empty()
                || !service.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(RequestError::validation(format!(
                    "invalid service in common name {common_name:?}"
                )));
            }
            hostname
        }
        None => common_name,
    };
    if is_valid_hostname(hostname) {
        Ok(())
    } else {
        Err(RequestError::validation(format!(
            "invalid hostname in common name {common_name:?}"
        )))
    }
}

/// Subject holding only the common name.
pub fn subject(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}
