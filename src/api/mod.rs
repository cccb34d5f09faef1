//! Calls against the InCommon SSL API: connectivity probe, enrollment and
//! certificate collection.

use tracing::{debug, info};

use crate::{
    config::ApiConfig,
    error::{RequestError, Result},
    transport::{ApiHeaders, Transport},
};

pub mod enroll;
pub mod retrieve;

/// Checks connectivity and credentials by listing the SSL certificate types.
pub fn test_connection<T: Transport>(
    transport: &mut T,
    config: &ApiConfig,
    headers: &ApiHeaders,
) -> Result<()> {
    let response = transport.get(&config.listing_path, headers)?;
    debug!("response text: {}", response.text());
    info!("HTTP {} {}", response.status, response.reason);
    if response.is_ok() {
        info!("Successful connection to InCommon API");
        Ok(())
    } else {
        Err(RequestError::Authentication {
            status: response.status,
            reason: response.reason,
        })
    }
}
