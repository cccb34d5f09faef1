use std::{collections::HashSet, fs, path::Path};

use crate::error::{RequestError, Result};

/// One certificate to request: a common name and its DNS alt names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostRequest {
    common_name: String,
    alt_names: Vec<String>,
}

impl HostRequest {
    pub fn new<I, S>(common_name: &str, alt_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let common_name = common_name.trim();
        if common_name.is_empty() {
            return Err(RequestError::validation("empty common name"));
        }
        let mut seen = HashSet::new();
        let alt_names = alt_names
            .into_iter()
            .map(|name| {
                let name: String = name.into();
                name.trim().to_owned()
            })
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.clone()))
            .collect();
        Ok(Self {
            common_name: common_name.to_owned(),
            alt_names,
        })
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn alt_names(&self) -> &[String] {
        &self.alt_names
    }
}

/// Parses `cn [alt ...]`. Blank lines and `#` comments yield `None`.
pub fn parse_host_line(line: &str) -> Result<Option<HostRequest>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some(common_name) => HostRequest::new(common_name, fields).map(Some),
        None => Ok(None),
    }
}

pub fn read_host_file(path: &Path) -> Result<Vec<HostRequest>> {
    let data = fs::read_to_string(path).map_err(|err| {
        RequestError::validation(format!("could not read the hostfile {path:?}: {err}"))
    })?;
    let mut hosts = Vec::new();
    for line in data.lines() {
        if let Some(host) = parse_host_line(line)? {
            hosts.push(host);
        }
    }
    Ok(hosts)
}

/// Collapses identical requests, keeping the first occurrence in place.
pub fn dedup_hosts(hosts: Vec<HostRequest>) -> Vec<HostRequest> {
    let mut seen = HashSet::new();
    hosts
        .into_iter()
        .filter(|host| seen.insert(host.clone()))
        .collect()
}
