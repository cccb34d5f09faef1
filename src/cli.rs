use std::path::PathBuf;

use clap::Parser;

/// Request host certificates from the InCommon certificate service.
///
/// Requests a single host with -H or every host listed in a file with -f,
/// writing `<host>.key` and `<host>-cert.pem` to the output directory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// hostname or service/hostname to request a certificate for.
    #[arg(short = 'H', long, value_name = "HOSTNAME")]
    pub hostname: Option<String>,
    /// file with one host (and its optional alt names, space separated) per line.
    #[arg(
        short = 'f',
        long,
        value_name = "HOSTFILE",
        required_unless_present_any = ["hostname", "test"]
    )]
    pub hostfile: Option<PathBuf>,
    /// alternative hostname for the CSR, may be repeated. Ignored with --hostfile.
    #[arg(short = 'a', long = "altname", value_name = "HOSTNAME")]
    pub alt_names: Vec<String>,
    /// write the output files to this directory.
    #[arg(short = 'd', long = "directory", default_value = ".")]
    pub out: PathBuf,
    /// requestor's user certificate (PEM).
    #[arg(short = 'c', long = "cert", env = "X509_USER_CERT")]
    pub user_cert: Option<PathBuf>,
    /// requestor's private key (PEM).
    #[arg(short = 'k', long = "pkey", env = "X509_USER_KEY")]
    pub user_key: Option<PathBuf>,
    /// InCommon username (login).
    #[arg(short = 'u', long = "username", value_name = "LOGIN")]
    pub login: String,
    /// only test the connection and credentials against the API.
    #[arg(short = 'T', long)]
    pub test: bool,
    /// the config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum HostSource {
    Single {
        hostname: String,
        alt_names: Vec<String>,
    },
    File(PathBuf),
}

impl Cli {
    /// Where the hosts come from; `None` in test mode.
    pub fn host_source(&self) -> Option<HostSource> {
        if self.test {
            return None;
        }
        if let Some(hostname) = &self.hostname {
            Some(HostSource::Single {
                hostname: hostname.clone(),
                alt_names: self.alt_names.clone(),
            })
        } else {
            self.hostfile.clone().map(HostSource::File)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_host_with_alt_names() {
        let cli = Cli::try_parse_from([
            "incommon-request",
            "-u",
            "drao",
            "-H",
            "a.example.org",
            "-a",
            "b.example.org",
            "-a",
            "c.example.org",
        ])
        .unwrap();
        assert_eq!(
            cli.host_source(),
            Some(HostSource::Single {
                hostname: "a.example.org".into(),
                alt_names: vec!["b.example.org".into(), "c.example.org".into()],
            })
        );
        assert_eq!(cli.out, PathBuf::from("."));
    }

    #[test]
    fn hostname_wins_over_hostfile() {
        let cli = Cli::try_parse_from([
            "incommon-request",
            "-u",
            "drao",
            "-H",
            "a.example.org",
            "-f",
            "hosts.txt",
        ])
        .unwrap();
        assert!(matches!(cli.host_source(), Some(HostSource::Single { .. })));
    }

    #[test]
    fn hosts_required_unless_testing() {
        assert!(Cli::try_parse_from(["incommon-request", "-u", "drao"]).is_err());
        let cli =
            Cli::try_parse_from(["incommon-request", "-u", "drao", "-T"]).unwrap();
        assert_eq!(cli.host_source(), None);
    }

    #[test]
    fn login_is_required() {
        assert!(
            Cli::try_parse_from(["incommon-request", "-H", "a.example.org"]).is_err()
        );
    }
}
