use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing::{error, info};

use crate::{
    api::test_connection,
    cli::{Cli, HostSource},
    config::Config,
    error::RequestError,
    hosts::{read_host_file, HostRequest},
    orchestrator::{run_batch, BatchSettings},
    transport::{ApiHeaders, ClientCredentials, Connector, HttpsConnector, Transport},
    utils::{exit_with_msg_and_code, Interrupt, ThreadSleeper},
};

mod api;
mod artifact;
mod cert_sign_request;
mod cli;
mod config;
mod error;
mod hosts;
mod orchestrator;
mod transport;
mod utils;

/// `$HOME/.globus/<name>`, used when neither flag nor env var is given.
fn globus_default(name: &str) -> Option<PathBuf> {
    env::var_os("HOME").map(|home| Path::new(&home).join(".globus").join(name))
}

fn credential_path(flag: Option<PathBuf>, default_name: &str, what: &str) -> anyhow::Result<PathBuf> {
    flag.or_else(|| globus_default(default_name))
        .with_context(|| format!("Please provide the {what} file"))
}

fn load_hosts(source: HostSource) -> anyhow::Result<Vec<HostRequest>> {
    match source {
        HostSource::Single {
            hostname,
            alt_names,
        } => Ok(vec![HostRequest::new(&hostname, alt_names)?]),
        HostSource::File(path) => Ok(read_host_file(&path)?),
    }
}

fn run(cli: Cli, interrupt: &Interrupt) -> anyhow::Result<()> {
    let app = ProjectDirs::from("org", "opensciencegrid", "incommon-request")
        .context("can't determine the configuration directory")?;
    let config: Config = config::read_config(app.config_dir(), cli.config.as_deref())?;

    let cert_path = credential_path(cli.user_cert.clone(), "usercert.pem", "certificate (-c, --cert)")?;
    let key_path = credential_path(cli.user_key.clone(), "userkey.pem", "key (-k, --pkey)")?;
    let credentials = ClientCredentials::load(&cert_path, &key_path)
        .context("Please check for valid certificate and key files")?;
    let connector = HttpsConnector::new(&config.api, credentials);
    let headers = ApiHeaders::new(&config.api, &cli.login);

    let Some(source) = cli.host_source() else {
        info!("Beginning testing mode: ignoring parameters.");
        let mut conn = connector.connect()?;
        let result = test_connection(&mut conn, &config.api, &headers);
        conn.close();
        interrupt.check()?;
        return result.context(
            "Failed connection to InCommon API. Check your configuration parameters or credentials",
        );
    };

    artifact::check_output_dir(&cli.out)?;
    let hosts = load_hosts(source)?;
    let settings = BatchSettings {
        api: &config.api,
        headers: &headers,
        output_dir: &cli.out,
        approval_wait: config.timing.approval_wait(),
        retry: config.timing.retry_policy(),
        interrupt,
    };
    let mut sleeper = ThreadSleeper::new(interrupt.clone());
    let summary = run_batch(hosts, &settings, &connector, &mut sleeper)?;
    info!("{summary}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let interrupt = Interrupt::default();
    let handler = interrupt.clone();
    let installed = ctrlc::set_handler(move || {
        if handler.raise() {
            exit_with_msg_and_code("Interrupted by user", 130);
        }
        eprintln!("Stopping after the current step, press Ctrl-C again to quit now");
    });
    if let Err(err) = installed {
        error!("can't install the interrupt handler: {err}");
    }

    match run(cli, &interrupt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if matches!(
            err.downcast_ref::<RequestError>(),
            Some(RequestError::Interrupted)
        ) => {
            error!("{err}");
            ExitCode::from(130)
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
