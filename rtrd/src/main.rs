// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::Result;
use clap::Parser;
use rtr::cache::Cache;
use rtr::config::{Config, DEFAULT_LISTEN};
use rtr::fetch::HttpSource;
use rtr::log::{init_logger_at, parse_level};
use rtr::server::Server;
use slog::{error, info, Logger};
use std::sync::mpsc::channel;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about = "RPKI-to-Router cache server", long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    loglevel: String,

    /// RPKI JSON URL (repeatable; overrides the built-in defaults).
    #[arg(long = "rpki-url")]
    rpki_urls: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    let log = init_logger_at(parse_level(&cli.loglevel));

    if let Err(e) = run(cli, log.clone()) {
        error!(log, "fatal: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli, log: Logger) -> Result<()> {
    let mut config = Config {
        listen: cli.listen,
        ..Default::default()
    };
    if !cli.rpki_urls.is_empty() {
        config.rpki_urls = cli.rpki_urls;
    }

    let source = Arc::new(HttpSource::new(
        config.rpki_urls.clone(),
        config.fetch_timeout,
        log.clone(),
    )?);
    let cache = Arc::new(Cache::new());
    let shutdown_timeout = config.shutdown_timeout;

    let server = Arc::new(Server::new(config, source, cache, log.clone()));
    let addr = server.clone().start()?;
    info!(log, "rtrd running on {addr}");

    // Park until SIGINT or SIGTERM, then drain.
    let (sig_tx, sig_rx) = channel();
    ctrlc::set_handler(move || {
        let _ = sig_tx.send(());
    })?;
    sig_rx.recv()?;

    info!(log, "signal received, shutting down");
    server.shutdown(shutdown_timeout)?;
    info!(log, "shut down cleanly");
    Ok(())
}
