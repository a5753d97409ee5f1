use anyhow::{Context, Result};
use bsa_core::{AuthorityConfig, Proposal};
use bsa_server::client::{BsaClient, DEFAULT_BASE_URL};
use bsa_server::telemetry::{self, LogFormat};
use bsa_server::ServerConfig;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

fn serve_command() -> Command {
    Command::new("serve")
        .about("Run the state authority HTTP service")
        .arg(
            Arg::new("repo-path")
                .long("repo-path")
                .env("BSA_REPO_PATH")
                .default_value("./data")
                .value_parser(value_parser!(PathBuf))
                .help("Repository root; proposals are staged under <repo-path>/staging"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .env("BSA_HOST")
                .default_value("0.0.0.0")
                .value_parser(value_parser!(IpAddr))
                .help("Address to listen on"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .env("PORT")
                .default_value("8080")
                .value_parser(value_parser!(u16))
                .help("HTTP listen port"),
        )
        .arg(
            Arg::new("reconcile-interval-ms")
                .long("reconcile-interval-ms")
                .env("BSA_RECONCILE_INTERVAL_MS")
                .default_value("5000")
                .value_parser(value_parser!(u64).range(1..))
                .help("Milliseconds between reconciliation passes"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .env("RUST_LOG")
                .default_value("info")
                .help("Log filter (trace, debug, info, warn, error or EnvFilter syntax)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
}

fn url_arg() -> Arg {
    Arg::new("url")
        .long("url")
        .env("BSA_URL")
        .default_value(DEFAULT_BASE_URL)
        .help("Base URL of a running authority")
}

fn cli() -> Command {
    Command::new("bsa")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Deterministic State Authority")
        .arg_required_else_help(false)
        .subcommand(serve_command())
        .subcommand(
            Command::new("state")
                .about("Print the canonical state of a running authority")
                .arg(url_arg())
                .arg(
                    Arg::new("version-hint")
                        .long("version-hint")
                        .help("Version selector (only latest is served)"),
                ),
        )
        .subcommand(
            Command::new("propose")
                .about("Submit a proposal to a running authority")
                .arg(url_arg())
                .arg(
                    Arg::new("intent-id")
                        .long("intent-id")
                        .required(true)
                        .help("Unique identifier of the change"),
                )
                .arg(
                    Arg::new("delta-patch")
                        .long("delta-patch")
                        .required(true)
                        .help("Opaque change payload"),
                )
                .arg(
                    Arg::new("provisional")
                        .long("provisional")
                        .action(ArgAction::SetTrue)
                        .help("Mark the change as provisional"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("serve", args)) => serve(args).await,
        Some(("state", args)) => {
            telemetry::init("warn", "warn", LogFormat::Text);
            let client = BsaClient::new(string_arg(args, "url"));
            let version = args.get_one::<String>("version-hint").map(String::as_str);
            let state = client.get_state(version).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Some(("propose", args)) => {
            telemetry::init("warn", "warn", LogFormat::Text);
            let client = BsaClient::new(string_arg(args, "url"));
            let proposal = Proposal::new(
                string_arg(args, "intent-id"),
                string_arg(args, "delta-patch"),
            )
            .provisional(args.get_flag("provisional"));
            let accepted = client.propose_change(&proposal).await?;
            println!("{}", serde_json::to_string_pretty(&accepted)?);
            Ok(())
        }
        // Bare `bsa` runs the service with env/default settings
        _ => serve(&serve_command().get_matches_from(["serve"])).await,
    }
}

async fn serve(args: &ArgMatches) -> Result<()> {
    let format = if args.get_flag("log-json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    telemetry::init(&string_arg(args, "log-level"), "info", format);

    let repo_path = args
        .get_one::<PathBuf>("repo-path")
        .cloned()
        .context("missing --repo-path")?;
    let host = *args.get_one::<IpAddr>("host").context("missing --host")?;
    let port = *args.get_one::<u16>("port").context("missing --port")?;
    let interval_ms = *args
        .get_one::<u64>("reconcile-interval-ms")
        .context("missing --reconcile-interval-ms")?;

    let config = ServerConfig::new()
        .with_authority(
            AuthorityConfig::new()
                .with_repo_path(repo_path)
                .with_reconcile_interval(Duration::from_millis(interval_ms)),
        )
        .with_listen(SocketAddr::new(host, port));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting state authority");

    bsa_server::run(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown requested");
    })
    .await
    .context("server failed")
}

fn string_arg(args: &ArgMatches, name: &str) -> String {
    args.get_one::<String>(name).cloned().unwrap_or_default()
}
