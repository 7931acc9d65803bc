use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tenantfinder::ratelimit::RateLimitSpec;
use tenantfinder::registry::Registry;
use tenantfinder::runner::{
    default_rate_limits, Options, Runner, DEFAULT_MAX_ENUMERATION_MINS, DEFAULT_TIMEOUT_SECS,
};
use tenantfinder::utils::{ensure_dir, log::init_tracing_subscriber};
use tenantfinder::{Error, Result};
use tracing::{error, info, warn};

fn cli() -> Command {
    let list = |name: &'static str| {
        Arg::new(name)
            .long(name)
            .value_delimiter(',')
            .action(ArgAction::Append)
    };

    Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .about("A streamlined tool for discovering related domains")
        // -- Input
        .arg(
            Arg::new("domain")
                .short('d')
                .long("domain")
                .help("Domains to find related domains for")
                .value_name("DOMAIN")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        // -- Sources
        .arg(
            list("sources")
                .short('s')
                .help("Specific sources to use for discovery (-s aad)")
                .value_name("SOURCES"),
        )
        .arg(
            list("exclude-sources")
                .alias("es")
                .help("Sources to exclude from enumeration")
                .value_name("SOURCES"),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .action(ArgAction::SetTrue)
                .help("Use all sources for enumeration (slow)"),
        )
        .arg(
            Arg::new("list-sources")
                .long("list-sources")
                .alias("ls")
                .action(ArgAction::SetTrue)
                .help("List all available sources"),
        )
        // -- Rate limits
        .arg(
            Arg::new("rate-limit")
                .long("rate-limit")
                .alias("rl")
                .value_parser(value_parser!(u32))
                .default_value("0")
                .help("Maximum number of http requests to send per second (global)"),
        )
        .arg(
            list("rate-limits")
                .alias("rls")
                .help("Per source rate limits in source=count/unit format (-rls aad=10/m)")
                .value_name("LIMITS"),
        )
        // -- Output
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .help("File to write output to"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .alias("od")
                .value_parser(value_parser!(PathBuf))
                .help("Directory to write one output file per domain"),
        )
        .arg(
            Arg::new("jsonl")
                .short('j')
                .long("jsonl")
                .action(ArgAction::SetTrue)
                .help("Write output in JSON lines format"),
        )
        .arg(
            Arg::new("collect-sources")
                .long("collect-sources")
                .alias("cs")
                .action(ArgAction::SetTrue)
                .help("Include all sources in the output"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("Report source statistics"),
        )
        // -- Logs
        .arg(
            Arg::new("logs")
                .long("logs")
                .action(ArgAction::SetTrue)
                .help("Save logs into a .log file"),
        )
        .arg(
            Arg::new("silent")
                .long("silent")
                .action(ArgAction::SetTrue)
                .help("Show only domains in output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Show verbose output"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .alias("nc")
                .action(ArgAction::SetTrue)
                .help("Disable color in output"),
        )
        // -- Network
        .arg(
            Arg::new("proxy")
                .long("proxy")
                .help("HTTP proxy to use")
                .value_name("URL"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_parser(value_parser!(u64))
                .default_value(DEFAULT_TIMEOUT_SECS.to_string())
                .help("Seconds to wait before timing out"),
        )
        .arg(
            Arg::new("max-time")
                .long("max-time")
                .value_parser(value_parser!(u64))
                .default_value(DEFAULT_MAX_ENUMERATION_MINS.to_string())
                .help("Minutes to wait for enumeration results"),
        )
}

fn strings(args: &ArgMatches, name: &str) -> Vec<String> {
    args.get_many::<String>(name)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn parse_options(args: &ArgMatches) -> Result<Options> {
    let mut rate_limits = default_rate_limits();
    for spec in strings(args, "rate-limits") {
        let spec: RateLimitSpec = spec.parse()?;
        rate_limits.retain(|known| known.source != spec.source);
        rate_limits.push(spec);
    }

    Ok(Options {
        domains: strings(args, "domain"),
        stdin: !io::stdin().is_terminal(),
        sources: strings(args, "sources"),
        exclude_sources: strings(args, "exclude-sources"),
        all: args.get_flag("all"),
        rate_limit: args.get_one::<u32>("rate-limit").copied().unwrap_or_default(),
        rate_limits,
        output_file: args.get_one::<PathBuf>("output").cloned(),
        output_directory: args.get_one::<PathBuf>("output-dir").cloned(),
        json: args.get_flag("jsonl"),
        capture_sources: args.get_flag("collect-sources"),
        statistics: args.get_flag("stats"),
        silent: args.get_flag("silent"),
        verbose: args.get_flag("verbose"),
        no_color: args.get_flag("no-color"),
        proxy: args.get_one::<String>("proxy").cloned(),
        timeout: args
            .get_one::<u64>("timeout")
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        max_enumeration_time: args
            .get_one::<u64>("max-time")
            .copied()
            .unwrap_or(DEFAULT_MAX_ENUMERATION_MINS),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli().get_matches();

    if args.get_flag("list-sources") {
        Registry::builtin()?.display_all();
        return Ok(());
    }

    // log file name
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let filename = format!("{}", timestamp);

    let options = parse_options(&args)?;

    let save_logs = args.get_flag("logs");
    let log_dir = PathBuf::from("output/tenantfinder");
    if save_logs {
        ensure_dir(&log_dir)?;
    }
    init_tracing_subscriber(
        options.log_filter(),
        !options.no_color,
        save_logs,
        &log_dir,
        &filename,
    )?;

    let runner = Runner::new(options).map_err(|err| {
        warn!("Program exiting: {}", err);
        err
    })?;

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping sources");
            cancel.cancel();
        }
    });

    if let Err(err) = runner.run_enumeration().await {
        error!("{:12} - {}", "RUN ERROR", err);
        return Err(err);
    }

    Ok(())
}
