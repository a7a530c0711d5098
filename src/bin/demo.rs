//! Baton demo: producers and consumers handing integers over a shared queue.
//!
//! Runs a session with the configured worker counts and pacing, narrating
//! every produced and consumed value when tracing is enabled, then prints a
//! final report with the elapsed time and the queue's end state.
//!
//! # Usage
//!
//! ```sh
//! baton-demo --producers 2 --consumers 2 --items 20 --produce-delay-ms 50
//! ```

use std::time::Duration;

use baton::runtime::channel;
use baton::runtime::session::{Session, SessionConfig, SessionError, SessionReport};

#[derive(Debug, thiserror::Error)]
enum DemoError {
    /// Bad command line input.
    #[error("{0}")]
    Usage(String),
    /// The session itself failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

struct Options {
    config: SessionConfig,
    channel: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("baton-demo: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), DemoError> {
    let args: Vec<String> = std::env::args().collect();
    let Options { config, channel } = parse_args(&args)?;

    baton::init_tracing();

    if channel {
        eprintln!(
            "baton-demo: channel mode, 1 producer x {} item(s), 1 consumer",
            config.items_per_producer
        );
        let report = channel::run(
            config.items_per_producer,
            config.produce_delay,
            config.consume_delay,
        )?;
        print_report(&report);
        return Ok(());
    }

    eprintln!(
        "baton-demo: {} producer(s) x {} item(s), {} consumer(s)",
        config.producers, config.items_per_producer, config.consumers
    );

    let session = Session::spawn(config)?;
    let report = session.join()?;
    print_report(&report);

    Ok(())
}

fn print_report(report: &SessionReport) {
    eprintln!("baton-demo: finished in {} ms", report.elapsed.as_millis());
    eprintln!(
        "baton-demo: produced {}, consumed {}, left in queue {} (empty: {})",
        report.produced,
        report.consumed,
        report.final_len,
        report.final_len == 0
    );
}

/// Parses command line arguments into demo options.
fn parse_args(args: &[String]) -> Result<Options, DemoError> {
    let mut options = Options {
        config: SessionConfig::default(),
        channel: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--producers" | "-p" => {
                i += 1;
                options.config.producers = parse_count(args, i, "--producers")?;
            }
            "--consumers" | "-c" => {
                i += 1;
                options.config.consumers = parse_count(args, i, "--consumers")?;
            }
            "--items" | "-n" => {
                i += 1;
                options.config.items_per_producer = parse_count(args, i, "--items")?;
            }
            "--produce-delay-ms" => {
                i += 1;
                options.config.produce_delay = parse_millis(args, i, "--produce-delay-ms")?;
            }
            "--consume-delay-ms" => {
                i += 1;
                options.config.consume_delay = parse_millis(args, i, "--consume-delay-ms")?;
            }
            "--channel" => {
                options.channel = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                return Err(DemoError::Usage(format!("unknown argument: {arg}")));
            }
        }
        i += 1;
    }

    if options.channel && (options.config.producers != 1 || options.config.consumers != 1) {
        return Err(DemoError::Usage(
            "--channel runs exactly one producer and one consumer".into(),
        ));
    }

    Ok(options)
}

fn parse_count(args: &[String], i: usize, flag: &str) -> Result<u32, DemoError> {
    let raw = args
        .get(i)
        .ok_or_else(|| DemoError::Usage(format!("missing value for {flag}")))?;
    raw.parse()
        .map_err(|_| DemoError::Usage(format!("invalid value for {flag}: {raw}")))
}

fn parse_millis(args: &[String], i: usize, flag: &str) -> Result<Duration, DemoError> {
    let raw = args
        .get(i)
        .ok_or_else(|| DemoError::Usage(format!("missing value for {flag}")))?;
    let ms: u64 = raw
        .parse()
        .map_err(|_| DemoError::Usage(format!("invalid value for {flag}: {raw}")))?;
    Ok(Duration::from_millis(ms))
}

fn print_usage() {
    eprintln!(
        r#"baton-demo - producer/consumer handoff demonstration

USAGE:
    baton-demo [OPTIONS]

OPTIONS:
    -p, --producers <N>          Producer thread count (default: 1)
    -c, --consumers <N>          Consumer thread count (default: 1)
    -n, --items <N>              Values pushed per producer (default: 10)
        --produce-delay-ms <MS>  Pause between pushes (default: 500)
        --consume-delay-ms <MS>  Pause after each value taken (default: 300)
        --channel                Run over std::sync::mpsc instead (1x1 only)
    -h, --help                   Print this help message

EXAMPLE:
    baton-demo --producers 2 --consumers 2 --items 20 --produce-delay-ms 50
    baton-demo --channel --items 10
"#
    );
}
