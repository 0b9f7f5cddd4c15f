use anyhow::Result;
use clap::Parser;
use qorch_cli::cli::Cli;
use qorch_cli::commands::execute_command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.trace);

    execute_command(cli.command, cli.config, cli.output).await
}

/// Priority: `RUST_LOG` > `--trace` flag > default (warn). Tracing output
/// goes to stderr to keep stdout clean for program output, so
/// `qorch ask "..." > answer.txt 2> debug.log` works as expected.
fn setup_tracing(trace_level: qorch_cli::cli::TraceLevel) {
    use std::io;
    use tracing_subscriber::EnvFilter;

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .with_target(false)
            .init();
    } else {
        let level: tracing::Level = trace_level.into();
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(io::stderr)
            .with_target(false)
            .init();
    }
}
