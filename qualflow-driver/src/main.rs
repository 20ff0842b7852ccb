use std::process::ExitCode;

use clap::Parser;
use qualflow_driver::Opt;
use tracing_subscriber::EnvFilter;
use utils::DiagnosticEmitter;

/// Logs go to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let opts = Opt::parse();
    init_tracing(opts.verbose);

    let mut diag = DiagnosticEmitter::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()));
    if qualflow_driver::process(&mut diag, &opts).is_none() {
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}
