//! taskdeck CLI Application

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use taskdeck::cli::{self, EXIT_OK, EXIT_SIGINT, exit_code_for, render_error};
use taskdeck::commands;
use taskdeck::tracing::{self, TracingConfig};
use tokio_util::sync::CancellationToken;

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let exit_code = run_with_tokio();
    std::process::exit(exit_code);
}

/// Create tokio runtime and run async path
fn run_with_tokio() -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            return 1;
        }
    };

    rt.block_on(run())
}

async fn run() -> i32 {
    let cli = cli::parse();

    if let Err(e) = tracing::init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        filter: None,
    }) {
        eprintln!("{e:?}");
    }

    let cancel = CancellationToken::new();
    tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            EXIT_SIGINT
        }
        result = commands::execute(&cli, &cancel) => {
            match result {
                Ok(output) => {
                    if output.ends_with('\n') {
                        print!("{output}");
                    } else {
                        println!("{output}");
                    }
                    EXIT_OK
                }
                Err(err) => {
                    render_error(&err, cli.json);
                    exit_code_for(&err)
                }
            }
        }
    }
}
