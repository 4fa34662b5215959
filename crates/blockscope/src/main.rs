mod cli;

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use eyre::WrapErr;
use serde::Serialize;

use blockscope_core::block::analyze_block_files;
use blockscope_core::tx::analyze_fixture;
use blockscope_core::{CoreError, ErrorRecord, TxFixture, TxRecord};

/// Transaction-mode success record: the analyzed transaction plus the
/// `ok`/`mode` envelope shared with block mode.
#[derive(Serialize)]
struct TxReport {
    ok: bool,
    mode: &'static str,
    #[serde(flatten)]
    transaction: TxRecord,
}

/// Failure envelope for either mode.
#[derive(Serialize)]
struct FailureReport {
    ok: bool,
    error: ErrorRecord,
}

fn main() -> eyre::Result<ExitCode> {
    let args = match cli::Cli::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit();
        }
        // Render argument problems as a machine-readable error record,
        // like every other failure mode.
        Err(err) => {
            let report = FailureReport {
                ok: false,
                error: ErrorRecord::new("INVALID_ARGS", err.to_string()),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(ExitCode::FAILURE);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = match run(&args.command) {
        Ok(json) => json,
        Err(error) => serde_json::to_value(FailureReport { ok: false, error })?,
    };
    // Data-consistency failures come back as well-formed records with
    // `ok: false`; the exit status follows the record, not the Result.
    let ok = json
        .get("ok")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered.as_bytes())
                .wrap_err_with(|| format!("write output to {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote record");
        }
        None => println!("{rendered}"),
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run(command: &cli::Command) -> Result<serde_json::Value, ErrorRecord> {
    match command {
        cli::Command::Tx { fixture } => {
            let fixture = load_fixture(fixture)?;
            let transaction = analyze_fixture(&fixture).map_err(|err| ErrorRecord::from(&err))?;
            let report = TxReport {
                ok: true,
                mode: "tx",
                transaction,
            };
            serde_json::to_value(report).map_err(render_failure)
        }
        cli::Command::Block { blk, rev, xor } => {
            let record = analyze_block_files(blk, rev, xor.as_deref())
                .map_err(|err| ErrorRecord::from(&err))?;
            serde_json::to_value(record).map_err(render_failure)
        }
    }
}

/// Read and parse the fixture JSON, from a file or stdin (`-`).
fn load_fixture(path: &Path) -> Result<TxFixture, ErrorRecord> {
    let bytes = if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| ErrorRecord::from(&CoreError::Io(err)))?;
        buf
    } else {
        std::fs::read(path).map_err(|err| {
            let core_err = match err.kind() {
                std::io::ErrorKind::NotFound => CoreError::FileNotFound(path.to_path_buf()),
                _ => CoreError::Io(err),
            };
            ErrorRecord::from(&core_err)
        })?
    };
    serde_json::from_slice(&bytes)
        .map_err(|err| ErrorRecord::from(&CoreError::InvalidFixture(err.to_string())))
}

fn render_failure(err: serde_json::Error) -> ErrorRecord {
    ErrorRecord::new("IO_ERROR", format!("render record: {err}"))
}
