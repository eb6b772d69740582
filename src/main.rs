use std::process;

use folio::{
    application::{changes::forward_changes, error::AppError, site::Site},
    build::{AggregateOutcome, BuildReport, change_channel},
    config::{self, Command},
    infra::{error::InfraError, telemetry},
};
use tokio::io::BufReader;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(error) => {
            report_application_error(&error);
            error.exit_code()
        }
    };
    // A blocking stdin read cannot be cancelled, so skip waiting on runtime shutdown.
    process::exit(code);
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args
        .command
        .unwrap_or_else(|| Command::Build(Default::default()));

    telemetry::init(&settings.logging)?;

    let site = Site::open(&settings).await?;
    match command {
        Command::Build(_) => run_build(&site).await,
        Command::Dev(_) => run_dev(&site).await,
    }
}

async fn run_build(site: &Site) -> Result<(), AppError> {
    let report = site.session().full_build().await;
    info!(summary = %report, "Build finished");
    ensure_success(&report)
}

async fn run_dev(site: &Site) -> Result<(), AppError> {
    let report = site.session().full_build().await;
    info!(summary = %report, "Initial build finished");
    if !report.is_success() {
        warn!(
            failed = report.failures.len(),
            "Initial build had failures; units that never built are not watched until restart"
        );
    }

    let base_dir = std::env::current_dir().map_err(InfraError::from)?;
    let (notifier, changes) = change_channel();
    let reader = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        forward_changes(stdin, &notifier, &base_dir).await
    });

    tokio::select! {
        summary = site.session().run(changes) => {
            info!(
                flushes = summary.flushes,
                rebuilt_units = summary.rebuilt_units,
                failed_units = summary.failed_units,
                "Development session finished"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(InfraError::from)?;
            info!("Interrupted, stopping development session");
            reader.abort();
            return Ok(());
        }
    }

    match reader.await {
        Ok(Ok(forwarded)) => info!(forwarded, "Change input closed"),
        Ok(Err(err)) => warn!(error = %err, "Reading change messages failed"),
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!(error = %err, "Change reader task failed"),
    }
    Ok(())
}

fn ensure_success(report: &BuildReport) -> Result<(), AppError> {
    let failed_hooks = match &report.aggregate {
        AggregateOutcome::Failed(errors) => errors.len(),
        _ => 0,
    };
    if report.failures.is_empty() && failed_hooks == 0 {
        return Ok(());
    }
    Err(AppError::BuildFailed {
        failed_units: report.failures.len(),
        failed_hooks,
    })
}
