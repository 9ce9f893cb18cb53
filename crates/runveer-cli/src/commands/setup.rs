use super::{json_pretty, CliError, Context, EXIT_FAILURE, EXIT_SUCCESS};
use runveer_core::StatusReporter;
use runveer_runtime::InstallOutcome;

pub fn run(ctx: &Context, reporter: &dyn StatusReporter) -> Result<u8, CliError> {
    let runner = ctx.runner(reporter)?;
    let report = runner.setup_env()?;
    let env = &report.environment;
    let complete = report.install.as_ref().is_none_or(InstallOutcome::is_complete);

    if ctx.json {
        let install = report.install.as_ref().map(|outcome| match outcome {
            InstallOutcome::Bulk => serde_json::json!({ "mode": "bulk", "complete": true }),
            InstallOutcome::PerPackage {
                bulk_error,
                installed,
                failed,
            } => serde_json::json!({
                "mode": "per_package",
                "complete": failed.is_empty(),
                "bulk_error": bulk_error,
                "installed": installed,
                "failed": failed
                    .iter()
                    .map(|f| serde_json::json!({ "package": f.package, "reason": f.reason }))
                    .collect::<Vec<_>>(),
            }),
            InstallOutcome::TimedOut { secs } => {
                serde_json::json!({ "mode": "timed_out", "complete": false, "secs": secs })
            }
        });
        let payload = serde_json::json!({
            "name": env.name(),
            "root": env.root(),
            "fingerprint": env.fingerprint(),
            "reused": env.was_reused(),
            "install": install,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        let state = if env.was_reused() { "reused" } else { "created" };
        println!("{} ({state}, {})", env.root().display(), env.fingerprint().short());
    }

    Ok(if complete { EXIT_SUCCESS } else { EXIT_FAILURE })
}
