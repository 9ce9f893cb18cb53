use super::{json_pretty, CliError, Context, EXIT_SUCCESS};
use runveer_core::StatusReporter;

pub fn run(ctx: &Context, reporter: &dyn StatusReporter) -> Result<u8, CliError> {
    let runner = ctx.runner(reporter)?;
    let fingerprint = runner.fingerprint()?;
    if ctx.json {
        let payload = serde_json::json!({
            "fingerprint": fingerprint,
            "short": fingerprint.short(),
            "manifest_present": runner.manifest_path().is_file(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{fingerprint}");
    }
    Ok(EXIT_SUCCESS)
}
