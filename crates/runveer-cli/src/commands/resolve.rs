use super::{json_pretty, CliError, Context, EXIT_SUCCESS};
use runveer_core::StatusReporter;
use runveer_schema::Resolution;
use std::path::Path;

pub fn run(ctx: &Context, reporter: &dyn StatusReporter, script: &Path) -> Result<u8, CliError> {
    let runner = ctx.runner(reporter)?;
    let resolution = runner.resolve_script(script)?;
    let packages: Vec<&str> = resolution
        .manifest()
        .map(|m| m.packages().collect())
        .unwrap_or_default();

    if ctx.json {
        let written = matches!(resolution, Resolution::Manifest(_));
        let payload = serde_json::json!({
            "script": script,
            "manifest": written.then(|| runner.manifest_path()),
            "packages": packages,
        });
        println!("{}", json_pretty(&payload)?);
    } else if packages.is_empty() {
        println!("no external dependencies");
    } else {
        for package in packages {
            println!("{package}");
        }
    }
    Ok(EXIT_SUCCESS)
}
