use super::{json_pretty, CliError, Context, EXIT_SUCCESS};
use runveer_core::StatusReporter;

pub fn run(ctx: &Context, reporter: &dyn StatusReporter, all: bool) -> Result<u8, CliError> {
    let runner = ctx.runner(reporter)?;
    let report = runner.clean(all)?;
    if ctx.json {
        let payload = serde_json::json!({ "removed": report.removed });
        println!("{}", json_pretty(&payload)?);
    } else if report.removed.is_empty() {
        println!("nothing to remove");
    } else {
        for name in &report.removed {
            println!("removed {name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
