use super::{CliError, Context, EXIT_INTERRUPTED, EXIT_SUCCESS};
use runveer_core::{CoreError, MenuPresenter, RunOutcome, Status, StatusReporter};
use std::path::Path;

pub fn run(
    ctx: &Context,
    reporter: &dyn StatusReporter,
    menu: &dyn MenuPresenter,
    script: Option<&Path>,
    args: &[String],
) -> Result<u8, CliError> {
    let runner = ctx.runner(reporter)?;

    let chosen;
    let script = if let Some(script) = script {
        script
    } else {
        let scripts = runner.list_scripts()?;
        if scripts.is_empty() {
            return Err(CoreError::NoScripts(ctx.project_dir.clone()).into());
        }
        let Some(path) = menu.choose_script(&scripts) else {
            reporter.status(Status::Info, "nothing to run");
            return Ok(EXIT_SUCCESS);
        };
        chosen = path;
        chosen.as_path()
    };

    match runner.run_script(script, args)? {
        RunOutcome::Completed => {
            reporter.status(Status::Success, "script completed");
            Ok(EXIT_SUCCESS)
        }
        RunOutcome::Interrupted => Ok(EXIT_INTERRUPTED),
    }
}
