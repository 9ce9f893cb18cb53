use super::{json_pretty, CliError, Context, EXIT_SUCCESS};
use crate::reporter::script_tags;
use console::Style;
use runveer_core::StatusReporter;

pub fn run(ctx: &Context, reporter: &dyn StatusReporter) -> Result<u8, CliError> {
    let runner = ctx.runner(reporter)?;
    let scripts = runner.list_scripts()?;

    if ctx.json {
        let payload: Vec<_> = scripts
            .iter()
            .map(|s| {
                let profile = s.profile.as_ref();
                serde_json::json!({
                    "name": s.name,
                    "path": s.path,
                    "has_dependencies": s.has_dependencies,
                    "interactive": profile.is_some_and(|p| p.interactive),
                    "privileged": profile.is_some_and(|p| p.privileged),
                    "web_ui": profile.is_some_and(|p| p.web_ui),
                    "imports": profile.map(|p| p.imports.iter().collect::<Vec<_>>()),
                })
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else if scripts.is_empty() {
        println!("no scripts found in {}", ctx.project_dir.display());
    } else {
        let dim = Style::new().dim();
        for entry in &scripts {
            let tags = script_tags(entry);
            if tags.is_empty() {
                println!("{}", entry.name);
            } else {
                println!(
                    "{:<32} {}",
                    entry.name,
                    dim.apply_to(format!("[{}]", tags.join(", ")))
                );
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
