use intersync::sanitize::redact_endpoint;
use intersync::{ExportOptions, Exporter, FileWriter, HttpRemote, SchemaRegistry, Settings};
use log::info;

use super::{json_pretty, EXIT_SUCCESS};

pub fn run(settings: &Settings, options: ExportOptions, json: bool) -> Result<u8, String> {
    let credentials = settings.credentials().map_err(|e| e.to_string())?;
    let remote = HttpRemote::new(&settings.endpoint, credentials)
        .map_err(|e| format!("failed to create API client: {e}"))?;
    let registry = SchemaRegistry::builtin().with_level(settings.validation_level);

    info!(
        "Exporting {} into {}",
        redact_endpoint(&settings.endpoint),
        settings.files_dir.display()
    );
    let report = Exporter::new(
        &registry,
        &remote,
        FileWriter::new(&settings.files_dir),
        options,
    )
    .run()
    .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for (object_type, count) in &report.per_type {
            println!("  {:<40} {}", object_type, count);
        }
        for rejected in &report.rejected {
            println!(
                "  ignored {} {}: {}",
                rejected.object_type, rejected.handle, rejected.reason
            );
        }
        for warning in &report.warnings {
            println!("Warning: {}", warning);
        }
        println!(
            "Exported {} objects ({} system defaults skipped, {} stale files removed)",
            report.written.len(),
            report.system_defaults,
            report.pruned
        );
    }
    Ok(EXIT_SUCCESS)
}
