pub mod export;
pub mod import;
pub mod validate;

use intersync::RunReport;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Prints the report to stdout and maps it to the process exit code.
pub fn finish(report: &RunReport, json: bool) -> Result<u8, String> {
    if json {
        println!("{}", json_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    u8::try_from(report.exit_code()).map_err(|_| "exit code out of range".to_string())
}
