use std::time::Duration;

use intersync::sanitize::redact_endpoint;
use intersync::{
    CancelToken, FileSource, HttpRemote, Reconciler, SchemaRegistry, Settings, SyncOptions,
};
use log::info;

pub struct ImportArgs {
    pub object_types: Vec<String>,
    /// Overrides `SAFE_MODE` when set.
    pub safe_mode: Option<bool>,
    pub dry_run: bool,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

pub fn run(
    settings: &Settings,
    args: ImportArgs,
    cancel: CancelToken,
    json: bool,
) -> Result<u8, String> {
    let credentials = settings.credentials().map_err(|e| e.to_string())?;
    let remote = HttpRemote::new(&settings.endpoint, credentials)
        .map_err(|e| format!("failed to create API client: {e}"))?;
    let registry = SchemaRegistry::builtin().with_level(settings.validation_level);

    let options = SyncOptions {
        safe_mode: args.safe_mode.unwrap_or(settings.safe_mode),
        dry_run: args.dry_run,
        workers: args.workers.unwrap_or(settings.max_workers).max(1),
        object_types: args.object_types,
    };
    let cancel = match args
        .timeout_secs
        .map(Duration::from_secs)
        .or(settings.run_timeout)
    {
        Some(timeout) => cancel.with_timeout(timeout),
        None => cancel,
    };

    info!(
        "Importing {} into {}{}",
        settings.files_dir.display(),
        redact_endpoint(&settings.endpoint),
        if options.dry_run { " (dry run)" } else { "" }
    );
    let report = Reconciler::new(&registry, &remote, options)
        .with_cancel(cancel)
        .run(&FileSource::new(&settings.files_dir))
        .map_err(|e| e.to_string())?;
    super::finish(&report, json)
}
