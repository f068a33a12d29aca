use intersync::{
    CancelToken, FileSource, InMemoryRemote, Reconciler, SchemaRegistry, Settings, SyncOptions,
};

pub fn run(
    settings: &Settings,
    object_types: Vec<String>,
    cancel: CancelToken,
    json: bool,
) -> Result<u8, String> {
    let registry = SchemaRegistry::builtin().with_level(settings.validation_level);
    // Validation is a dry run over the file tree; this remote is never called.
    let offline = InMemoryRemote::new();
    let options = SyncOptions {
        object_types,
        ..settings.sync_options()
    };
    let report = Reconciler::new(&registry, &offline, options)
        .with_cancel(cancel)
        .validate(&FileSource::new(&settings.files_dir))
        .map_err(|e| e.to_string())?;
    super::finish(&report, json)
}
