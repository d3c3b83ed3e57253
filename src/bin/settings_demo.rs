use tokenvault::settings::*;

fn main() {
    // Load settings from the default location
    let project_settings = parse_settings(None).unwrap();
    println!("Loaded settings: {:?}", project_settings);

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // Environment overrides win over the file
    // $ TOKENVAULT__SESSION__TTL_DEFAULT_SECS=60 cargo run --bin settings_demo
    println!(
        "session ttl: {}s, sliding: {}, max per subject: {}",
        project_settings.session.ttl_default_secs,
        project_settings.session.sliding_expiration,
        project_settings.session.max_tokens_per_subject
    );

    // $ cargo run --bin settings_demo -- --settings=settings/release.toml
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref()).unwrap();
    println!("Loaded settings: {:?}", project_settings);
}
