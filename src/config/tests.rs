use super::*;

#[test]
fn defaults_are_applied() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.site.content_dir, PathBuf::from("content"));
    assert_eq!(settings.site.output_dir, PathBuf::from("public"));
    assert_eq!(settings.site.cname_file, PathBuf::from("CNAME"));
    assert_eq!(settings.build.debounce, Duration::from_millis(50));
    assert_eq!(settings.build.render_concurrency.get(), 4);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.build.debounce_ms = Some(200);
    raw.logging.level = Some("info".to_string());

    let overrides = BuildOverrides {
        debounce_ms: Some(25),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.build.debounce, Duration::from_millis(25));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn zero_debounce_is_rejected() {
    let mut raw = RawSettings::default();
    raw.build.debounce_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero debounce must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "build.debounce_ms",
            ..
        }
    ));
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.build.render_concurrency = Some(0);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn output_dir_must_differ_from_content_dir() {
    let mut raw = RawSettings::default();
    raw.site.content_dir = Some(PathBuf::from("site"));
    raw.site.output_dir = Some(PathBuf::from("site"));

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn host_is_normalised() {
    let mut raw = RawSettings::default();
    raw.site.host = Some(" https://blog.example.org/ ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.site.host.as_deref(), Some("blog.example.org"));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = BuildOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn parse_build_arguments() {
    let args = CliArgs::parse_from([
        "folio",
        "build",
        "--content-dir",
        "site/content",
        "--output-dir",
        "site/public",
        "--render-concurrency",
        "8",
    ]);

    match args.command.expect("build command") {
        Command::Build(build) => {
            assert_eq!(
                build.overrides.content_dir.as_deref(),
                Some(std::path::Path::new("site/content"))
            );
            assert_eq!(
                build.overrides.output_dir.as_deref(),
                Some(std::path::Path::new("site/public"))
            );
            assert_eq!(build.overrides.render_concurrency, Some(8));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_dev_arguments() {
    let args = CliArgs::parse_from(["folio", "dev", "--debounce-ms", "75", "--log-json"]);

    match args.command.expect("dev command") {
        Command::Dev(dev) => {
            assert_eq!(dev.overrides.debounce_ms, Some(75));
            assert_eq!(dev.overrides.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn no_subcommand_is_accepted() {
    let args = CliArgs::parse_from(["folio"]);
    assert!(args.command.is_none());
}
