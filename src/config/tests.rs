use super::*;
use crate::domain::jobs::OutputKind;
use serde_json::json;

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.jobs.concurrency.get(), 2);
    assert_eq!(settings.jobs.rate_limit_max.get(), 5);
    assert_eq!(settings.jobs.rate_limit_window, Duration::from_millis(1000));
    assert_eq!(settings.jobs.wait_timeout, Duration::from_secs(60));
    assert_eq!(settings.jobs.history_completed, 100);
    assert_eq!(settings.jobs.history_failed, 200);
    assert_eq!(settings.storage.render_dir, PathBuf::from("public/renders"));
    assert_eq!(settings.engines.color_scheme, "Tomorrow Night");
    assert_eq!(settings.engines.preview_width.get(), 800);
    assert!(settings.profiles.path.is_none());
    assert_eq!(settings.logging.level, LevelFilter::INFO);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.jobs.concurrency = Some(8);
    raw.logging.level = Some("info".to_string());

    raw.apply_logging_overrides(&LoggingOverrides {
        log_level: Some("debug".to_string()),
        log_json: None,
    });
    raw.apply_engine_overrides(&EngineOverrides {
        concurrency: Some(3),
        geometry_path: Some(PathBuf::from("/opt/openscad")),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.jobs.concurrency.get(), 3);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.engines.geometry_path, PathBuf::from("/opt/openscad"));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_logging_overrides(&LoggingOverrides {
        log_level: None,
        log_json: Some(true),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.concurrency = Some(0);
    let err = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.concurrency",
            ..
        }
    ));
}

#[test]
fn shared_design_and_render_dirs_are_rejected() {
    let mut raw = RawSettings::default();
    raw.storage.design_dir = Some(PathBuf::from("work"));
    raw.storage.render_dir = Some(PathBuf::from("work"));
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn config_file_layers_under_environment() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("meshworks.toml");
    std::fs::write(
        &path,
        "[jobs]\nconcurrency = 4\nwait_timeout_secs = 30\n\n[engines]\ncolor_scheme = \"Cornfield\"\n",
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "meshworks",
        "--config-file",
        path.to_str().expect("utf-8 path"),
        "variables",
        "model.scad",
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.jobs.concurrency.get(), 4);
    assert_eq!(settings.jobs.wait_timeout, Duration::from_secs(30));
    assert_eq!(settings.engines.color_scheme, "Cornfield");
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "meshworks",
        "render",
        "--scad-file",
        "/tmp/model.scad",
        "--kind",
        "gcode",
        "--param",
        "width=20",
        "--param",
        "label=hello",
        "--printer",
        "1",
        "--jobs-concurrency",
        "1",
    ]);

    match args.command {
        Command::Render(render) => {
            assert_eq!(render.kind, OutputKind::Gcode);
            assert_eq!(
                render.scad_file.as_deref(),
                Some(std::path::Path::new("/tmp/model.scad"))
            );
            assert_eq!(
                render.params,
                vec![
                    ("width".to_string(), json!(20)),
                    ("label".to_string(), json!("hello")),
                ]
            );
            assert_eq!(render.printer, Some(1));
            assert_eq!(render.overrides.concurrency, Some(1));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn render_requires_exactly_one_input() {
    assert!(CliArgs::try_parse_from(["meshworks", "render"]).is_err());
    assert!(
        CliArgs::try_parse_from([
            "meshworks",
            "render",
            "--design",
            "a",
            "--mesh",
            "b.stl",
        ])
        .is_err()
    );
}

#[test]
fn parse_estimate_arguments() {
    let args = CliArgs::parse_from([
        "meshworks",
        "--log-level",
        "warn",
        "estimate",
        "--filament-used",
        "1000mm",
        "--time",
        "2h",
        "--printer",
        "1",
        "--filament",
        "7",
        "--profiles",
        "/etc/meshworks/profiles.toml",
    ]);

    assert_eq!(args.logging.log_level.as_deref(), Some("warn"));
    match args.command {
        Command::Estimate(estimate) => {
            assert_eq!(estimate.filament_used, "1000mm");
            assert_eq!(estimate.estimated_time, "2h");
            assert_eq!(estimate.filament, 7);
            assert_eq!(
                estimate.profiles_path.as_deref(),
                Some(std::path::Path::new("/etc/meshworks/profiles.toml"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn params_without_equals_are_rejected() {
    assert!(cli::parse_param("width").is_err());
    assert!(cli::parse_param("=3").is_err());
    assert_eq!(
        cli::parse_param("size=[1,2]").expect("param"),
        ("size".to_string(), json!([1, 2]))
    );
}
