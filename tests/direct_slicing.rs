#![cfg(unix)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use meshworks::{
    application::pipeline::{EngineConfig, RenderPipeline},
    domain::jobs::{InputSource, Job, JobId, JobRequest, OutputKind},
    infra::storage::StorageLayout,
};
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("set perms");
    path
}

#[tokio::test]
async fn stored_meshes_skip_the_geometry_engine() {
    let dir = TempDir::new().expect("temp dir");
    let storage = StorageLayout::new(dir.path().join("designs"), dir.path().join("renders"))
        .expect("layout");
    fs::write(storage.render_dir().join("upload-42.stl"), "solid upload").expect("upload");

    let geometry_marker = dir.path().join("geometry-called");
    let slicer_args = dir.path().join("slicer-args");
    let geometry = script(
        dir.path(),
        "geometry",
        &format!("touch \"{}\"\nexit 1\n", geometry_marker.display()),
    );
    let slicer = script(
        dir.path(),
        "slicer",
        &format!(
            r#"echo "$@" > "{args}"
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    -o)
      shift
      out="$1"
      ;;
  esac
  shift
done
cat > "$out" <<'GCODE'
G28
; filament used [mm] = 1234.5
; filament used [cm3] = 2.97
; estimated printing time (normal mode) = 1h 2m 3s
GCODE
"#,
            args = slicer_args.display()
        ),
    );

    let pipeline = RenderPipeline::new(
        storage.clone(),
        EngineConfig {
            geometry_path: geometry,
            slicer_path: slicer,
            slicer_config: dir.path().join("config.ini"),
            ..EngineConfig::default()
        },
    );
    let job = Job::new(
        JobId::new(),
        JobRequest::new(
            OutputKind::Gcode,
            InputSource::StoredMesh("upload-42.stl".to_string()),
        ),
    );

    let result = pipeline.execute(&job).await.expect("sliced");

    assert!(!geometry_marker.exists(), "geometry engine was invoked");
    assert_eq!(result.output_filename, job.id().gcode_filename());
    let metadata = result.metadata.expect("metadata");
    assert_eq!(metadata.filament_used, "1234.5mm");
    assert_eq!(metadata.estimated_time, "1h 2m 3s");

    let args = fs::read_to_string(&slicer_args).expect("slicer args");
    assert!(args.starts_with("--export-gcode --load"), "unexpected args: {args}");
    assert!(
        args.trim_end().ends_with("upload-42.stl"),
        "mesh must be the final argument: {args}"
    );
    assert!(storage.render_dir().join("upload-42.stl").exists());
}
