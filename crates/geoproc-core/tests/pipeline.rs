use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use geoproc_core::error::{GeoProcError, TransformError};
use geoproc_core::pipeline::{RunContext, StageSpec, run};
use geoproc_core::stages::{BufferSpec, CatSpec, CentroidSpec, Distance, LoadSpec};
use geoproc_core::{FailurePolicy, GeometryType};
use serde_json::Value;
use tempfile::TempDir;

fn write_lines(path: &Path, lines: &[String]) {
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn square(id: usize, x: f64, y: f64) -> String {
    serde_json::json!({
        "type": "Feature",
        "id": id,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x, y], [x + 2.0, y], [x + 2.0, y + 2.0], [x, y + 2.0], [x, y]]],
        },
        "properties": {"size": id},
    })
    .to_string()
}

fn read_ids(path: &Path) -> Vec<i64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter_map(|f| f["id"].as_i64())
        .collect()
}

fn pipeline(input: &Path, middle: StageSpec, output: &Path) -> Vec<StageSpec> {
    vec![
        StageSpec::Cat(CatSpec::new(input.to_str().unwrap())),
        middle,
        StageSpec::Load(LoadSpec::new(output.to_str().unwrap())),
    ]
}

/// `[f1 ok, f2 bad, f3 ok]` with a per-feature buffer distance.
fn mixed_input(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("mixed.geojsonl");
    let feature = |id: usize, dist: Value| {
        serde_json::json!({
            "type": "Feature",
            "id": id,
            "geometry": {"type": "Point", "coordinates": [id, id]},
            "properties": {"dist": dist},
        })
        .to_string()
    };
    write_lines(
        &path,
        &[
            feature(1, Value::from(1.0)),
            feature(2, Value::Null),
            feature(3, Value::from(2.0)),
        ],
    );
    path
}

#[test]
fn skip_policy_drops_the_failed_feature() {
    let dir = TempDir::new().unwrap();
    let input = mixed_input(&dir);
    let output = dir.path().join("out.geojsonl");

    let context = RunContext::new(FailurePolicy::Skip, "cat | buffer | load");
    let report = run(
        pipeline(
            &input,
            StageSpec::Buffer(BufferSpec::new(Distance::Field("dist".to_string()))),
            &output,
        ),
        &context,
    )
    .unwrap();

    assert_eq!(report.written, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(read_ids(&output), vec![1, 3]);
}

#[test]
fn propagate_policy_stops_at_the_failed_feature() {
    let dir = TempDir::new().unwrap();
    let input = mixed_input(&dir);
    let output = dir.path().join("out.geojsonl");

    let context = RunContext::new(FailurePolicy::Propagate, "cat | buffer | load");
    let err = run(
        pipeline(
            &input,
            StageSpec::Buffer(BufferSpec::new(Distance::Field("dist".to_string()))),
            &output,
        ),
        &context,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        GeoProcError::Transform(TransformError::Geometry { .. })
    ));
    // f3 is never pulled, so only f2 failed.
    assert_eq!(context.logger.failures(), 1);
    assert_eq!(context.logger.skipped(), 0);
    assert_eq!(read_ids(&output), vec![1]);
}

fn max_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[test]
fn propagate_with_workers_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let input = mixed_input(&dir);
    let output = dir.path().join("out.geojsonl");

    let mut spec = BufferSpec::new(Distance::Field("dist".to_string()));
    spec.jobs = max_jobs();
    let context = RunContext::new(FailurePolicy::Propagate, "cat | buffer | load");
    let err = run(pipeline(&input, StageSpec::Buffer(spec), &output), &context).unwrap_err();

    assert!(matches!(
        err,
        GeoProcError::Transform(TransformError::Geometry { .. })
    ));
    assert_eq!(context.logger.failures(), 1);
    // Features that completed before the failure may have been written.
    let written = read_ids(&output);
    assert!(written.iter().all(|id| [1, 3].contains(id)), "{written:?}");
}

#[test]
fn centroid_of_a_polygon() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("square.geojsonl");
    let output = dir.path().join("centroid.geojsonl");
    write_lines(&input, &[square(1, 0.0, 0.0)]);

    let report = run(
        pipeline(&input, StageSpec::Centroid(CentroidSpec::default()), &output),
        &RunContext::new(FailurePolicy::Propagate, "cat | centroid | load"),
    )
    .unwrap();

    assert_eq!(report.meta.schema.geometry, GeometryType::Point);
    let content = fs::read_to_string(&output).unwrap();
    let feature: Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(feature["geometry"]["type"], "Point");
    assert_eq!(feature["geometry"]["coordinates"], serde_json::json!([1.0, 1.0]));
}

#[test]
fn parallel_run_yields_the_same_features() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("squares.geojsonl");
    let lines: Vec<String> = (1..=50)
        .map(|i| square(i, i as f64 * 3.0, 0.0))
        .collect();
    write_lines(&input, &lines);

    let run_with = |jobs: usize| {
        let output = dir.path().join(format!("out-{jobs}.geojsonl"));
        let mut spec = BufferSpec::new(Distance::Value(0.5));
        spec.src_crs = Some(geoproc_core::Crs::new("EPSG:3857"));
        spec.jobs = jobs;
        run(
            pipeline(&input, StageSpec::Buffer(spec), &output),
            &RunContext::new(FailurePolicy::Propagate, "cat | buffer | load"),
        )
        .unwrap();
        read_ids(&output)
    };

    let sequential = run_with(1);
    let parallel = run_with(max_jobs().min(4));

    assert_eq!(sequential, (1..=50).collect::<Vec<i64>>());
    assert_eq!(
        sequential.iter().collect::<BTreeSet<_>>(),
        parallel.iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn pipeline_without_load_discards_features() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("squares.geojsonl");
    write_lines(&input, &[square(1, 0.0, 0.0), square(2, 5.0, 5.0)]);

    let report = run(
        vec![
            StageSpec::Cat(CatSpec::new(input.to_str().unwrap())),
            StageSpec::Centroid(CentroidSpec::default()),
        ],
        &RunContext::new(FailurePolicy::Propagate, "cat | centroid"),
    )
    .unwrap();

    assert_eq!(report.features, 2);
    assert_eq!(report.written, 0);
}
