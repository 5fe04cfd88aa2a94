use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn geoproc() -> Command {
    Command::cargo_bin("geoproc").unwrap()
}

fn write_cities(path: &Path) {
    let cities = [
        (1, "New York", 8_336_817, -74.006, 40.7128),
        (2, "Los Angeles", 3_979_576, -118.2437, 34.0522),
        (3, "Paris", 2_148_000, 2.3522, 48.8566),
    ];
    let lines: Vec<String> = cities
        .iter()
        .map(|(id, name, population, x, y)| {
            serde_json::json!({
                "type": "Feature",
                "id": id,
                "geometry": {"type": "Point", "coordinates": [x, y]},
                "properties": {"name": name, "population": population},
            })
            .to_string()
        })
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_sequence(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l.trim_start_matches('\u{1e}')).unwrap())
        .collect()
}

#[test]
fn test_drivers_lists_geojson() {
    geoproc()
        .arg("drivers")
        .assert()
        .success()
        .stdout(predicate::str::contains("GeoJSONSeq"))
        .stdout(predicate::str::contains("ESRI Shapefile"));
}

#[test]
fn test_info_summarises_dataset() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cities.geojsonl");
    write_cities(&input);

    geoproc()
        .args(["info", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("GeoJSONSeq"))
        .stdout(predicate::str::contains("Features: 3"))
        .stdout(predicate::str::contains("population"));
}

#[test]
fn test_centroid_pipeline_writes_points() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("square.geojsonl");
    let output = dir.path().join("centroid.geojsonl");
    fs::write(
        &input,
        r#"{"type":"Feature","id":"sq","geometry":{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,4],[0,0]]]},"properties":{}}"#,
    )
    .unwrap();

    geoproc()
        .args(["cat", "-i", input.to_str().unwrap()])
        .arg("centroid")
        .args(["load", "-o", output.to_str().unwrap()])
        .assert()
        .success();

    let features = read_sequence(&output);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["id"], "sq");
    assert_eq!(features[0]["geometry"]["type"], "Point");
    assert_eq!(features[0]["geometry"]["coordinates"], serde_json::json!([2.0, 2.0]));
}

#[test]
fn test_filter_to_stdout_collection() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cities.geojsonl");
    write_cities(&input);

    let assert = geoproc()
        .args(["cat", "-i", input.to_str().unwrap()])
        .args(["filter", "--expr", "population > 3000000", "--expr", "name != 'New York'"])
        .args(["load", "-o", "-", "--driver", "GeoJSON"])
        .assert()
        .success();

    let collection: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(collection["type"], "FeatureCollection");
    let features = collection["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["name"], "Los Angeles");
}

#[test]
fn test_failed_feature_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cities.geojsonl");
    let output = dir.path().join("out.geojsonl");
    write_cities(&input);

    geoproc()
        .args(["cat", "-i", input.to_str().unwrap()])
        .args(["filter", "--expr", "name > 5"])
        .args(["load", "-o", output.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Feature processing failed"))
        .stderr(predicate::str::contains("--skip-failures"));
}

#[test]
fn test_skip_failures_drops_bad_features() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("mixed.geojsonl");
    let output = dir.path().join("out.geojsonl");
    fs::write(
        &input,
        [
            r#"{"type":"Feature","id":1,"geometry":{"type":"Point","coordinates":[0,0]},"properties":{"r":1}}"#,
            r#"{"type":"Feature","id":2,"geometry":{"type":"Point","coordinates":[1,1]},"properties":{"r":"wide"}}"#,
            r#"{"type":"Feature","id":3,"geometry":{"type":"Point","coordinates":[2,2]},"properties":{"r":2}}"#,
        ]
        .join("\n"),
    )
    .unwrap();

    geoproc()
        .arg("--skip-failures")
        .args(["cat", "-i", input.to_str().unwrap()])
        .args(["buffer", "--dist", "r", "--src-crs", "EPSG:3857"])
        .args(["load", "-o", output.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipping feature"));

    let ids: Vec<i64> = read_sequence(&output)
        .iter()
        .filter_map(|f| f["id"].as_i64())
        .collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn test_pipeline_without_cat_fails() {
    geoproc()
        .args(["centroid", "load", "-o", "-"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Start the pipeline with a 'cat' stage"));
}

#[test]
fn test_invalid_bbox_is_reported_before_reading() {
    geoproc()
        .args(["cat", "-i", "missing.geojson"])
        .args(["filter", "--bbox", "10", "0", "-10", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("self-intersection"));
}

#[test]
fn test_missing_input_file() {
    geoproc()
        .args(["info", "does-not-exist.geojson"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_convert_collection_to_sequence() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cities.geojsonl");
    let collection = dir.path().join("cities.geojson");
    let roundtrip = dir.path().join("roundtrip.geojsonl");
    write_cities(&input);

    geoproc()
        .args(["convert", "-i", input.to_str().unwrap(), "-o", collection.to_str().unwrap()])
        .assert()
        .success();
    geoproc()
        .args(["convert", "-i", collection.to_str().unwrap(), "-o", roundtrip.to_str().unwrap()])
        .assert()
        .success();

    let names: Vec<String> = read_sequence(&roundtrip)
        .iter()
        .filter_map(|f| f["properties"]["name"].as_str().map(String::from))
        .collect();
    assert_eq!(names, vec!["New York", "Los Angeles", "Paris"]);
}
