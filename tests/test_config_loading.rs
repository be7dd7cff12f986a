//! Sensor configuration loading and validation tests
//!
//! Tests focus on observable outcomes of loading sensor files from disk.

use device_sim::config::{load_sensor_config, ConfigError};
use std::io::Write;
use tempfile::NamedTempFile;

fn file_with(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{content}").unwrap();
    file
}

#[test]
fn test_loads_json_array() {
    let file = file_with(
        ".json",
        r#"[
            {"name": "temp", "min_value": 20.0, "max_value": 25.0},
            {"name": "humidity", "min_value": 30, "max_value": 60}
        ]"#,
    );

    let sensors = load_sensor_config(file.path()).unwrap();

    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].name, "temp");
    assert_eq!(sensors[1].name, "humidity");
    assert_eq!(sensors[1].max_value, 60.0);
}

#[test]
fn test_loads_toml_tables() {
    let file = file_with(
        ".toml",
        r#"
[[sensors]]
name = "temp"
min_value = 20.0
max_value = 25.0

[[sensors]]
name = "pressure"
min_value = 990.0
max_value = 1030.0
"#,
    );

    let sensors = load_sensor_config(file.path()).unwrap();

    let names: Vec<&str> = sensors.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["temp", "pressure"]);
}

#[test]
fn test_empty_sensor_list_is_allowed() {
    let file = file_with(".json", "[]");
    assert!(load_sensor_config(file.path()).unwrap().is_empty());
}

#[test]
fn test_missing_file() {
    let result = load_sensor_config(std::path::Path::new("/nonexistent/device_config.json"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_json() {
    let file = file_with(".json", r#"[{"name": "temp", "min_value": 1.0"#);
    assert!(matches!(
        load_sensor_config(file.path()),
        Err(ConfigError::JsonParse(_))
    ));
}

#[test]
fn test_missing_field() {
    let file = file_with(".json", r#"[{"name": "temp", "min_value": 1.0}]"#);
    assert!(matches!(
        load_sensor_config(file.path()),
        Err(ConfigError::JsonParse(_))
    ));
}

#[test]
fn test_malformed_toml() {
    let file = file_with(".toml", "[[sensors]\nname = ");
    assert!(matches!(
        load_sensor_config(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_inverted_bounds_rejected() {
    let file = file_with(
        ".json",
        r#"[{"name": "temp", "min_value": 25.0, "max_value": 20.0}]"#,
    );

    match load_sensor_config(file.path()) {
        Err(ConfigError::InvalidSensor { name, .. }) => assert_eq!(name, "temp"),
        other => panic!("expected InvalidSensor, got {other:?}"),
    }
}

#[test]
fn test_duplicate_names_rejected() {
    let file = file_with(
        ".json",
        r#"[
            {"name": "temp", "min_value": 0.0, "max_value": 1.0},
            {"name": "temp", "min_value": 2.0, "max_value": 3.0}
        ]"#,
    );

    assert!(matches!(
        load_sensor_config(file.path()),
        Err(ConfigError::InvalidSensor { .. })
    ));
}

#[test]
fn test_blank_name_rejected() {
    let file = file_with(
        ".json",
        r#"[{"name": "  ", "min_value": 0.0, "max_value": 1.0}]"#,
    );

    assert!(matches!(
        load_sensor_config(file.path()),
        Err(ConfigError::InvalidSensor { .. })
    ));
}
