use assert_cmd::Command;
use assert_fs::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

const LAYOUTS: &str = r#"{"main": {"data": {"layout": [
    {"id": "g", "type": "RepeatingGroup", "children": ["c"], "dataModelBindings": {"group": "Arr"}},
    {"id": "c", "type": "Input", "required": true, "dataModelBindings": {"simpleBinding": "Arr.val"}}
]}}}"#;

#[test]
fn eval_prints_the_value() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("form-engine")?
        .args(["eval", r#"["concat", "a", ["upperCase", "b"]]"#])
        .output()?;
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout)?.trim(), r#""aB""#);
    Ok(())
}

#[test]
fn eval_unknown_function_fails_without_default() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("form-engine")?
        .args(["eval", r#"["unknownFn"]"#])
        .assert()
        .failure();
    let output = Command::cargo_bin("form-engine")?
        .args(["eval", r#"["unknownFn"]"#, "--default", "false"])
        .output()?;
    assert_eq!(String::from_utf8(output.stdout)?.trim(), "false");
    Ok(())
}

#[test]
fn hierarchy_reads_layouts_and_data() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = assert_fs::TempDir::new()?;
    let layouts = workspace.child("layouts.json");
    layouts.write_str(LAYOUTS)?;
    let data = workspace.child("data.json");
    data.write_str(r#"{"Arr": [{"val": 1}, {"val": 2}]}"#)?;

    let output = Command::cargo_bin("form-engine")?
        .arg("hierarchy")
        .arg("--layouts")
        .arg(layouts.path())
        .arg("--data")
        .arg(data.path())
        .output()?;
    assert!(output.status.success());
    let pages: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(
        pages["pages"]["main"]["nodes"]["c-1"]["dataModelBindings"]["simpleBinding"],
        "Arr[1].val"
    );
    Ok(())
}

#[test]
fn resolve_strict_fails_on_missing_required() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let layouts = workspace.path().join("layouts.json");
    fs::write(&layouts, LAYOUTS)?;
    let input = workspace.path().join("input.json");
    fs::write(&input, r#"{"dataModel": {"Arr": [{}]}}"#)?;

    let output = Command::cargo_bin("form-engine")?
        .arg("resolve")
        .arg("--layouts")
        .arg(&layouts)
        .arg("--input")
        .arg(&input)
        .arg("--strict")
        .output()?;
    assert!(!output.status.success());
    let text = String::from_utf8(output.stdout)?;
    assert!(text.contains("Missing required: c-0"));

    let output = Command::cargo_bin("form-engine")?
        .arg("resolve")
        .arg("--layouts")
        .arg(&layouts)
        .arg("--input")
        .arg(&input)
        .arg("--format")
        .arg("json")
        .output()?;
    assert!(output.status.success());
    let form: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(form["validation"]["missingRequired"][0], "c-0");
    Ok(())
}

#[test]
fn nest_rejects_circular_layout() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = assert_fs::TempDir::new()?;
    let layout = workspace.child("layout.json");
    layout.write_str(
        r#"{"data": {"layout": [
            {"id": "a", "type": "Group", "children": ["b"]},
            {"id": "b", "type": "Group", "children": ["a"]}
        ]}}"#,
    )?;
    Command::cargo_bin("form-engine")?
        .arg("nest")
        .arg("--layout")
        .arg(layout.path())
        .assert()
        .failure();
    Ok(())
}
