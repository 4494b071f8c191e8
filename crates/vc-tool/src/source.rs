use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{TestCase, VcToolError, TESTCASE_SCHEMA_V1};

const CASE_SUFFIX: &str = ".case.json";

/// Every `*.case.json` below `cases_dir`, in path order.
pub fn collect_case_files(cases_dir: &Path) -> Result<Vec<PathBuf>, VcToolError> {
    let mut files = WalkDir::new(cases_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().to_string_lossy().ends_with(CASE_SUFFIX))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    if files.is_empty() {
        return Err(VcToolError::SourceEmpty {
            path: cases_dir.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, VcToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| VcToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase = serde_json::from_str(&raw).map_err(|source| VcToolError::ParseCase {
        path: case_path.to_path_buf(),
        source,
    })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(VcToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod source_tests {
    use super::*;

    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("vc-tool-{}-{}", name, nanos))
    }

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }

    #[test]
    fn collect_case_files_finds_nested_cases_in_order() {
        let root = temp_dir("collect");
        write_file(&root.join("b.case.json"), "{}");
        write_file(&root.join("nested/a.case.json"), "{}");
        write_file(&root.join("notes.json"), "{}");

        let files = collect_case_files(&root).expect("scan should pass");
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("b.case.json"));
        assert!(files[1].ends_with("nested/a.case.json"));
    }

    #[test]
    fn collect_case_files_fails_when_no_cases() {
        let root = temp_dir("empty");
        write_file(&root.join("ignore.txt"), "skip");

        let error = collect_case_files(&root).expect_err("empty source should fail");
        assert!(matches!(error, VcToolError::SourceEmpty { .. }));
    }

    #[test]
    fn read_test_case_parses_valid_json() {
        let root = temp_dir("case-ok");
        let case_path = root.join("ok.case.json");
        write_file(
            &case_path,
            r#"{
  "schemaVersion":"vc-tool-case.v1",
  "scope":"character:2",
  "steps":[{"kind":"query","path":"HP"}],
  "expectedEvents":[{"kind":"value","value":null}]
}"#,
        );

        let parsed = read_test_case(&case_path).expect("case should parse");
        assert_eq!(parsed.scope, "character:2");
        assert_eq!(parsed.steps.len(), 1);
        assert_eq!(parsed.expected_events.len(), 1);
    }

    #[test]
    fn read_test_case_reports_read_parse_and_schema_errors() {
        let root = temp_dir("case-errors");
        fs::create_dir_all(&root).expect("root should be created");

        let missing = read_test_case(&root.join("missing.case.json")).expect_err("missing");
        assert!(matches!(missing, VcToolError::ReadFile { .. }));

        let bad_json_path = root.join("bad.case.json");
        write_file(&bad_json_path, "{");
        let parse_error = read_test_case(&bad_json_path).expect_err("parse should fail");
        assert!(matches!(parse_error, VcToolError::ParseCase { .. }));

        let bad_schema_path = root.join("schema.case.json");
        write_file(&bad_schema_path, r#"{"schemaVersion":"v0"}"#);
        let schema_error = read_test_case(&bad_schema_path).expect_err("schema should fail");
        assert!(matches!(
            schema_error,
            VcToolError::InvalidSchemaVersion { .. }
        ));
    }
}
