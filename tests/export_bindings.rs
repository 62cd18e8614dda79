#[path = "../src/types/mod.rs"]
mod types;

#[test]
fn export_bindings() {
    let out_dir = std::env::temp_dir().join("hookrelay-bindings");
    std::fs::create_dir_all(&out_dir).expect("create bindings dir");
    let out_path = out_dir.join("bindings.ts");
    let out_path_str = out_path.to_string_lossy().into_owned();

    let ts_cfg =
        specta::ts::ExportConfiguration::default().bigint(specta::ts::BigIntExportBehavior::Number);

    specta::export::ts_with_cfg(&out_path_str, &ts_cfg).expect("failed to export Specta bindings");

    let bindings = std::fs::read_to_string(&out_path).expect("read bindings");
    assert!(bindings.contains("Job"));
    assert!(bindings.contains("DeadLetterEntry"));
}
