use fp_itest_service::TestManager;
use std::path::Path;

/// Stops the environment and checks that nothing is left behind.
#[allow(dead_code)]
pub async fn stop_and_verify(manager: &TestManager) {
    let base_dir = manager.base_dir().to_path_buf();
    manager.stop().await.expect("teardown");
    assert!(!base_dir.exists(), "test directory {} survived teardown", base_dir.display());
    manager.stop().await.expect("second teardown is a no-op");
}

/// Names of per-run test directories left under `data_dir`.
#[allow(dead_code)]
pub fn leftover_test_dirs(data_dir: &Path) -> Vec<String> {
    std::fs::read_dir(data_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with("fp-e2e-test-"))
                .collect()
        })
        .unwrap_or_default()
}
