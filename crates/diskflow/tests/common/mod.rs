use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated config and state directory driving the simulated provider
pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("diskflow.yaml"),
            r#"provider: simulated
poll:
  interval_secs: 1
  timeout_secs: 5
retry:
  initial_delay_secs: 0
  max_delay_secs: 0
"#,
        )
        .unwrap();
        Self { root }
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.path().join("diskflow.yaml")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join("state")
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("diskflow").unwrap();
        cmd.current_dir(self.root.path())
            .env("DISKFLOW_CONFIG_PATH", self.config_path())
            .env("DISKFLOW_STATE_DIR", self.state_dir())
            .env("NO_COLOR", "1")
            .env_remove("DISKFLOW_SIMULATE_FAIL")
            .env_remove("RUST_LOG");
        cmd
    }

    /// `diskflow run` with a standard set of disk arguments
    pub fn run_cmd(&self, disk: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.args([
            "run",
            "--resource-group",
            "rg-test",
            "--vm",
            "vm01",
            "--disk",
            disk,
            "--size",
            "32",
            "--target-size",
            "64",
        ]);
        cmd
    }

    /// Ids of every stored run
    pub fn run_ids(&self) -> Vec<String> {
        let dir = self.state_dir().join("runs");
        if !dir.exists() {
            return Vec::new();
        }
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| {
                let name = entry.unwrap().file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect()
    }

    pub fn read_run(&self, id: &str) -> serde_json::Value {
        let path = self.state_dir().join("runs").join(format!("{}.json", id));
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }
}
