use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Network stack run against the file-backed memory provider
pub const WEB_TOPOLOGY: &str = r#"
project "demo"

provider "memory"

resource-type "network"
resource-type "subnet" {
    depends-on "network"
}
resource-type "security-group" {
    depends-on "network"
    blocked-by "network-interface"
}
resource-type "network-interface" {
    depends-on "security-group"
    attachment
}

deployment "web" {
    resource "network" "main" {
        cidr-block "10.0.0.0/16"
    }
    resource "subnet" "a" {
        parent "network" "main"
        cidr-block "10.0.1.0/24"
    }
    resource "security-group" "app" {
        parent "network" "main"
    }
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_topology(content: &str) -> Self {
        let project = Self::new();
        project.write_topology(content);
        project
    }

    pub fn write_topology(&self, content: &str) {
        fs::write(self.root.path().join("stack.kdl"), content).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn memory_state_path(&self) -> PathBuf {
        self.path().join(".stackflow").join("memory-state.json")
    }

    /// Seed the memory provider with resources that exist before any apply
    pub fn write_memory_state(&self, resources: serde_json::Value) {
        let path = self.memory_state_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let state = serde_json::json!({
            "version": 1,
            "next_id": 100,
            "resources": resources,
        });
        fs::write(path, serde_json::to_string_pretty(&state).unwrap()).unwrap();
    }

    /// The CLI, run inside the project with user settings shut out
    pub fn stack(&self) -> Command {
        let mut cmd = Command::cargo_bin("stack").unwrap();
        cmd.current_dir(self.path())
            .env("STACKFLOW_CONFIG_PATH", self.path().join("no-settings.yaml"))
            .env("NO_COLOR", "1")
            .env_remove("STACKFLOW_TOPOLOGY")
            .env_remove("STACKFLOW_WORKERS")
            .env_remove("STACKFLOW_MAX_ATTEMPTS")
            .env_remove("STACKFLOW_CALL_TIMEOUT_SECS")
            .env_remove("RUST_LOG");
        cmd
    }
}
