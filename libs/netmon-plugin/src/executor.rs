// [libs/netmon-plugin/src/executor.rs]
//! Spawns a plugin binary per batch: one JSON array of tasks on stdin,
//! one JSON array of results read from stdout at EOF. Exactly one
//! process per call, reaped before returning — no process outlives its
//! `poll`.

use crate::registry::PluginRegistry;
use netmon_protocol::{PluginResult, PluginTask};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{instrument, warn};

#[derive(Error, Debug)]
pub enum PluginExecutorError {
    #[error("no plugin registered with id `{0}`")]
    NotFound(String),
    #[error("failed to spawn plugin `{0}`: {1}")]
    SpawnFailure(String, std::io::Error),
    #[error("failed to write tasks to plugin `{0}` stdin: {1}")]
    StdinFailure(String, std::io::Error),
    #[error("plugin `{0}` exceeded its {1:?} timeout")]
    Timeout(String, Duration),
    #[error("plugin `{0}` exited with status {1}")]
    NonZeroExit(String, i32),
    #[error("plugin `{0}` produced unparseable stdout: {1}")]
    ParseFailure(String, serde_json::Error),
}

#[derive(Debug, Default)]
pub struct PluginExecutor;

impl PluginExecutor {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, registry, tasks), fields(plugin_id, task_count = tasks.len()))]
    pub async fn poll(
        &self,
        registry: &PluginRegistry,
        plugin_id: &str,
        tasks: Vec<PluginTask>,
    ) -> Result<Vec<PluginResult>, PluginExecutorError> {
        let manifest = registry
            .get_by_id(plugin_id)
            .ok_or_else(|| PluginExecutorError::NotFound(plugin_id.to_string()))?
            .clone();
        let binary_path = registry
            .binary_path(plugin_id)
            .ok_or_else(|| PluginExecutorError::NotFound(plugin_id.to_string()))?
            .to_path_buf();

        let payload = serde_json::to_vec(&tasks)
            .map_err(|e| PluginExecutorError::StdinFailure(plugin_id.to_string(), std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let mut child = Command::new(&binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PluginExecutorError::SpawnFailure(plugin_id.to_string(), e))?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| PluginExecutorError::StdinFailure(plugin_id.to_string(), e))?;
        drop(stdin);

        let timeout = Duration::from_millis(manifest.timeout_ms);
        let outcome = tokio::time::timeout(timeout, child.wait_with_output()).await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(io_err)) => return Err(PluginExecutorError::SpawnFailure(plugin_id.to_string(), io_err)),
            Err(_) => {
                return Err(PluginExecutorError::Timeout(plugin_id.to_string(), timeout));
            }
        };

        if !output.stderr.is_empty() {
            warn!(plugin_id = %plugin_id, stderr = %String::from_utf8_lossy(&output.stderr), "plugin wrote to stderr");
        }

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            return Err(PluginExecutorError::NonZeroExit(plugin_id.to_string(), exit_code));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| PluginExecutorError::ParseFailure(plugin_id.to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn write_executable_plugin(dir: &std::path::Path, name: &str, script: &str) {
        let manifest = format!(
            r#"{{"id":"{name}","name":"{name}","version":"0.1.0","protocol":"test","default_port":1,"timeout_ms":2000}}"#
        );
        std::fs::write(dir.join("manifest.json"), manifest).unwrap();

        let binary_path = dir.join(name);
        let mut file = std::fs::File::create(&binary_path).unwrap();
        file.write_all(script.as_bytes()).unwrap();
        let mut perms = std::fs::metadata(&binary_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&binary_path, perms).unwrap();
    }

    #[tokio::test]
    async fn parses_successful_plugin_output() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("echo-plugin");
        std::fs::create_dir(&plugin_dir).unwrap();
        write_executable_plugin(
            &plugin_dir,
            "echo-plugin",
            "#!/bin/sh\ncat <<'EOF'\n[{\"request_id\":\"r1\",\"status\":\"success\",\"metrics\":[]}]\nEOF\n",
        );

        let registry = PluginRegistry::scan(tmp.path()).unwrap();
        let executor = PluginExecutor::new();
        let tasks = vec![PluginTask {
            request_id: "r1".into(),
            target: "127.0.0.1".into(),
            port: 1,
            credentials: serde_json::json!({}),
        }];

        let results = executor.poll(&registry, "echo-plugin", tasks).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].request_id, "r1");
    }

    #[tokio::test]
    async fn nonzero_exit_fails_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("fail-plugin");
        std::fs::create_dir(&plugin_dir).unwrap();
        write_executable_plugin(&plugin_dir, "fail-plugin", "#!/bin/sh\nexit 1\n");

        let registry = PluginRegistry::scan(tmp.path()).unwrap();
        let executor = PluginExecutor::new();
        let err = executor.poll(&registry, "fail-plugin", vec![]).await.unwrap_err();
        assert!(matches!(err, PluginExecutorError::NonZeroExit(_, 1)));
    }

    #[tokio::test]
    async fn unknown_plugin_id_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::scan(tmp.path()).unwrap();
        let executor = PluginExecutor::new();
        let err = executor.poll(&registry, "ghost", vec![]).await.unwrap_err();
        assert!(matches!(err, PluginExecutorError::NotFound(_)));
    }
}
