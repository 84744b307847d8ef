//! Recording transport for tests.
//!
//! [`MockTransport`] records every operation it is asked to perform. Rules
//! match operations by substring and return canned results; anything no
//! rule matches is delegated to [`LocalTransport`], so a temp directory can
//! stand in for the repository host.

use crate::transport::{LocalTransport, Transport, TransportError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::process::Child;

/// Canned result for a matched operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Succeed with this stdout (empty for copies).
    Stdout(String),
    /// Fail as if the command exited with `status`.
    Fail { status: i32, stderr: String },
}

impl MockResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Stdout(stdout.into())
    }

    pub fn fail(status: i32, stderr: impl Into<String>) -> Self {
        Self::Fail {
            status,
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(String, MockResponse)>,
    calls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    local: LocalTransport,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer operations containing `pattern` with `response`. First
    /// matching rule wins.
    #[must_use]
    pub fn with_rule(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.add_rule(pattern, response);
        self
    }

    pub fn add_rule(&self, pattern: impl Into<String>, response: MockResponse) {
        if let Ok(mut state) = self.state.lock() {
            state.rules.push((pattern.into(), response));
        }
    }

    /// Every recorded operation, in call order.
    ///
    /// Commands are recorded as given; copies as `pull <src> -> <dst>`,
    /// `pull_tree ...`, `pull_files <n> -> <root>` and `push <src> -> <dst>`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Recorded operations containing `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(needle))
            .collect()
    }

    fn record(&self, call: String) -> Option<MockResponse> {
        let mut state = self.state.lock().ok()?;
        let response = state
            .rules
            .iter()
            .find(|(pattern, _)| call.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());
        state.calls.push(call);
        response
    }
}

fn failure(call: &str, status: i32, stderr: String) -> TransportError {
    TransportError::Failed {
        command: call.to_string(),
        status: Some(status),
        stderr,
    }
}

/// Apply a canned copy response. `None` means delegate.
fn copy_response(call: &str, response: Option<MockResponse>) -> Option<Result<(), TransportError>> {
    match response? {
        MockResponse::Stdout(_) => Some(Ok(())),
        MockResponse::Fail { status, stderr } => Some(Err(failure(call, status, stderr))),
    }
}

impl Transport for MockTransport {
    async fn run(&self, cmd: &str) -> Result<String, TransportError> {
        match self.record(cmd.to_string()) {
            Some(MockResponse::Stdout(out)) => Ok(out.trim().to_string()),
            Some(MockResponse::Fail { status, stderr }) => Err(failure(cmd, status, stderr)),
            None => self.local.run(cmd).await,
        }
    }

    async fn probe(&self, cmd: &str) -> Result<bool, TransportError> {
        match self.record(cmd.to_string()) {
            Some(MockResponse::Stdout(_)) => Ok(true),
            Some(MockResponse::Fail { status: 255, stderr }) => Err(failure(cmd, 255, stderr)),
            Some(MockResponse::Fail { .. }) => Ok(false),
            None => self.local.probe(cmd).await,
        }
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        let call = format!("pull {remote} -> {}", local.display());
        match copy_response(&call, self.record(call.clone())) {
            Some(result) => result,
            None => self.local.pull(remote, local).await,
        }
    }

    async fn pull_tree(&self, remote_dir: &str, local_dir: &Path) -> Result<(), TransportError> {
        let call = format!("pull_tree {remote_dir} -> {}", local_dir.display());
        match copy_response(&call, self.record(call.clone())) {
            Some(result) => result,
            None => self.local.pull_tree(remote_dir, local_dir).await,
        }
    }

    async fn pull_files(
        &self,
        remote_paths: &[String],
        local_root: &Path,
        recursive: bool,
    ) -> Result<(), TransportError> {
        let call = format!(
            "pull_files {} -> {}: {}",
            remote_paths.len(),
            local_root.display(),
            remote_paths.join(" ")
        );
        match copy_response(&call, self.record(call.clone())) {
            Some(result) => result,
            None => {
                self.local
                    .pull_files(remote_paths, local_root, recursive)
                    .await
            }
        }
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let call = format!("push {} -> {remote}", local.display());
        match copy_response(&call, self.record(call.clone())) {
            Some(result) => result,
            None => self.local.push(local, remote).await,
        }
    }

    fn follow(&self, cmd: &str) -> Result<Child, TransportError> {
        match self.record(cmd.to_string()) {
            Some(MockResponse::Fail { status, stderr }) => Err(failure(cmd, status, stderr)),
            Some(MockResponse::Stdout(out)) => self.local.follow(&format!(
                "printf '%s\\n' {}",
                crate::util::quote(&out)
            )),
            None => self.local.follow(cmd),
        }
    }
}
