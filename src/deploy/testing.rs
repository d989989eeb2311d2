//! In-memory fakes for the remote side.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::deploy::remote_fs::{EntryKind, RemoteEntry, RemoteFs};
use crate::deploy::runner::{CommandStream, OutputChunk};
use crate::deploy::transport::Transport;
use crate::error::{DeployError, Result};
use crate::ssh::ConnectionSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink,
    Other,
}

/// Mutating calls seen by [`MemoryFs`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    CreateDir(String),
    RemoveDir(String),
    RemoveFile(String),
    WriteFile(String),
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    ops: Vec<FsOp>,
    pseudo_entries: bool,
    drop_mkdir: bool,
    failing_stat: Option<String>,
    failing_write: Option<String>,
    sessions_opened: usize,
    sessions_closed: usize,
}

/// A remote filesystem held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<State>>,
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Listings include `.` and `..`.
    pub fn with_pseudo_entries(self) -> Self {
        self.state().pseudo_entries = true;
        self
    }

    /// mkdir succeeds without creating anything.
    pub fn dropping_mkdir(self) -> Self {
        self.state().drop_mkdir = true;
        self
    }

    pub fn failing_stat(self, path: &str) -> Self {
        self.state().failing_stat = Some(path.to_string());
        self
    }

    pub fn failing_write(self, path: &str) -> Self {
        self.state().failing_write = Some(path.to_string());
        self
    }

    fn insert_with_parents(&self, path: &str, node: Node) {
        let mut state = self.state();
        let mut current = parent(path);
        while let Some(dir) = current.filter(|d| !d.is_empty()) {
            state.nodes.entry(dir.to_string()).or_insert(Node::Dir);
            current = parent(dir);
        }
        state.nodes.insert(path.to_string(), node);
    }

    pub fn add_dir(&self, path: &str) {
        self.insert_with_parents(path, Node::Dir);
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.insert_with_parents(path, Node::File(contents.to_vec()));
    }

    pub fn add_symlink(&self, path: &str) {
        self.insert_with_parents(path, Node::Symlink);
    }

    pub fn add_unknown(&self, path: &str) {
        self.insert_with_parents(path, Node::Other);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state().nodes.contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.state().nodes.get(path) == Some(&Node::Dir)
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.state().nodes.get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Every path strictly below `dir`.
    pub fn paths_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir);
        self.state()
            .nodes
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn ops(&self) -> Vec<FsOp> {
        self.state().ops.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.state().sessions_closed
    }

    fn parent_is_dir(state: &State, path: &str) -> bool {
        match parent(path) {
            None | Some("") => true,
            Some(dir) => state.nodes.get(dir) == Some(&Node::Dir),
        }
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn exists(&self, path: &str) -> Result<bool> {
        let state = self.state();
        if state.failing_stat.as_deref() == Some(path) {
            return Err(DeployError::remote_fs("stat", path, "permission denied"));
        }
        Ok(state.nodes.contains_key(path))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let state = self.state();
        if state.nodes.get(path) != Some(&Node::Dir) {
            return Err(DeployError::remote_fs("opendir", path, "no such file"));
        }

        let prefix = format!("{}/", path);
        let mut entries = Vec::new();
        if state.pseudo_entries {
            entries.push(RemoteEntry::new(".", EntryKind::Directory));
            entries.push(RemoteEntry::new("..", EntryKind::Directory));
        }
        for (child, node) in &state.nodes {
            let Some(name) = child.strip_prefix(&prefix) else {
                continue;
            };
            if name.contains('/') {
                continue;
            }
            let kind = match node {
                Node::Dir => EntryKind::Directory,
                Node::File(_) => EntryKind::File,
                Node::Symlink => EntryKind::Symlink,
                Node::Other => EntryKind::Unknown,
            };
            entries.push(RemoteEntry::new(name, kind));
        }
        Ok(entries)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        match state.nodes.get(path) {
            Some(Node::File(_)) | Some(Node::Symlink) | Some(Node::Other) => {
                state.nodes.remove(path);
                state.ops.push(FsOp::RemoveFile(path.to_string()));
                Ok(())
            }
            _ => Err(DeployError::remote_fs("remove", path, "not a file")),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        if state.nodes.get(path) != Some(&Node::Dir) {
            return Err(DeployError::remote_fs("rmdir", path, "not a directory"));
        }
        let prefix = format!("{}/", path);
        if state.nodes.keys().any(|p| p.starts_with(&prefix)) {
            return Err(DeployError::remote_fs("rmdir", path, "directory not empty"));
        }
        state.nodes.remove(path);
        state.ops.push(FsOp::RemoveDir(path.to_string()));
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        if state.nodes.contains_key(path) {
            return Err(DeployError::remote_fs("mkdir", path, "already exists"));
        }
        if !Self::parent_is_dir(&state, path) {
            return Err(DeployError::remote_fs("mkdir", path, "no such file"));
        }
        state.ops.push(FsOp::CreateDir(path.to_string()));
        if !state.drop_mkdir {
            state.nodes.insert(path.to_string(), Node::Dir);
        }
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.failing_write.as_deref() == Some(path) {
            return Err(DeployError::remote_fs("write", path, "disk full"));
        }
        if !Self::parent_is_dir(&state, path) {
            return Err(DeployError::remote_fs("open", path, "no such file"));
        }
        state.nodes.insert(path.to_string(), Node::File(contents.to_vec()));
        state.ops.push(FsOp::WriteFile(path.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state().sessions_closed += 1;
        Ok(())
    }
}

/// Replays a fixed list of output chunks.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    chunks: VecDeque<OutputChunk>,
    hang: bool,
}

impl ScriptedStream {
    pub fn new(chunks: Vec<OutputChunk>) -> Self {
        Self {
            chunks: chunks.into(),
            hang: false,
        }
    }

    /// Never finishes once the script runs out.
    pub fn hanging(chunks: Vec<OutputChunk>) -> Self {
        Self {
            chunks: chunks.into(),
            hang: true,
        }
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl CommandStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<OutputChunk>> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.hang => std::future::pending().await,
            None => Ok(None),
        }
    }
}

/// Transport backed by a shared [`MemoryFs`] and a scripted command.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pub fs: MemoryFs,
    output: Mutex<Vec<OutputChunk>>,
    hang: bool,
    refuse_connections: bool,
    commands: Mutex<Vec<String>>,
    specs: Mutex<Vec<ConnectionSpec>>,
}

impl MemoryTransport {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            ..Default::default()
        }
    }

    pub fn with_output(self, output: Vec<OutputChunk>) -> Self {
        *self.output.lock().unwrap() = output;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn specs(&self) -> Vec<ConnectionSpec> {
        self.specs.lock().unwrap().clone()
    }

    fn connect(&self, spec: &ConnectionSpec) -> Result<()> {
        self.specs.lock().unwrap().push(spec.clone());
        if self.refuse_connections {
            return Err(DeployError::Connection(format!(
                "Connection to {} failed: refused",
                spec.address()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_filesystem(&self, spec: &ConnectionSpec) -> Result<Box<dyn RemoteFs>> {
        self.connect(spec)?;
        self.fs.state().sessions_opened += 1;
        Ok(Box::new(self.fs.clone()))
    }

    async fn open_exec(
        &self,
        spec: &ConnectionSpec,
        command: &str,
    ) -> Result<Box<dyn CommandStream>> {
        self.connect(spec)?;
        self.commands.lock().unwrap().push(command.to_string());

        let output = self.output.lock().unwrap().clone();
        let stream = if self.hang {
            ScriptedStream::hanging(output)
        } else {
            ScriptedStream::new(output)
        };
        Ok(Box::new(stream))
    }
}
