// Shared helpers for integration tests.
//
// Provides an in-memory GitHub, a log that records instead of printing,
// config/source file fixtures in a temporary directory, and bare git
// remotes for the clone strategy.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::Engine as _;
use git2::{Repository, Signature};
use repo_sync::fingerprint::fingerprint;
use repo_sync::github::{
    ApiError, FileDelete, FileWrite, GitHubApi, MergeRequest, NewPullRequest, PullRequest,
    PullRequestHead, RemoteFile, RepoId,
};
use repo_sync::logging::{Log, TargetEntry, TargetStatus};

pub const MESSAGE: &str = "chore: Sync by .github";

pub fn widgets() -> RepoId {
    RepoId::new("acme", "widgets")
}

// ---------------------------------------------------------------------------
// In-memory GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Branch {
    files: BTreeMap<String, Vec<u8>>,
    commit: u64,
}

#[derive(Debug, Clone)]
pub struct Pull {
    pub repo: RepoId,
    pub number: u64,
    pub head: String,
    pub base: String,
    pub merged: bool,
}

#[derive(Debug, Default)]
struct State {
    branches: BTreeMap<(RepoId, String), Branch>,
    pulls: Vec<Pull>,
    calls: Vec<String>,
    next_commit: u64,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_commit += 1;
        self.next_commit
    }

    fn branch_mut(&mut self, repo: &RepoId, branch: &str) -> Result<&mut Branch, ApiError> {
        self.branches
            .get_mut(&(repo.clone(), branch.to_string()))
            .ok_or(ApiError::NotFound)
    }
}

fn sha_of(commit: u64) -> String {
    format!("{commit:040x}")
}

fn refused(message: &str) -> ApiError {
    ApiError::Status {
        status: 422,
        message: message.to_string(),
    }
}

/// GitHub stand-in that keeps branches and files in memory and records
/// every call as `"<operation> <argument>"`.
#[derive(Debug, Default)]
pub struct FakeGitHub {
    state: Mutex<State>,
    refuse_pr_into: HashSet<String>,
    refuse_delete_ref: bool,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `branch` to `repo` holding `files`.
    pub fn with_branch(self, repo: &RepoId, branch: &str, files: &[(&str, &[u8])]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let commit = state.bump();
            state.branches.insert(
                (repo.clone(), branch.to_string()),
                Branch {
                    files: files
                        .iter()
                        .map(|(p, c)| ((*p).to_string(), c.to_vec()))
                        .collect(),
                    commit,
                },
            );
        }
        self
    }

    /// Refuse pull requests whose base is `branch`.
    pub fn refusing_pr_into(mut self, branch: &str) -> Self {
        self.refuse_pr_into.insert(branch.to_string());
        self
    }

    /// Refuse every ref deletion.
    pub fn refusing_ref_deletes(mut self) -> Self {
        self.refuse_delete_ref = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose operation is `op`.
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        let prefix = format!("{op} ");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    pub fn pulls(&self) -> Vec<Pull> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn branches(&self, repo: &RepoId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .keys()
            .filter(|(r, _)| r == repo)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn file(&self, repo: &RepoId, branch: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(&(repo.clone(), branch.to_string()))
            .and_then(|b| b.files.get(path).cloned())
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl GitHubApi for FakeGitHub {
    fn list_branches(&self, repo: &RepoId) -> Result<Vec<String>, ApiError> {
        self.log(format!("list_branches {repo}"));
        Ok(self.branches(repo))
    }

    fn get_branch_sha(&self, repo: &RepoId, branch: &str) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        Ok(sha_of(state.branch_mut(repo, branch)?.commit))
    }

    fn create_branch(&self, repo: &RepoId, branch: &str, sha: &str) -> Result<(), ApiError> {
        self.log(format!("create_branch {branch}"));
        let mut state = self.state.lock().unwrap();
        let key = (repo.clone(), branch.to_string());
        if state.branches.contains_key(&key) {
            return Err(refused("Reference already exists"));
        }
        let source = state
            .branches
            .iter()
            .find(|((r, _), b)| r == repo && sha_of(b.commit) == sha)
            .map(|(_, b)| b.clone())
            .ok_or(ApiError::NotFound)?;
        state.branches.insert(key, source);
        Ok(())
    }

    fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        branch: &str,
    ) -> Result<Option<RemoteFile>, ApiError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.branch_mut(repo, branch)?.files.get(path).map(|c| RemoteFile {
            sha: fingerprint(c).as_str().to_string(),
        }))
    }

    fn put_file(&self, repo: &RepoId, path: &str, write: &FileWrite) -> Result<(), ApiError> {
        self.log(format!("put_file {} {path}", write.branch));
        let content = base64::engine::general_purpose::STANDARD
            .decode(&write.content)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let commit = state.bump();
        let branch = state.branch_mut(repo, &write.branch)?;
        let current = branch
            .files
            .get(path)
            .map(|c| fingerprint(c).as_str().to_string());
        if current != write.sha {
            return Err(refused("sha does not match"));
        }
        branch.files.insert(path.to_string(), content);
        branch.commit = commit;
        Ok(())
    }

    fn delete_file(
        &self,
        repo: &RepoId,
        path: &str,
        delete: &FileDelete,
    ) -> Result<(), ApiError> {
        self.log(format!("delete_file {} {path}", delete.branch));
        let mut state = self.state.lock().unwrap();
        let commit = state.bump();
        let branch = state.branch_mut(repo, &delete.branch)?;
        branch.files.remove(path).ok_or(ApiError::NotFound)?;
        branch.commit = commit;
        Ok(())
    }

    fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, ApiError> {
        self.log(format!("create_pull_request {}", pr.base));
        if self.refuse_pr_into.contains(&pr.base) {
            return Err(refused("Validation Failed"));
        }
        let mut state = self.state.lock().unwrap();
        let head = sha_of(state.branch_mut(repo, &pr.head)?.commit);
        state.branch_mut(repo, &pr.base)?;
        let number = state.pulls.len() as u64 + 1;
        state.pulls.push(Pull {
            repo: repo.clone(),
            number,
            head: pr.head.clone(),
            base: pr.base.clone(),
            merged: false,
        });
        Ok(PullRequest {
            number,
            head: PullRequestHead { sha: head },
        })
    }

    fn merge_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
        merge: &MergeRequest,
    ) -> Result<(), ApiError> {
        self.log(format!("merge_pull_request #{number}"));
        assert_eq!(merge.merge_method, "squash");
        let mut state = self.state.lock().unwrap();
        let pull = state
            .pulls
            .iter()
            .find(|p| &p.repo == repo && p.number == number)
            .cloned()
            .ok_or(ApiError::NotFound)?;
        let head = state.branch_mut(repo, &pull.head)?.clone();
        if sha_of(head.commit) != merge.sha {
            return Err(refused("Head branch was modified"));
        }
        let commit = state.bump();
        let base = state.branch_mut(repo, &pull.base)?;
        base.files = head.files;
        base.commit = commit;
        if let Some(p) = state.pulls.iter_mut().find(|p| p.number == number) {
            p.merged = true;
        }
        Ok(())
    }

    fn delete_branch(&self, repo: &RepoId, branch: &str) -> Result<(), ApiError> {
        self.log(format!("delete_branch {branch}"));
        if self.refuse_delete_ref {
            return Err(refused("Reference is protected"));
        }
        let mut state = self.state.lock().unwrap();
        state
            .branches
            .remove(&(repo.clone(), branch.to_string()))
            .map(|_| ())
            .ok_or(ApiError::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Recording log
// ---------------------------------------------------------------------------

/// [`Log`] that keeps every line as `"<level>: <message>"`.
#[derive(Debug, Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<String>>,
    targets: Mutex<Vec<TargetEntry>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: &str, msg: &str) {
        self.lines.lock().unwrap().push(format!("{level}: {msg}"));
    }

    pub fn lines_at(&self, level: &str) -> Vec<String> {
        let prefix = format!("{level}: ");
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(String::from))
            .collect()
    }

    pub fn targets(&self) -> Vec<TargetEntry> {
        self.targets.lock().unwrap().clone()
    }

    pub fn status_of(&self, target: &str) -> Option<TargetStatus> {
        self.targets()
            .into_iter()
            .find(|t| t.target == target)
            .map(|t| t.status)
    }
}

impl Log for RecordingLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
    fn dry_run(&self, msg: &str) {
        self.push("dry_run", msg);
    }
    fn record_target(&self, target: &str, status: TargetStatus, message: Option<&str>) {
        self.targets.lock().unwrap().push(TargetEntry {
            target: target.to_string(),
            status,
            message: message.map(String::from),
        });
    }
}

// ---------------------------------------------------------------------------
// Files on disk
// ---------------------------------------------------------------------------

/// A temporary directory holding source files and config files.
pub struct Workspace {
    pub root: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write a source file and return its absolute path.
    pub fn source(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.root.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create source dir");
        }
        std::fs::write(&path, content).expect("write source");
        path
    }

    /// Write a config file holding `json` and return its path.
    pub fn config(&self, name: &str, json: &str) -> PathBuf {
        self.source(name, json.as_bytes())
    }
}

/// JSON for an update entry; `src` is rendered with forward slashes.
pub fn update_entry(src: &Path, dest: &str, branches: Option<&[&str]>) -> String {
    let src = src.to_string_lossy().replace('\\', "/");
    match branches {
        Some(patterns) => format!(
            r#"{{"src": "{src}", "dest": "{dest}", "branches": {}}}"#,
            serde_json::to_string(patterns).expect("encode patterns")
        ),
        None => format!(r#"{{"src": "{src}", "dest": "{dest}"}}"#),
    }
}

/// JSON for a delete entry.
pub fn delete_entry(dest: &str) -> String {
    format!(r#"{{"dest": "{dest}", "delete": true}}"#)
}

/// Wrap entries into a config array.
pub fn config_json(entries: &[String]) -> String {
    format!("[{}]", entries.join(", "))
}

// ---------------------------------------------------------------------------
// Bare git remotes
// ---------------------------------------------------------------------------

/// Create a bare remote at `<root>/<owner>/<name>.git` with one commit per
/// branch holding `files`.
pub fn bare_remote(
    root: &Path,
    repo: &RepoId,
    branches: &[(&str, &[(&str, &[u8])])],
) -> Repository {
    let dir = root.join(&repo.owner);
    std::fs::create_dir_all(&dir).expect("create owner dir");
    let bare = Repository::init_bare(dir.join(format!("{}.git", repo.name))).expect("init bare");
    {
        let sig = Signature::now("test", "test@example.com").expect("signature");
        for (branch, files) in branches {
            let mut builder = bare.treebuilder(None).expect("treebuilder");
            for (path, content) in *files {
                let blob = bare.blob(content).expect("blob");
                builder.insert(path, blob, 0o100_644).expect("insert");
            }
            let tree = bare
                .find_tree(builder.write().expect("write tree"))
                .expect("find tree");
            bare.commit(
                Some(&format!("refs/heads/{branch}")),
                &sig,
                &sig,
                "init",
                &tree,
                &[],
            )
            .expect("commit");
        }
        if let Some((first, _)) = branches.first() {
            bare.set_head(&format!("refs/heads/{first}")).expect("set head");
        }
    }
    bare
}

/// Commit at the tip of `branch` in `bare`.
pub fn tip(bare: &Repository, branch: &str) -> git2::Oid {
    bare.refname_to_id(&format!("refs/heads/{branch}"))
        .expect("branch exists")
}

/// Content of `path` at the tip of `branch`, if present.
pub fn file_at(bare: &Repository, branch: &str, path: &str) -> Option<Vec<u8>> {
    let tree = bare
        .find_commit(tip(bare, branch))
        .expect("commit")
        .tree()
        .expect("tree");
    let entry = tree.get_path(Path::new(path)).ok()?;
    Some(bare.find_blob(entry.id()).expect("blob").content().to_vec())
}
