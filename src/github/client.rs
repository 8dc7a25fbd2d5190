//! `ureq`-backed implementation of [`GitHubApi`].
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use ureq::http::Response;
use ureq::{Agent, Body, RequestBuilder};
use url::Url;

use super::{
    ApiError, FileDelete, FileWrite, GitHubApi, MergeRequest, NewPullRequest, PullRequest,
    RemoteFile, RepoId,
};

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size used when listing branches.
const PER_PAGE: usize = 100;

/// Attempts for idempotent GET requests.
const RETRY_COUNT: u32 = 3;

/// Base delay between GET retries; multiplied by the attempt number.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout for a single request.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("repo-sync/", env!("CARGO_PKG_VERSION"));

/// Blocking GitHub REST client.
pub struct Client {
    agent: Agent,
    base: Url,
    token: String,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.base.as_str())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct BranchEntry {
    name: String,
}

#[derive(serde::Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(serde::Deserialize)]
struct RefEntry {
    object: RefObject,
}

#[derive(Serialize)]
struct NewRef<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

impl Client {
    /// Create a client for `api_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] if `api_url` does not parse as a
    /// hierarchical URL.
    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let base = Url::parse(api_url).map_err(|_| ApiError::InvalidBaseUrl(api_url.to_owned()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(api_url.to_owned()));
        }
        let config = Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_global(Some(TRANSFER_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Ok(Self {
            agent: config.into(),
            base,
            token: token.into(),
        })
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    ///
    /// Segments containing `/` (branch names, file paths) are split so the
    /// slashes stay literal.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    fn authorize<B>(&self, req: RequestBuilder<B>) -> RequestBuilder<B> {
        req.header("Authorization", &format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", USER_AGENT)
    }

    /// Run an idempotent request, retrying transient failures.
    fn with_retry<T>(&self, mut op: impl FnMut() -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < RETRY_COUNT => {
                    tracing::debug!("transient GitHub error (attempt {attempt}): {e}");
                    std::thread::sleep(RETRY_DELAY * attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url, query: &[(&str, &str)]) -> Result<T, ApiError> {
        self.with_retry(|| {
            let mut req = self.authorize(self.agent.get(url.as_str()));
            for (k, v) in query {
                req = req.query(*k, *v);
            }
            decode(check(req.call()?)?)
        })
    }

    /// Exchange a GitHub App JWT for an installation access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange is refused.
    pub fn installation_token(
        api_url: &str,
        app_jwt: &str,
        installation_id: u64,
    ) -> Result<String, ApiError> {
        #[derive(serde::Deserialize)]
        struct AccessToken {
            token: String,
        }
        let client = Self::new(api_url, app_jwt)?;
        let id = installation_id.to_string();
        let url = client.endpoint(&["app", "installations", &id, "access_tokens"])?;
        let resp = client
            .authorize(client.agent.post(url.as_str()))
            .send_empty()?;
        let token: AccessToken = decode(check(resp)?)?;
        Ok(token.token)
    }
}

/// Map non-success statuses to [`ApiError`].
fn check(mut resp: Response<Body>) -> Result<Response<Body>, ApiError> {
    let status = resp.status().as_u16();
    if status == 404 {
        return Err(ApiError::NotFound);
    }
    if !resp.status().is_success() {
        let message = resp
            .body_mut()
            .read_to_string()
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        return Err(ApiError::Status { status, message });
    }
    Ok(resp)
}

fn decode<T: DeserializeOwned>(mut resp: Response<Body>) -> Result<T, ApiError> {
    resp.body_mut()
        .read_json::<T>()
        .map_err(|e| ApiError::Decode(e.to_string()))
}

impl GitHubApi for Client {
    fn list_branches(&self, repo: &RepoId) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "branches"])?;
        let per_page = PER_PAGE.to_string();
        let mut names = Vec::new();
        for page in 1.. {
            let page = page.to_string();
            let batch: Vec<BranchEntry> =
                self.get_json(&url, &[("per_page", &per_page), ("page", &page)])?;
            let len = batch.len();
            names.extend(batch.into_iter().map(|b| b.name));
            if len < PER_PAGE {
                break;
            }
        }
        Ok(names)
    }

    fn get_branch_sha(&self, repo: &RepoId, branch: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "git", "ref", "heads", branch])?;
        let entry: RefEntry = self.get_json(&url, &[])?;
        Ok(entry.object.sha)
    }

    fn create_branch(&self, repo: &RepoId, branch: &str, sha: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "git", "refs"])?;
        let body = NewRef {
            reference: format!("refs/heads/{branch}"),
            sha,
        };
        check(self.authorize(self.agent.post(url.as_str())).send_json(&body)?)?;
        Ok(())
    }

    fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        branch: &str,
    ) -> Result<Option<RemoteFile>, ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "contents", path])?;
        match self.get_json::<RemoteFile>(&url, &[("ref", branch)]) {
            Ok(file) => Ok(Some(file)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put_file(&self, repo: &RepoId, path: &str, write: &FileWrite) -> Result<(), ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "contents", path])?;
        check(self.authorize(self.agent.put(url.as_str())).send_json(write)?)?;
        Ok(())
    }

    fn delete_file(
        &self,
        repo: &RepoId,
        path: &str,
        delete: &FileDelete,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "contents", path])?;
        let req = self.authorize(self.agent.delete(url.as_str()).force_send_body());
        check(req.send_json(delete)?)?;
        Ok(())
    }

    fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "pulls"])?;
        decode(check(self.authorize(self.agent.post(url.as_str())).send_json(pr)?)?)
    }

    fn merge_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
        merge: &MergeRequest,
    ) -> Result<(), ApiError> {
        let number = number.to_string();
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "pulls", &number, "merge"])?;
        check(self.authorize(self.agent.put(url.as_str())).send_json(merge)?)?;
        Ok(())
    }

    fn delete_branch(&self, repo: &RepoId, branch: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "git", "refs", "heads", branch])?;
        check(self.authorize(self.agent.delete(url.as_str())).call()?)?;
        Ok(())
    }
}
