//! In-memory drive for testing.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use drivekv_common::{Error, Result};

use crate::paths::{CONFLICT_BEHAVIOR, GRAPH_BASE};
use crate::transport::Transport;

const APP_ROOT: &str = "me/drive/special/approot";

/// HTTP method of a recorded or matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

type Matcher = Box<dyn Fn(&str, Option<&str>) -> bool + Send + Sync>;

/// What happens to a request that matches a rule.
enum Effect {
    Fail { status: u16, status_text: String },
    Delay(Duration),
}

struct Rule {
    method: Method,
    matcher: Matcher,
    effect: Effect,
}

#[derive(Debug, Clone)]
struct StoredFile {
    id: String,
    content: String,
}

#[derive(Default)]
struct DriveState {
    folders: HashMap<String, BTreeMap<String, StoredFile>>,
    requests: Vec<(Method, String)>,
}

/// Parsed form of an app-root relative path.
#[derive(Debug, PartialEq)]
enum Route {
    AppRootChildren,
    Children { folder: String, skip: usize },
    Content { folder: String, file: String },
    Item { folder: String, file: String },
}

/// In-memory stand-in for the OneDrive app folder.
///
/// Understands the same path conventions as the Graph transport, pages
/// listings, answers a repeated folder creation with `409 Conflict` like
/// the real API, and can inject failures or latency into chosen requests.
/// Cloning yields a handle to the same drive.
#[derive(Clone)]
pub struct MemoryDrive {
    state: Arc<Mutex<DriveState>>,
    rules: Arc<Mutex<Vec<Rule>>>,
    page_size: usize,
    expected_token: Option<String>,
}

impl MemoryDrive {
    /// Create a new empty drive.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DriveState::default())),
            rules: Arc::new(Mutex::new(Vec::new())),
            page_size: 200,
            expected_token: None,
        }
    }

    /// Return at most `page_size` items per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Reject every request whose bearer token differs from `token`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.expected_token = Some(token.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rules(&self) -> MutexGuard<'_, Vec<Rule>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail requests matching `method` and `matcher(path, body)`.
    pub fn fail_when<F>(&self, method: Method, matcher: F, status: u16, status_text: &str)
    where
        F: Fn(&str, Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.rules().push(Rule {
            method,
            matcher: Box::new(matcher),
            effect: Effect::Fail {
                status,
                status_text: status_text.to_string(),
            },
        });
    }

    /// Delay requests matching `method` and `matcher(path, body)`.
    pub fn delay_when<F>(&self, method: Method, matcher: F, delay: Duration)
    where
        F: Fn(&str, Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.rules().push(Rule {
            method,
            matcher: Box::new(matcher),
            effect: Effect::Delay(delay),
        });
    }

    /// Remove all injected failures and delays.
    pub fn clear_faults(&self) {
        self.rules().clear();
    }

    /// Create a folder directly, bypassing the API.
    pub fn create_folder(&self, folder: &str) {
        self.state().folders.entry(folder.to_string()).or_default();
    }

    /// Store a file directly, creating its folder if needed.
    pub fn insert_file(&self, folder: &str, name: &str, content: impl Into<String>) {
        self.state()
            .folders
            .entry(folder.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredFile {
                    id: Uuid::new_v4().to_string(),
                    content: content.into(),
                },
            );
    }

    /// Names of all folders under the app root.
    pub fn folders(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().folders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Files of a folder as `name -> content`.
    pub fn files(&self, folder: &str) -> BTreeMap<String, String> {
        self.state()
            .folders
            .get(folder)
            .map(|files| {
                files
                    .iter()
                    .map(|(name, file)| (name.clone(), file.content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state().requests.clone()
    }

    /// Count requests of one method.
    pub fn request_count(&self, method: Method) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|(m, _)| *m == method)
            .count()
    }

    /// Record the request, check the token and apply injected effects.
    async fn intercept(
        &self,
        token: &str,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<()> {
        self.state().requests.push((method, path.to_string()));

        let (delay, failure) = {
            let rules = self.rules();
            let mut delay = None;
            let mut failure = None;
            for rule in rules.iter() {
                if rule.method != method || !(rule.matcher)(path, body) {
                    continue;
                }
                match &rule.effect {
                    Effect::Delay(d) => delay = Some(*d),
                    Effect::Fail {
                        status,
                        status_text,
                    } if failure.is_none() => {
                        failure = Some(Error::transport(*status, status_text.clone()))
                    }
                    Effect::Fail { .. } => {}
                }
            }
            (delay, failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let token_ok = match &self.expected_token {
            Some(expected) => expected == token,
            None => !token.is_empty(),
        };
        if !token_ok {
            return Err(Error::Unauthorized("Unauthorized".to_string()));
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn route(path: &str) -> Result<Route> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let rest = path.strip_prefix(APP_ROOT).ok_or_else(bad_request)?;

        if rest == "/children" {
            return Ok(Route::AppRootChildren);
        }

        let rest = rest.strip_prefix(":/").ok_or_else(bad_request)?;
        let split = rest.rfind(":/").ok_or_else(bad_request)?;
        let (item_path, suffix) = (&rest[..split], &rest[split + 2..]);

        let segments = item_path
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8().map(|s| s.into_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| bad_request())?;

        match (segments.as_slice(), suffix) {
            ([folder], "children") => {
                let skip = query
                    .and_then(|q| q.strip_prefix("$skiptoken="))
                    .map(|n| n.parse::<usize>().map_err(|_| bad_request()))
                    .transpose()?
                    .unwrap_or(0);
                Ok(Route::Children {
                    folder: folder.clone(),
                    skip,
                })
            }
            ([folder, file], "content") => Ok(Route::Content {
                folder: folder.clone(),
                file: file.clone(),
            }),
            ([folder, file], "") => Ok(Route::Item {
                folder: folder.clone(),
                file: file.clone(),
            }),
            _ => Err(bad_request()),
        }
    }
}

impl Default for MemoryDrive {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_request() -> Error {
    Error::transport(400, "Bad Request")
}

fn not_found() -> Error {
    Error::transport(404, "Not Found")
}

#[async_trait]
impl Transport for MemoryDrive {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, token: &str, path: &str) -> Result<Value> {
        self.intercept(token, Method::Get, path, None).await?;

        match Self::route(path)? {
            Route::Children { folder, skip } => {
                let state = self.state();
                let files = state.folders.get(&folder).ok_or_else(not_found)?;
                let value: Vec<Value> = files
                    .iter()
                    .skip(skip)
                    .take(self.page_size)
                    .map(|(name, file)| {
                        json!({"id": file.id, "name": name, "size": file.content.len(), "file": {}})
                    })
                    .collect();

                let mut page = json!({ "value": value });
                let next = skip + self.page_size;
                if next < files.len() {
                    let base = path.split('?').next().unwrap_or(path);
                    page["@odata.nextLink"] =
                        json!(format!("{}{}?$skiptoken={}", GRAPH_BASE, base, next));
                }
                Ok(page)
            }
            Route::Content { folder, file } => {
                let content = self
                    .state()
                    .folders
                    .get(&folder)
                    .and_then(|files| files.get(&file))
                    .map(|f| f.content.clone())
                    .ok_or_else(not_found)?;
                serde_json::from_str(&content)
                    .map_err(|e| Error::Parse(format!("Invalid JSON from {}: {}", path, e)))
            }
            _ => Err(bad_request()),
        }
    }

    async fn post(&self, token: &str, path: &str, body: &Value) -> Result<Value> {
        let text = body.to_string();
        self.intercept(token, Method::Post, path, Some(&text)).await?;

        if Self::route(path)? != Route::AppRootChildren || body.get("folder").is_none() {
            return Err(bad_request());
        }
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(bad_request)?;

        // Unannotated requests rename, so only an explicit "fail" yields 409
        let behavior = body
            .get(CONFLICT_BEHAVIOR)
            .and_then(Value::as_str)
            .unwrap_or("rename");

        let mut state = self.state();
        let name = match (state.folders.contains_key(name), behavior) {
            (false, _) | (true, "replace") => name.to_string(),
            (true, "fail") => return Err(Error::transport(409, "Conflict")),
            (true, "rename") => (1..)
                .map(|n| format!("{} {}", name, n))
                .find(|candidate| !state.folders.contains_key(candidate))
                .ok_or_else(bad_request)?,
            (true, _) => return Err(bad_request()),
        };
        state.folders.entry(name.clone()).or_default();
        Ok(json!({"id": Uuid::new_v4().to_string(), "name": name, "folder": {"childCount": 0}}))
    }

    async fn put(&self, token: &str, path: &str, body: String) -> Result<Value> {
        self.intercept(token, Method::Put, path, Some(&body)).await?;

        let Route::Content { folder, file } = Self::route(path)? else {
            return Err(bad_request());
        };
        let size = body.len();
        let id = Uuid::new_v4().to_string();
        self.state().folders.entry(folder).or_default().insert(
            file.clone(),
            StoredFile {
                id: id.clone(),
                content: body,
            },
        );
        Ok(json!({"id": id, "name": file, "size": size, "file": {"mimeType": "text/plain"}}))
    }

    async fn delete(&self, token: &str, path: &str) -> Result<()> {
        self.intercept(token, Method::Delete, path, None).await?;

        let Route::Item { folder, file } = Self::route(path)? else {
            return Err(bad_request());
        };
        self.state()
            .folders
            .get_mut(&folder)
            .and_then(|files| files.remove(&file))
            .map(|_| ())
            .ok_or_else(not_found)
    }
}
