use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ferrodav_core::{
    BackendError, CollectionSource, CollectionTarget, DocumentSource, DocumentTarget,
    MissingTarget, Property, PropertyName, SourceRemover, Target, join_url,
};
use tokio_util::sync::CancellationToken;

/// In-memory resource tree implementing both sides of the execution
/// contracts: entries can be read as sources and addressed as targets.
///
/// Every mutating backend call is appended to a log so tests can
/// assert exactly which operations ran.
#[derive(Clone, Default)]
pub struct MemTree {
    inner: Arc<Mutex<TreeState>>,
}

#[derive(Default)]
struct TreeState {
    nodes: BTreeMap<String, Node>,
    log: Vec<String>,
    rejected: HashSet<PropertyName>,
    failing: HashSet<String>,
}

#[derive(Clone)]
struct Node {
    kind: NodeKind,
    live: Vec<Property>,
    applied: Vec<Property>,
}

#[derive(Clone, PartialEq, Eq)]
enum NodeKind {
    Document(Vec<u8>),
    Collection,
}

impl Node {
    fn document(content: &[u8]) -> Self {
        Self {
            kind: NodeKind::Document(content.to_vec()),
            live: Vec::new(),
            applied: Vec::new(),
        }
    }

    fn collection() -> Self {
        Self {
            kind: NodeKind::Collection,
            live: Vec::new(),
            applied: Vec::new(),
        }
    }
}

fn leaf_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

fn is_direct_child(parent: &str, candidate: &str) -> bool {
    // A sibling like "/ab" must not count as a child of "/a": the
    // candidate has to continue with a separator after the parent.
    let rest = match candidate.strip_prefix(parent) {
        Some(rest) if parent.ends_with('/') => rest,
        Some(rest) => match rest.strip_prefix('/') {
            Some(rest) => rest,
            None => return false,
        },
        None => return false,
    };
    !rest.is_empty() && !rest.contains('/')
}

impl MemTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TreeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_collection(&self, path: &str) {
        self.state().nodes.insert(path.to_string(), Node::collection());
    }

    pub fn add_document(&self, path: &str, content: &[u8]) {
        self.state()
            .nodes
            .insert(path.to_string(), Node::document(content));
    }

    /// Properties the entry at `path` exposes as a source.
    pub fn set_live_properties(&self, path: &str, properties: Vec<Property>) {
        if let Some(node) = self.state().nodes.get_mut(path) {
            node.live = properties;
        }
    }

    /// Makes every subsequent property write decline this name.
    pub fn reject_property(&self, name: PropertyName) {
        self.state().rejected.insert(name);
    }

    /// Makes every subsequent mutating call addressing `path` fail.
    pub fn fail_path(&self, path: &str) {
        self.state().failing.insert(path.to_string());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state().nodes.contains_key(path)
    }

    pub fn is_collection(&self, path: &str) -> bool {
        matches!(
            self.state().nodes.get(path).map(|node| node.kind.clone()),
            Some(NodeKind::Collection)
        )
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        match self.state().nodes.get(path).map(|node| node.kind.clone()) {
            Some(NodeKind::Document(content)) => Some(content),
            _ => None,
        }
    }

    /// Properties written to `path` through a target handle.
    pub fn applied_properties(&self, path: &str) -> Vec<Property> {
        self.state()
            .nodes
            .get(path)
            .map(|node| node.applied.clone())
            .unwrap_or_default()
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Source view of the document at `path`.
    pub fn document(&self, path: &str) -> Option<Arc<dyn DocumentSource>> {
        let state = self.state();
        match state.nodes.get(path)?.kind {
            NodeKind::Document(_) => Some(Arc::new(MemDocumentSource {
                tree: self.clone(),
                path: path.to_string(),
                name: leaf_name(path),
                relative: path.trim_start_matches('/').to_string(),
            })),
            NodeKind::Collection => None,
        }
    }

    /// Source view of the collection at `path`.
    pub fn collection(&self, path: &str) -> Option<Arc<dyn CollectionSource>> {
        let state = self.state();
        match state.nodes.get(path)?.kind {
            NodeKind::Collection => Some(Arc::new(MemCollectionSource {
                tree: self.clone(),
                path: path.to_string(),
                name: leaf_name(path),
                relative: path.trim_start_matches('/').to_string(),
            })),
            NodeKind::Document(_) => None,
        }
    }

    /// Probes the current state at `url` and wraps it as a target
    /// handle.
    pub fn target(&self, url: &str) -> Target {
        match self.state().nodes.get(url).map(|node| node.kind.clone()) {
            Some(NodeKind::Document(_)) => Target::Document(Box::new(MemDocumentTarget {
                tree: self.clone(),
                url: url.to_string(),
            })),
            Some(NodeKind::Collection) => Target::collection(Box::new(MemCollectionTarget {
                tree: self.clone(),
                url: url.to_string(),
            })),
            None => Target::Missing(Box::new(MemMissingTarget {
                tree: self.clone(),
                url: url.to_string(),
            })),
        }
    }

    fn check_mutable(state: &TreeState, path: &str) -> Result<(), BackendError> {
        if state.failing.contains(path) {
            return Err(BackendError::other(format!("injected failure at {path}")));
        }
        Ok(())
    }

    fn write_properties_at(
        &self,
        path: &str,
        properties: &[Property],
    ) -> Result<Vec<PropertyName>, BackendError> {
        let mut state = self.state();
        Self::check_mutable(&state, path)?;
        state.log.push(format!("propset {path}"));
        let rejected: Vec<PropertyName> = properties
            .iter()
            .filter(|property| state.rejected.contains(&property.name))
            .map(|property| property.name.clone())
            .collect();
        let accepted: Vec<Property> = properties
            .iter()
            .filter(|property| !state.rejected.contains(&property.name))
            .cloned()
            .collect();
        let Some(node) = state.nodes.get_mut(path) else {
            return Err(BackendError::Conflict(format!("no resource at {path}")));
        };
        node.applied
            .retain(|existing| !accepted.iter().any(|new| new.name == existing.name));
        node.applied.extend(accepted);
        Ok(rejected)
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), BackendError> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }
    Ok(())
}

struct MemDocumentSource {
    tree: MemTree,
    path: String,
    name: String,
    relative: String,
}

#[async_trait]
impl DocumentSource for MemDocumentSource {
    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn relative_path(&self) -> &str {
        &self.relative
    }

    fn live_properties(&self) -> Vec<Property> {
        self.tree
            .state()
            .nodes
            .get(&self.path)
            .map(|node| node.live.clone())
            .unwrap_or_default()
    }

    async fn read_content(&self, cancel: &CancellationToken) -> Result<Vec<u8>, BackendError> {
        ensure_live(cancel)?;
        self.tree
            .content(&self.path)
            .ok_or_else(|| BackendError::Conflict(format!("no document at {}", self.path)))
    }
}

struct MemCollectionSource {
    tree: MemTree,
    path: String,
    name: String,
    relative: String,
}

#[async_trait]
impl CollectionSource for MemCollectionSource {
    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn relative_path(&self) -> &str {
        &self.relative
    }

    fn live_properties(&self) -> Vec<Property> {
        self.tree
            .state()
            .nodes
            .get(&self.path)
            .map(|node| node.live.clone())
            .unwrap_or_default()
    }

    async fn child_documents(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn DocumentSource>>, BackendError> {
        ensure_live(cancel)?;
        let paths: Vec<String> = {
            let state = self.tree.state();
            state
                .nodes
                .iter()
                .filter(|(path, node)| {
                    is_direct_child(&self.path, path)
                        && matches!(node.kind, NodeKind::Document(_))
                })
                .map(|(path, _)| path.clone())
                .collect()
        };
        Ok(paths
            .into_iter()
            .filter_map(|path| self.tree.document(&path))
            .collect())
    }

    async fn child_collections(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn CollectionSource>>, BackendError> {
        ensure_live(cancel)?;
        let paths: Vec<String> = {
            let state = self.tree.state();
            state
                .nodes
                .iter()
                .filter(|(path, node)| {
                    is_direct_child(&self.path, path) && node.kind == NodeKind::Collection
                })
                .map(|(path, _)| path.clone())
                .collect()
        };
        Ok(paths
            .into_iter()
            .filter_map(|path| self.tree.collection(&path))
            .collect())
    }
}

#[async_trait]
impl SourceRemover for MemTree {
    async fn remove_document(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        ensure_live(cancel)?;
        let mut state = self.state();
        MemTree::check_mutable(&state, path)?;
        if state.nodes.remove(path).is_none() {
            return Err(BackendError::Conflict(format!("no document at {path}")));
        }
        state.log.push(format!("remove {path}"));
        Ok(())
    }

    async fn remove_collection(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        ensure_live(cancel)?;
        let mut state = self.state();
        MemTree::check_mutable(&state, path)?;
        let prefix = format!("{path}/");
        if state.nodes.keys().any(|key| key.starts_with(&prefix)) {
            return Err(BackendError::Conflict(format!("collection {path} not empty")));
        }
        if state.nodes.remove(path).is_none() {
            return Err(BackendError::Conflict(format!("no collection at {path}")));
        }
        state.log.push(format!("remove {path}"));
        Ok(())
    }
}

struct MemMissingTarget {
    tree: MemTree,
    url: String,
}

#[async_trait]
impl MissingTarget for MemMissingTarget {
    fn url(&self) -> &str {
        &self.url
    }

    async fn create_document(
        self: Box<Self>,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DocumentTarget>, BackendError> {
        ensure_live(cancel)?;
        let content = source.read_content(cancel).await?;
        let mut state = self.tree.state();
        MemTree::check_mutable(&state, &self.url)?;
        state.nodes.insert(self.url.clone(), Node::document(&content));
        state.log.push(format!("create {}", self.url));
        drop(state);
        Ok(Box::new(MemDocumentTarget {
            tree: self.tree,
            url: self.url,
        }))
    }

    async fn create_collection(
        self: Box<Self>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn CollectionTarget>, BackendError> {
        ensure_live(cancel)?;
        let mut state = self.tree.state();
        MemTree::check_mutable(&state, &self.url)?;
        state.nodes.insert(self.url.clone(), Node::collection());
        state.log.push(format!("create {}", self.url));
        drop(state);
        Ok(Box::new(MemCollectionTarget {
            tree: self.tree,
            url: self.url,
        }))
    }
}

struct MemDocumentTarget {
    tree: MemTree,
    url: String,
}

#[async_trait]
impl DocumentTarget for MemDocumentTarget {
    fn url(&self) -> &str {
        &self.url
    }

    async fn delete(
        self: Box<Self>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn MissingTarget>, BackendError> {
        ensure_live(cancel)?;
        let mut state = self.tree.state();
        MemTree::check_mutable(&state, &self.url)?;
        state.nodes.remove(&self.url);
        state.log.push(format!("delete {}", self.url));
        drop(state);
        Ok(Box::new(MemMissingTarget {
            tree: self.tree,
            url: self.url,
        }))
    }

    async fn replace(
        self: Box<Self>,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DocumentTarget>, BackendError> {
        ensure_live(cancel)?;
        let content = source.read_content(cancel).await?;
        let mut state = self.tree.state();
        MemTree::check_mutable(&state, &self.url)?;
        match state.nodes.get_mut(&self.url) {
            Some(node) => node.kind = NodeKind::Document(content),
            None => return Err(BackendError::Conflict(format!("no document at {}", self.url))),
        }
        state.log.push(format!("replace {}", self.url));
        drop(state);
        Ok(self)
    }

    async fn properties(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError> {
        ensure_live(cancel)?;
        Ok(self.tree.applied_properties(&self.url))
    }

    async fn write_properties(
        &mut self,
        properties: &[Property],
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyName>, BackendError> {
        ensure_live(cancel)?;
        self.tree.write_properties_at(&self.url, properties)
    }
}

struct MemCollectionTarget {
    tree: MemTree,
    url: String,
}

#[async_trait]
impl CollectionTarget for MemCollectionTarget {
    fn url(&self) -> &str {
        &self.url
    }

    async fn delete(
        self: Box<Self>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn MissingTarget>, BackendError> {
        ensure_live(cancel)?;
        let mut state = self.tree.state();
        MemTree::check_mutable(&state, &self.url)?;
        let prefix = format!("{}/", self.url);
        state
            .nodes
            .retain(|key, _| key != &self.url && !key.starts_with(&prefix));
        state.log.push(format!("delete {}", self.url));
        drop(state);
        Ok(Box::new(MemMissingTarget {
            tree: self.tree,
            url: self.url,
        }))
    }

    async fn child(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        ensure_live(cancel)?;
        let child_url = join_url(&self.url, name);
        self.tree.state().log.push(format!("probe {child_url}"));
        Ok(self.tree.target(&child_url))
    }

    fn missing_child(&self, name: &str) -> Box<dyn MissingTarget> {
        Box::new(MemMissingTarget {
            tree: self.tree.clone(),
            url: join_url(&self.url, name),
        })
    }

    async fn properties(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError> {
        ensure_live(cancel)?;
        Ok(self.tree.applied_properties(&self.url))
    }

    async fn write_properties(
        &mut self,
        properties: &[Property],
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyName>, BackendError> {
        ensure_live(cancel)?;
        self.tree.write_properties_at(&self.url, properties)
    }
}
