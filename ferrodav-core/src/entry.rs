use std::{fmt, future::Future, pin::Pin, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{BackendError, Property};

/// Recursion bound for a traversal, using the protocol spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "infinity")]
    Infinity,
}

impl Depth {
    /// Depth left for a child once one level has been descended, or
    /// `None` when children must not be expanded at all.
    pub fn descend(self) -> Option<Self> {
        match self {
            Self::Zero => None,
            Self::One => Some(Self::Zero),
            Self::Infinity => Some(Self::Infinity),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid depth: {0}")]
pub struct DepthParseError(String);

impl FromStr for Depth {
    type Err = DepthParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "0" => Ok(Self::Zero),
            "1" => Ok(Self::One),
            value if value.eq_ignore_ascii_case("infinity") => Ok(Self::Infinity),
            other => Err(DepthParseError(other.to_string())),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => f.write_str("0"),
            Self::One => f.write_str("1"),
            Self::Infinity => f.write_str("infinity"),
        }
    }
}

/// Read-only view of a source document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Identity of the entry within the source tree.
    fn path(&self) -> &str;

    fn name(&self) -> &str;

    /// Destination-relative path, used by callers to compose child
    /// addresses when rendering per-resource results.
    fn relative_path(&self) -> &str;

    /// Properties computed from the entry's current state.
    fn live_properties(&self) -> Vec<Property>;

    async fn read_content(&self, cancel: &CancellationToken) -> Result<Vec<u8>, BackendError>;
}

/// Read-only view of a source collection.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    fn path(&self) -> &str;

    fn name(&self) -> &str;

    fn relative_path(&self) -> &str;

    fn live_properties(&self) -> Vec<Property>;

    /// Child documents in source enumeration order.
    async fn child_documents(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn DocumentSource>>, BackendError>;

    /// Child sub-collections in source enumeration order.
    async fn child_collections(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn CollectionSource>>, BackendError>;
}

/// Removal access to the source tree, needed by verbs that consume
/// their source (move, delete).
#[async_trait]
pub trait SourceRemover: Send + Sync {
    async fn remove_document(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError>;

    /// Removes a collection that no longer holds children.
    async fn remove_collection(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError>;
}

/// Immutable snapshot of a collection and its children, captured once
/// at traversal start for a requested depth.
pub struct CollectionNode {
    pub collection: Arc<dyn CollectionSource>,
    pub documents: Vec<Arc<dyn DocumentSource>>,
    pub collections: Vec<CollectionNode>,
}

impl CollectionNode {
    /// Snapshot without children, regardless of what the collection
    /// holds.
    pub fn leaf(collection: Arc<dyn CollectionSource>) -> Self {
        Self {
            collection,
            documents: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Enumerates children once, consuming `depth` top-down: a child
    /// node is only expanded if the depth permits recursion past it.
    pub fn fetch<'a>(
        collection: Arc<dyn CollectionSource>,
        depth: Depth,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Self, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(child_depth) = depth.descend() else {
                return Ok(Self::leaf(collection));
            };

            let documents = collection.child_documents(cancel).await?;
            let mut collections = Vec::new();
            for child in collection.child_collections(cancel).await? {
                collections.push(Self::fetch(child, child_depth, cancel).await?);
            }

            Ok(Self {
                collection,
                documents,
                collections,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyName;

    struct StubDocument {
        path: String,
        name: String,
    }

    #[async_trait]
    impl DocumentSource for StubDocument {
        fn path(&self) -> &str {
            &self.path
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn relative_path(&self) -> &str {
            &self.name
        }

        fn live_properties(&self) -> Vec<Property> {
            vec![Property::new(PropertyName::dav("displayname"), self.name.clone())]
        }

        async fn read_content(&self, _cancel: &CancellationToken) -> Result<Vec<u8>, BackendError> {
            Ok(b"stub".to_vec())
        }
    }

    struct StubCollection {
        path: String,
        name: String,
        documents: Vec<String>,
        collections: Vec<StubCollection>,
    }

    impl StubCollection {
        fn new(path: &str, documents: &[&str], collections: Vec<StubCollection>) -> Arc<Self> {
            Arc::new(Self {
                path: path.to_string(),
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                documents: documents.iter().map(|d| d.to_string()).collect(),
                collections,
            })
        }
    }

    #[async_trait]
    impl CollectionSource for StubCollection {
        fn path(&self) -> &str {
            &self.path
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn relative_path(&self) -> &str {
            &self.name
        }

        fn live_properties(&self) -> Vec<Property> {
            Vec::new()
        }

        async fn child_documents(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Arc<dyn DocumentSource>>, BackendError> {
            Ok(self
                .documents
                .iter()
                .map(|name| {
                    Arc::new(StubDocument {
                        path: format!("{}/{name}", self.path),
                        name: name.clone(),
                    }) as Arc<dyn DocumentSource>
                })
                .collect())
        }

        async fn child_collections(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Arc<dyn CollectionSource>>, BackendError> {
            Ok(self
                .collections
                .iter()
                .map(|child| {
                    Arc::new(StubCollection {
                        path: child.path.clone(),
                        name: child.name.clone(),
                        documents: child.documents.clone(),
                        collections: Vec::new(),
                    }) as Arc<dyn CollectionSource>
                })
                .collect())
        }
    }

    fn tree() -> Arc<StubCollection> {
        StubCollection::new(
            "/a",
            &["doc1"],
            vec![StubCollection {
                path: "/a/sub1".to_string(),
                name: "sub1".to_string(),
                documents: vec!["doc2".to_string()],
                collections: Vec::new(),
            }],
        )
    }

    #[test]
    fn depth_round_trips_protocol_spellings() {
        assert_eq!("0".parse::<Depth>().unwrap(), Depth::Zero);
        assert_eq!("1".parse::<Depth>().unwrap(), Depth::One);
        assert_eq!("Infinity".parse::<Depth>().unwrap(), Depth::Infinity);
        assert_eq!(Depth::Infinity.to_string(), "infinity");
        assert!("2".parse::<Depth>().is_err());
    }

    #[test]
    fn depth_serde_uses_protocol_spellings() {
        assert_eq!(serde_json::to_string(&Depth::Zero).unwrap(), "\"0\"");
        assert_eq!(serde_json::to_string(&Depth::Infinity).unwrap(), "\"infinity\"");
        assert_eq!(serde_json::from_str::<Depth>("\"1\"").unwrap(), Depth::One);
        assert!(serde_json::from_str::<Depth>("\"2\"").is_err());
    }

    #[test]
    fn depth_is_consumed_top_down() {
        assert_eq!(Depth::Zero.descend(), None);
        assert_eq!(Depth::One.descend(), Some(Depth::Zero));
        assert_eq!(Depth::Infinity.descend(), Some(Depth::Infinity));
    }

    #[tokio::test]
    async fn fetch_depth_zero_expands_nothing() {
        let cancel = CancellationToken::new();
        let node = CollectionNode::fetch(tree(), Depth::Zero, &cancel)
            .await
            .unwrap();
        assert!(node.documents.is_empty());
        assert!(node.collections.is_empty());
    }

    #[tokio::test]
    async fn fetch_depth_one_expands_children_only() {
        let cancel = CancellationToken::new();
        let node = CollectionNode::fetch(tree(), Depth::One, &cancel)
            .await
            .unwrap();
        assert_eq!(node.documents.len(), 1);
        assert_eq!(node.collections.len(), 1);
        // The sub-collection node itself stays unexpanded.
        assert!(node.collections[0].documents.is_empty());
    }

    #[tokio::test]
    async fn fetch_depth_infinity_expands_recursively() {
        let cancel = CancellationToken::new();
        let root = StubCollection::new(
            "/a",
            &["doc1"],
            vec![StubCollection {
                path: "/a/sub1".to_string(),
                name: "sub1".to_string(),
                documents: vec!["doc2".to_string()],
                collections: Vec::new(),
            }],
        );
        let node = CollectionNode::fetch(root, Depth::Infinity, &cancel)
            .await
            .unwrap();
        assert_eq!(node.documents[0].name(), "doc1");
        assert_eq!(node.collections[0].collection.path(), "/a/sub1");
        assert_eq!(node.collections[0].documents[0].name(), "doc2");
    }
}
