use ferrodav_core::{CollectionNode, Depth};
use ferrodav_engine::{
    DeletePolicy, EngineOptions, ExecutionEngine, MovePolicy, Outcome, OutcomeStatus, Source,
};
use ferrodav_memfs::MemTree;
use tokio_util::sync::CancellationToken;

async fn snapshot(tree: &MemTree, path: &str, cancel: &CancellationToken) -> CollectionNode {
    CollectionNode::fetch(tree.collection(path).unwrap(), Depth::Infinity, cancel)
        .await
        .unwrap()
}

#[tokio::test]
async fn move_document_removes_the_source() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_document("/src", b"moved");

    let policy = MovePolicy::new(tree.clone());
    let engine = ExecutionEngine::new(&policy, EngineOptions::default());
    let source = tree.document("/src").unwrap();
    let outcome = engine
        .execute("/dst", Source::Document(source.as_ref()), tree.target("/dst"), &cancel)
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Created);
    assert_eq!(tree.content("/dst").unwrap(), b"moved");
    assert!(!tree.exists("/src"));
    assert_eq!(tree.log(), vec!["create /dst".to_string(), "remove /src".to_string()]);
}

#[tokio::test]
async fn move_tree_empties_source_bottom_up() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_collection("/a");
    tree.add_document("/a/doc1", b"1");
    tree.add_collection("/a/sub");
    tree.add_document("/a/sub/doc2", b"2");
    let node = snapshot(&tree, "/a", &cancel).await;

    let policy = MovePolicy::new(tree.clone());
    let engine = ExecutionEngine::new(&policy, EngineOptions::default());
    let outcome = engine
        .execute("/b", Source::Collection(&node), tree.target("/b"), &cancel)
        .await;

    assert!(outcome.statuses().iter().all(|(_, status)| status.is_success()));
    assert_eq!(tree.content("/b/sub/doc2").unwrap(), b"2");
    assert!(!tree.exists("/a"));
    assert!(!tree.exists("/a/doc1"));
    assert!(!tree.exists("/a/sub"));
    // The source collection itself goes last, once emptied.
    assert_eq!(tree.log().last().unwrap(), "remove /a");
}

#[tokio::test]
async fn move_cleanup_failure_keeps_child_outcomes() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_collection("/a");
    tree.add_document("/a/doc1", b"1");
    tree.fail_path("/a");
    let node = snapshot(&tree, "/a", &cancel).await;

    let policy = MovePolicy::new(tree.clone());
    let engine = ExecutionEngine::new(&policy, EngineOptions::default());
    let outcome = engine
        .execute("/b", Source::Collection(&node), tree.target("/b"), &cancel)
        .await;

    let Outcome::Collection(collection) = outcome else {
        panic!("expected collection outcome");
    };
    assert_eq!(collection.status, OutcomeStatus::CleanupFailed);
    assert!(collection.error.is_some());
    assert_eq!(collection.documents.len(), 1);
    assert_eq!(collection.documents[0].status, OutcomeStatus::Created);
    // Everything moved; only the emptied source collection lingers.
    assert_eq!(tree.content("/b/doc1").unwrap(), b"1");
    assert!(tree.exists("/a"));
    assert!(!tree.exists("/a/doc1"));
}

#[tokio::test]
async fn move_refuses_existing_destination_without_overwrite() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_document("/src", b"new");
    tree.add_document("/dst", b"old");

    let policy = MovePolicy::new(tree.clone());
    let options = EngineOptions {
        overwrite: false,
        ..EngineOptions::default()
    };
    let engine = ExecutionEngine::new(&policy, options);
    let source = tree.document("/src").unwrap();
    let outcome = engine
        .execute("/dst", Source::Document(source.as_ref()), tree.target("/dst"), &cancel)
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::CannotOverwrite);
    assert_eq!(tree.content("/src").unwrap(), b"new");
    assert_eq!(tree.content("/dst").unwrap(), b"old");
}

#[tokio::test]
async fn delete_document_through_the_target_handle() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_document("/doc", b"x");

    let policy = DeletePolicy;
    let engine = ExecutionEngine::new(&policy, EngineOptions::default());
    let source = tree.document("/doc").unwrap();
    let outcome = engine
        .execute("/doc", Source::Document(source.as_ref()), tree.target("/doc"), &cancel)
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Overwritten);
    assert!(!tree.exists("/doc"));
}

#[tokio::test]
async fn delete_tree_removes_documents_before_their_collection() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_collection("/a");
    tree.add_document("/a/doc1", b"1");
    tree.add_collection("/a/sub");
    tree.add_document("/a/sub/doc2", b"2");
    let node = snapshot(&tree, "/a", &cancel).await;

    let policy = DeletePolicy;
    let engine = ExecutionEngine::new(&policy, EngineOptions::default());
    let outcome = engine
        .execute("/a", Source::Collection(&node), tree.target("/a"), &cancel)
        .await;

    assert!(outcome.statuses().iter().all(|(_, status)| status.is_success()));
    assert!(!tree.exists("/a"));
    assert!(!tree.exists("/a/doc1"));
    assert!(!tree.exists("/a/sub"));
    assert!(!tree.exists("/a/sub/doc2"));

    let deletions: Vec<String> = tree
        .log()
        .into_iter()
        .filter(|entry| entry.starts_with("delete "))
        .collect();
    assert_eq!(
        deletions,
        vec![
            "delete /a/doc1".to_string(),
            "delete /a/sub/doc2".to_string(),
            "delete /a/sub".to_string(),
            "delete /a".to_string(),
        ]
    );
}

#[tokio::test]
async fn delete_failure_stays_on_the_failing_nodes() {
    let cancel = CancellationToken::new();
    let tree = MemTree::new();
    tree.add_collection("/a");
    tree.add_document("/a/doc1", b"1");
    tree.add_collection("/a/sub");
    tree.fail_path("/a/doc1");
    tree.fail_path("/a");
    let node = snapshot(&tree, "/a", &cancel).await;

    let policy = DeletePolicy;
    let engine = ExecutionEngine::new(&policy, EngineOptions::default());
    let outcome = engine
        .execute("/a", Source::Collection(&node), tree.target("/a"), &cancel)
        .await;

    let Outcome::Collection(collection) = outcome else {
        panic!("expected collection outcome");
    };
    assert_eq!(collection.status, OutcomeStatus::CleanupFailed);
    assert_eq!(collection.documents[0].status, OutcomeStatus::TargetDeleteFailed);
    assert_eq!(collection.collections[0].status, OutcomeStatus::Overwritten);
    assert!(tree.exists("/a"));
    assert!(tree.exists("/a/doc1"));
    assert!(!tree.exists("/a/sub"));
}
