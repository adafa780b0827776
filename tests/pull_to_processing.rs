//! End-to-end: pull a changed file over HTTP, then process the queued submission

mod common;

use common::TestEnv;
use ontology_pull::{
    Event, OntologyPull, QueueConsumer, SkipReason, StatusCode, StatusFlag, SubmissionId,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn changed_remote_file_is_pulled_and_processed() {
    let env = TestEnv::new().await;
    let server = MockServer::start().await;
    serve(&server, "/abc.owl", "<Ontology> version two </Ontology>").await;
    env.seed(
        "ABC",
        "<Ontology> version one </Ontology>",
        &format!("{}/abc.owl", server.uri()),
    )
    .await;

    let pull = OntologyPull::new(
        env.config.clone(),
        env.db.clone(),
        env.queue.clone(),
        env.oracle.clone(),
    )
    .unwrap();
    let mut events = pull.subscribe();
    let report = pull.run(false).await.unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.created.len(), 1);
    let created = &report.created[0];
    assert_eq!(created.id, SubmissionId::new("ABC", 2));
    assert_eq!(
        created.upload_file_path.as_deref(),
        Some(env.repository().join("ABC").join("2").join("abc.owl").as_path())
    );

    let queued = env.queue.queued_items().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, created.id);
    assert_eq!(queued[0].actions.len(), 4);

    let mut saw_created = false;
    while let Ok(event) = events.try_recv() {
        if let Event::SubmissionCreated { id } = event {
            saw_created = id == created.id;
        }
    }
    assert!(saw_created);

    let consumer = QueueConsumer::new(
        env.config.clone(),
        env.db.clone(),
        env.queue.clone(),
        env.oracle.clone(),
    )
    .unwrap();
    let processed = consumer.process_all().await.unwrap();

    assert_eq!(processed.processed, vec![created.id.clone()]);
    assert!(processed.failures.is_empty(), "{:?}", processed.failures);
    assert!(env.queue.queued_items().await.unwrap().is_empty());

    let stored = env.db.get_submission(&created.id).await.unwrap().unwrap();
    for code in [
        StatusCode::Uploaded,
        StatusCode::Rdf,
        StatusCode::RdfLabels,
        StatusCode::Annotator,
    ] {
        assert!(stored.statuses.contains(StatusFlag::ok(code)), "missing {:?}", code);
    }
    // no indexer or metrics backend configured
    assert!(!stored.statuses.iter().any(|f| f.code == StatusCode::Indexed));
    assert!(stored.metrics.is_none());
    assert_eq!(
        stored.missing_imports,
        Some(vec!["http://example.org/imported.owl".to_string()])
    );

    // the pulled file is now the latest, so a second run finds nothing new
    let again = pull.run(false).await.unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.skipped, vec![("ABC".to_string(), SkipReason::Unchanged)]);
}

#[tokio::test]
async fn unparsable_remote_file_creates_nothing() {
    let env = TestEnv::new().await;
    let server = MockServer::start().await;
    serve(&server, "/bad.owl", "<Ontology> BROKEN").await;
    env.seed("BAD", "old content", &format!("{}/bad.owl", server.uri()))
        .await;

    let pull = OntologyPull::new(
        env.config.clone(),
        env.db.clone(),
        env.queue.clone(),
        env.oracle.clone(),
    )
    .unwrap();
    let report = pull.run(false).await.unwrap();

    assert!(report.created.is_empty());
    assert_eq!(
        report.skipped,
        vec![("BAD".to_string(), SkipReason::NotCreated)]
    );
    assert_eq!(env.db.list_submissions("BAD").await.unwrap().len(), 1);
    assert!(env.queue.queued_items().await.unwrap().is_empty());
    assert!(
        !env.repository()
            .join("BAD")
            .join("2")
            .join("bad.owl")
            .exists()
    );
}

#[tokio::test]
async fn missing_remote_file_is_skipped() {
    let env = TestEnv::new().await;
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone.owl"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    env.seed("GONE", "content", &format!("{}/gone.owl", server.uri()))
        .await;

    let pull = OntologyPull::new(
        env.config.clone(),
        env.db.clone(),
        env.queue.clone(),
        env.oracle.clone(),
    )
    .unwrap();
    let report = pull.run(false).await.unwrap();

    assert_eq!(
        report.skipped,
        vec![("GONE".to_string(), SkipReason::RemoteMissing)]
    );
    assert!(report.failures.is_empty());
}
