//! Common test utilities for ontology-pull integration tests

use ontology_pull::config::RetryConfig;
use ontology_pull::{
    ActionQueue, CliParsingOracle, Config, Database, Dataset, OntologyLanguage, Submission,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Parser stand-in: rejects files containing BROKEN, reports one missing import
const PARSER_SCRIPT: &str = r#"
input=""
while [ $# -gt 0 ]; do
    case "$1" in
        --input) input="$2"; shift ;;
    esac
    shift
done
if grep -q BROKEN "$input"; then
    echo "syntax error near BROKEN" >&2
    exit 1
fi
echo "missing-import: http://example.org/imported.owl"
exit 0
"#;

/// Everything an end-to-end test needs, rooted in one temp dir
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub queue: ActionQueue,
    pub oracle: Arc<CliParsingOracle>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.storage.repository_dir = dir.path().join("repository");
        config.storage.temp_dir = dir.path().join("temp");
        config.persistence.database_path = dir.path().join("pull.db");
        config.fetch.timeout = Duration::from_secs(5);
        config.fetch.retry = RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        config.parser.timeout = Duration::from_secs(30);
        config.annotator.binary_path = Some(PathBuf::from("/bin/true"));

        let script = dir.path().join("parser.sh");
        std::fs::write(&script, PARSER_SCRIPT).unwrap();
        let oracle = Arc::new(
            CliParsingOracle::new(PathBuf::from("/bin/sh"))
                .with_extra_args(vec![script.to_string_lossy().into_owned()]),
        );

        let db = Arc::new(
            Database::new(&config.persistence.database_path)
                .await
                .unwrap(),
        );
        let queue = ActionQueue::new(db.clone(), config.queue.clone());

        Self {
            dir,
            config: Arc::new(config),
            db,
            queue,
            oracle,
        }
    }

    /// Register `acronym` with submission 1 holding `content`
    pub async fn seed(&self, acronym: &str, content: &str, pull_location: &str) -> Submission {
        self.db.insert_dataset(&Dataset::new(acronym)).await.unwrap();

        let file = self.dir.path().join(format!("{}-seed.owl", acronym));
        std::fs::write(&file, content).unwrap();

        let mut submission = Submission::new(acronym, 1, OntologyLanguage::Owl);
        submission.upload_file_path = Some(file);
        submission.pull_location = Some(pull_location.to_string());
        self.db.insert_submission(&submission).await.unwrap()
    }

    pub fn repository(&self) -> &Path {
        &self.config.storage.repository_dir
    }
}
