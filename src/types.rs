//! Core types for ontology-pull

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Unique identifier for a submission, `<ACRONYM>/submissions/<n>`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Build the identifier of version `number` of `acronym`
    pub fn new(acronym: &str, number: u32) -> Self {
        Self(format!("{}/submissions/{}", acronym, number))
    }

    /// Wrap an identifier received from elsewhere (queue keys, external producers)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracked dataset (ontology)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique short identifier
    pub acronym: String,
    /// Display name
    pub name: Option<String>,
}

impl Dataset {
    /// Create a dataset with no display name
    pub fn new(acronym: impl Into<String>) -> Self {
        Self {
            acronym: acronym.into(),
            name: None,
        }
    }

    /// Case-insensitive key used to order pulls
    pub fn sort_key(&self) -> String {
        self.acronym.to_lowercase()
    }
}

/// Declared content language of a submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OntologyLanguage {
    /// OWL / RDF-XML and friends
    Owl,
    /// OBO flat file format
    Obo,
    /// SKOS vocabularies
    Skos,
    /// UMLS-derived content, redistributed only on opt-in
    Umls,
}

impl OntologyLanguage {
    /// Canonical upper-case tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OntologyLanguage::Owl => "OWL",
            OntologyLanguage::Obo => "OBO",
            OntologyLanguage::Skos => "SKOS",
            OntologyLanguage::Umls => "UMLS",
        }
    }

    /// Whether this language belongs to the restricted content class
    pub fn is_restricted(&self) -> bool {
        matches!(self, OntologyLanguage::Umls)
    }
}

impl std::str::FromStr for OntologyLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OWL" => Ok(OntologyLanguage::Owl),
            "OBO" => Ok(OntologyLanguage::Obo),
            "SKOS" => Ok(OntologyLanguage::Skos),
            "UMLS" => Ok(OntologyLanguage::Umls),
            other => Err(Error::Other(format!("unknown ontology language: {other}"))),
        }
    }
}

/// Processing status markers recorded on a submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusCode {
    /// File is present in the repository
    Uploaded,
    /// Structural parse succeeded
    Rdf,
    /// Labels were generated during the parse
    RdfLabels,
    /// Search index built
    Indexed,
    /// Metrics computed
    Metrics,
    /// Annotator cache and dictionary built
    Annotator,
}

impl StatusCode {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Uploaded => "UPLOADED",
            StatusCode::Rdf => "RDF",
            StatusCode::RdfLabels => "RDF_LABELS",
            StatusCode::Indexed => "INDEXED",
            StatusCode::Metrics => "METRICS",
            StatusCode::Annotator => "ANNOTATOR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "UPLOADED" => StatusCode::Uploaded,
            "RDF" => StatusCode::Rdf,
            "RDF_LABELS" => StatusCode::RdfLabels,
            "INDEXED" => StatusCode::Indexed,
            "METRICS" => StatusCode::Metrics,
            "ANNOTATOR" => StatusCode::Annotator,
            _ => return None,
        })
    }
}

/// A status code together with its outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatusFlag {
    /// Which stage this flag describes
    pub code: StatusCode,
    /// Whether the stage failed
    pub error: bool,
}

impl StatusFlag {
    /// Successful outcome for `code`
    pub fn ok(code: StatusCode) -> Self {
        Self { code, error: false }
    }

    /// Failed outcome for `code`
    pub fn error(code: StatusCode) -> Self {
        Self { code, error: true }
    }
}

impl std::fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.error {
            write!(f, "ERROR_{}", self.code.as_str())
        } else {
            f.write_str(self.code.as_str())
        }
    }
}

impl From<StatusFlag> for String {
    fn from(flag: StatusFlag) -> Self {
        flag.to_string()
    }
}

impl TryFrom<String> for StatusFlag {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let (error, name) = match value.strip_prefix("ERROR_") {
            Some(rest) => (true, rest),
            None => (false, value.as_str()),
        };
        StatusCode::parse(name)
            .map(|code| StatusFlag { code, error })
            .ok_or_else(|| format!("unknown submission status: {value}"))
    }
}

/// The set of status flags on a submission
///
/// A code is either ok or error, never both: adding one outcome replaces the other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSet(BTreeSet<StatusFlag>);

impl StatusSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome, replacing the contrary outcome for the same code
    pub fn add(&mut self, flag: StatusFlag) {
        self.0.remove(&StatusFlag {
            code: flag.code,
            error: !flag.error,
        });
        self.0.insert(flag);
    }

    /// Forget both outcomes for `code`
    pub fn remove(&mut self, code: StatusCode) {
        self.0.retain(|f| f.code != code);
    }

    /// Whether `flag` is present
    pub fn contains(&self, flag: StatusFlag) -> bool {
        self.0.contains(&flag)
    }

    /// True when every code in `codes` has an ok outcome
    pub fn is_ready(&self, codes: &[StatusCode]) -> bool {
        codes.iter().all(|c| self.contains(StatusFlag::ok(*c)))
    }

    /// True when `code` has an error outcome
    pub fn has_error(&self, code: StatusCode) -> bool {
        self.contains(StatusFlag::error(code))
    }

    /// Whether no flag is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate flags in stable order
    pub fn iter(&self) -> impl Iterator<Item = &StatusFlag> {
        self.0.iter()
    }
}

/// A named processing stage that can be requested for a submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Structural parse
    ProcessRdf,
    /// Full-text index
    IndexSearch,
    /// Metrics computation
    RunMetrics,
    /// Annotator cache and dictionary
    ProcessAnnotator,
}

impl Action {
    /// The full vocabulary, in processing order
    pub const ALL: [Action; 4] = [
        Action::ProcessRdf,
        Action::IndexSearch,
        Action::RunMetrics,
        Action::ProcessAnnotator,
    ];

    /// Wire name stored in queue entries
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ProcessRdf => "process_rdf",
            Action::IndexSearch => "index_search",
            Action::RunMetrics => "run_metrics",
            Action::ProcessAnnotator => "process_annotator",
        }
    }

    /// Look up an action by wire name; unknown names yield `None`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

/// The requested subset of processing stages
///
/// Serialises as the boolean map stored in the queue, e.g.
/// `{"process_rdf":true,"run_metrics":true}`. When decoding, unknown names and
/// `false` values are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    /// No actions
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known action
    pub fn all() -> Self {
        Self(Action::ALL.into_iter().collect())
    }

    /// Build from `(name, requested)` pairs, dropping unknown names and unrequested stages
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        Self(
            flags
                .into_iter()
                .filter(|(_, requested)| *requested)
                .filter_map(|(name, _)| Action::from_name(name))
                .collect(),
        )
    }

    /// Add an action
    pub fn insert(&mut self, action: Action) {
        self.0.insert(action);
    }

    /// Whether `action` was requested
    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    /// Whether nothing was requested
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of requested actions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate requested actions in processing order
    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ActionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for action in &self.0 {
            map.serialize_entry(action.as_str(), &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ActionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(Self::from_flags(
            raw.iter()
                .map(|(name, value)| (name.as_str(), value.as_bool() == Some(true))),
        ))
    }
}

/// What a producer asks the queue for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionRequest {
    /// Sentinel for the whole vocabulary, expanded at enqueue time
    All,
    /// An explicit subset
    Only(ActionSet),
}

impl ActionRequest {
    /// Parse a producer's JSON map; `{"all": true}` selects every action
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        if raw.get("all").and_then(serde_json::Value::as_bool) == Some(true) {
            return Ok(ActionRequest::All);
        }
        Ok(ActionRequest::Only(ActionSet::from_flags(raw.iter().map(
            |(name, value)| (name.as_str(), value.as_bool() == Some(true)),
        ))))
    }

    /// Expand into a concrete set
    pub fn resolve(self) -> ActionSet {
        match self {
            ActionRequest::All => ActionSet::all(),
            ActionRequest::Only(set) => set,
        }
    }
}

impl From<ActionSet> for ActionRequest {
    fn from(set: ActionSet) -> Self {
        ActionRequest::Only(set)
    }
}

/// Metrics computed over a parsed submission
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Number of classes
    pub classes: u64,
    /// Number of individuals
    pub individuals: u64,
    /// Number of properties
    pub properties: u64,
    /// Depth of the deepest class hierarchy path
    pub max_depth: u64,
}

/// One immutable version of a dataset's content plus its processing state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Identifier, derived from acronym and number
    pub id: SubmissionId,
    /// Owning dataset
    pub acronym: String,
    /// Version number, strictly increasing per dataset
    pub submission_id: u32,
    /// Declared content language
    pub language: OntologyLanguage,
    /// Remote location the content is pulled from
    pub pull_location: Option<String>,
    /// Locally materialized file
    pub upload_file_path: Option<PathBuf>,
    /// Release timestamp
    pub released: DateTime<Utc>,
    /// Set by the store when the record is first saved
    pub creation_date: Option<DateTime<Utc>>,
    /// Free-form version label published by the dataset owner
    pub version: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Homepage URL
    pub homepage: Option<String>,
    /// Documentation URL
    pub documentation: Option<String>,
    /// Processing status flags
    pub statuses: StatusSet,
    /// Computed metrics
    pub metrics: Option<Metrics>,
    /// Imports the parser could not resolve
    pub missing_imports: Option<Vec<String>>,
}

/// Fields that carry forward from one version to the next
#[derive(Clone, Debug, PartialEq)]
pub struct CarriedFields {
    /// Declared content language
    pub language: OntologyLanguage,
    /// Remote location
    pub pull_location: Option<String>,
    /// Version label
    pub version: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Homepage URL
    pub homepage: Option<String>,
    /// Documentation URL
    pub documentation: Option<String>,
}

/// Fields that are set fresh on every new version
#[derive(Clone, Debug)]
pub struct SubmissionOverrides {
    /// Next number for the dataset
    pub submission_id: u32,
    /// Where the new file was relocated to
    pub upload_file_path: PathBuf,
    /// Release timestamp
    pub released: DateTime<Utc>,
    /// Replacement version label, if any
    pub version: Option<String>,
}

impl Submission {
    /// Create a bare submission, released now, with nothing carried
    pub fn new(acronym: &str, submission_id: u32, language: OntologyLanguage) -> Self {
        Self {
            id: SubmissionId::new(acronym, submission_id),
            acronym: acronym.to_string(),
            submission_id,
            language,
            pull_location: None,
            upload_file_path: None,
            released: Utc::now(),
            creation_date: None,
            version: None,
            description: None,
            homepage: None,
            documentation: None,
            statuses: StatusSet::new(),
            metrics: None,
            missing_imports: None,
        }
    }

    /// The fields that [`Submission::next_version`] keeps
    pub fn carried_fields(&self) -> CarriedFields {
        CarriedFields {
            language: self.language,
            pull_location: self.pull_location.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            homepage: self.homepage.clone(),
            documentation: self.documentation.clone(),
        }
    }

    /// Build the next version of `prior`
    ///
    /// Statuses, metrics, missing imports and the creation date start empty.
    pub fn next_version(prior: &Submission, overrides: SubmissionOverrides) -> Self {
        let carried = prior.carried_fields();
        Self {
            id: SubmissionId::new(&prior.acronym, overrides.submission_id),
            acronym: prior.acronym.clone(),
            submission_id: overrides.submission_id,
            language: carried.language,
            pull_location: carried.pull_location,
            upload_file_path: Some(overrides.upload_file_path),
            released: overrides.released,
            creation_date: None,
            version: overrides.version.or(carried.version),
            description: carried.description,
            homepage: carried.homepage,
            documentation: carried.documentation,
            statuses: StatusSet::new(),
            metrics: None,
            missing_imports: None,
        }
    }

    /// Whether the local file is recorded and present on disk
    pub fn has_local_file(&self) -> bool {
        self.upload_file_path.as_ref().is_some_and(|p| p.is_file())
    }
}

/// Outcome of one item that failed inside an isolated loop
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Dataset acronym or submission identifier
    pub item: String,
    /// Rendered error
    pub error: String,
}

/// Events emitted while pulling and processing
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pull run started
    PullStarted {
        /// Whether the long-run partition is active
        long_run_mode: bool,
    },
    /// A new submission was persisted
    SubmissionCreated {
        /// The new submission
        id: SubmissionId,
    },
    /// A candidate file was refused and discarded
    SubmissionRejected {
        /// Owning dataset
        acronym: String,
        /// Why it was refused
        reason: String,
    },
    /// The pull location of a dataset returned nothing
    RemoteFileMissing {
        /// Owning dataset
        acronym: String,
        /// Location that was checked
        url: String,
    },
    /// A queue entry was processed to completion
    SubmissionProcessed {
        /// The processed submission
        id: SubmissionId,
    },
    /// A queue entry failed and was skipped
    QueueEntryFailed {
        /// The submission
        id: SubmissionId,
        /// Rendered error
        error: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_set_serialises_as_boolean_map() {
        let json = serde_json::to_string(&ActionSet::all()).unwrap();
        assert_eq!(
            json,
            r#"{"process_rdf":true,"index_search":true,"run_metrics":true,"process_annotator":true}"#
        );
    }

    #[test]
    fn action_set_drops_unknown_and_false_entries() {
        let set: ActionSet =
            serde_json::from_str(r#"{"process_rdf":true,"rebuild_world":true,"run_metrics":false}"#)
                .unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.contains(Action::ProcessRdf));
        assert!(!set.contains(Action::RunMetrics));
    }

    #[test]
    fn action_request_all_sentinel() {
        let request = ActionRequest::from_json(r#"{"all": true}"#).unwrap();
        assert_eq!(request, ActionRequest::All);
        assert_eq!(request.resolve(), ActionSet::all());

        let request = ActionRequest::from_json(r#"{"index_search": true}"#).unwrap();
        assert_eq!(
            request.resolve(),
            [Action::IndexSearch].into_iter().collect::<ActionSet>()
        );
    }

    #[test]
    fn status_flags_replace_their_opposite() {
        let mut statuses = StatusSet::new();
        statuses.add(StatusFlag::error(StatusCode::Annotator));
        statuses.add(StatusFlag::ok(StatusCode::Annotator));

        assert!(statuses.contains(StatusFlag::ok(StatusCode::Annotator)));
        assert!(!statuses.has_error(StatusCode::Annotator));

        statuses.remove(StatusCode::Annotator);
        assert!(statuses.is_empty());
    }

    #[test]
    fn status_flag_string_form() {
        assert_eq!(StatusFlag::ok(StatusCode::RdfLabels).to_string(), "RDF_LABELS");
        assert_eq!(
            StatusFlag::error(StatusCode::Annotator).to_string(),
            "ERROR_ANNOTATOR"
        );
        assert_eq!(
            StatusFlag::try_from("ERROR_RDF".to_string()).unwrap(),
            StatusFlag::error(StatusCode::Rdf)
        );
        assert!(StatusFlag::try_from("ERROR_".to_string()).is_err());
    }

    #[test]
    fn is_ready_requires_every_code() {
        let mut statuses = StatusSet::new();
        statuses.add(StatusFlag::ok(StatusCode::Rdf));
        assert!(!statuses.is_ready(&[StatusCode::Rdf, StatusCode::RdfLabels]));

        statuses.add(StatusFlag::ok(StatusCode::RdfLabels));
        assert!(statuses.is_ready(&[StatusCode::Rdf, StatusCode::RdfLabels]));
    }

    #[test]
    fn next_version_carries_descriptive_fields_and_resets_state() {
        let mut prior = Submission::new("ABC", 3, OntologyLanguage::Owl);
        prior.pull_location = Some("http://example.org/abc.owl".into());
        prior.description = Some("An ontology".into());
        prior.version = Some("2023-01".into());
        prior.statuses.add(StatusFlag::ok(StatusCode::Rdf));
        prior.metrics = Some(Metrics {
            classes: 10,
            ..Metrics::default()
        });
        prior.missing_imports = Some(vec!["http://example.org/dep".into()]);

        let released = Utc::now();
        let next = Submission::next_version(
            &prior,
            SubmissionOverrides {
                submission_id: 4,
                upload_file_path: PathBuf::from("/repo/ABC/4/abc.owl"),
                released,
                version: None,
            },
        );

        assert_eq!(next.id.as_str(), "ABC/submissions/4");
        assert_eq!(next.submission_id, 4);
        assert_eq!(next.pull_location, prior.pull_location);
        assert_eq!(next.description, prior.description);
        assert_eq!(next.version.as_deref(), Some("2023-01"));
        assert_eq!(next.released, released);
        assert!(next.statuses.is_empty());
        assert!(next.metrics.is_none());
        assert!(next.missing_imports.is_none());
        assert!(next.creation_date.is_none());
    }

    #[test]
    fn language_parse_is_case_insensitive() {
        assert_eq!(
            "umls".parse::<OntologyLanguage>().unwrap(),
            OntologyLanguage::Umls
        );
        assert!(OntologyLanguage::Umls.is_restricted());
        assert!(!OntologyLanguage::Obo.is_restricted());
        assert!("RDFS".parse::<OntologyLanguage>().is_err());
    }
}
