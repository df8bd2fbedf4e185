//! Drives the four-stage analysis of a bundled repository against a
//! generative backend, publishing progress on the event bus and persisting
//! the finished record.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use ulid::Ulid;

use lens_ai::{ChatSession, DocumentState, GenerativeBackend, RemoteDocument};
use lens_events::{AnalysisStage, EventBus, StageEvent};

use crate::bundle::SourceBundler;
use crate::error::{AnalysisError, LensError};
use crate::prompt::PromptLibrary;
use crate::store::TaskStore;
use crate::types::{BundleOutcome, StageResult, StageResults, TaskRecord};

const DEFAULT_UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub repo_path: PathBuf,
    pub feature_scope: String,
    pub main_branch: String,
    pub feature_branch: String,
}

/// What the polling endpoint can say about a task. A task that never existed
/// is indistinguishable from one still running: the store only learns about
/// tasks once they finish.
#[derive(Debug, Clone)]
pub enum TaskStatusReport {
    Completed(TaskRecord),
    InProgress,
}

struct TaskFailure {
    stage: AnalysisStage,
    error: AnalysisError,
}

impl TaskFailure {
    fn at(stage: AnalysisStage, error: impl Into<AnalysisError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    bundler: SourceBundler,
    prompts: PromptLibrary,
    store: Arc<dyn TaskStore>,
    backend: Arc<dyn GenerativeBackend>,
    bus: EventBus,
    upload_poll_interval: Duration,
}

impl AnalysisPipeline {
    pub fn new(
        bundler: SourceBundler,
        prompts: PromptLibrary,
        store: Arc<dyn TaskStore>,
        backend: Arc<dyn GenerativeBackend>,
        bus: EventBus,
    ) -> Self {
        Self {
            bundler,
            prompts,
            store,
            backend,
            bus,
            upload_poll_interval: DEFAULT_UPLOAD_POLL_INTERVAL,
        }
    }

    pub fn with_upload_poll_interval(mut self, interval: Duration) -> Self {
        self.upload_poll_interval = interval;
        self
    }

    /// Allocates a task ID and runs the analysis in a detached future. The
    /// ID is returned immediately; progress flows through the event bus.
    pub fn spawn(&self, request: AnalysisRequest) -> String {
        let task_id = format!("task_{}", Ulid::new());
        let pipeline = self.clone();
        let spawned_id = task_id.clone();
        tokio::spawn(async move {
            pipeline.run(&spawned_id, request).await;
        });
        task_id
    }

    pub fn status(&self, task_id: &str) -> Result<TaskStatusReport, LensError> {
        match self.store.load(task_id)? {
            Some(record) => Ok(TaskStatusReport::Completed(record)),
            None => Ok(TaskStatusReport::InProgress),
        }
    }

    async fn run(&self, task_id: &str, request: AnalysisRequest) {
        if let Err(failure) = self.execute(task_id, &request).await {
            tracing::error!(
                task_id,
                stage = failure.stage.label(),
                error = %failure.error,
                "analysis task failed"
            );
            self.bus.publish(StageEvent::error(
                task_id,
                failure.stage,
                format!("{} failed", failure.stage.label()),
                failure.error.to_string(),
            ));
        }
    }

    async fn execute(&self, task_id: &str, request: &AnalysisRequest) -> Result<(), TaskFailure> {
        let created_at = Utc::now();
        let prep = AnalysisStage::SourceCodeAnalysis;

        self.bus.publish(StageEvent::start(
            task_id,
            prep,
            "Preparing source code analysis",
        ));

        self.bus.publish(StageEvent::progress(
            task_id,
            prep,
            "Generating source bundle",
        ));
        let bundle = self
            .bundler
            .bundle(&request.repo_path)
            .map_err(|err| TaskFailure::at(prep, err))?;

        self.bus.publish(StageEvent::progress(
            task_id,
            prep,
            "Uploading code to AI service",
        ));
        let document = self
            .upload_and_wait(&bundle)
            .await
            .map_err(|err| TaskFailure { stage: prep, error: err })?;

        let mut session = self
            .backend
            .start_session(&document)
            .await
            .map_err(|err| TaskFailure::at(prep, err))?;

        let mut completed: Vec<StageResult> = Vec::with_capacity(4);
        for (index, stage) in AnalysisStage::SEQUENCE.into_iter().enumerate() {
            if index > 0 {
                self.bus.publish(StageEvent::start(
                    task_id,
                    stage,
                    format!("Starting {}", stage.label()),
                ));
            }
            self.bus
                .publish(StageEvent::progress(task_id, stage, progress_message(stage)));

            let prompt = self
                .stage_prompt(stage, request, &completed)
                .map_err(|err| TaskFailure::at(stage, err))?;
            let reply = session
                .send(&prompt)
                .await
                .map_err(|err| TaskFailure::at(stage, err))?;
            let result = parse_model_reply(&reply);

            let results_value = serde_json::to_value(&result)
                .unwrap_or_else(|_| json!({"error": "unencodable result"}));
            self.bus.publish(StageEvent::complete(
                task_id,
                stage,
                complete_message(stage),
                results_value,
            ));
            completed.push(result);
        }

        let mut stages = completed.into_iter();
        let (Some(source), Some(diff), Some(feature), Some(guidelines)) =
            (stages.next(), stages.next(), stages.next(), stages.next())
        else {
            return Err(TaskFailure::at(
                prep,
                AnalysisError::Internal {
                    message: "stage results incomplete".to_string(),
                },
            ));
        };

        let record = TaskRecord {
            task_id: task_id.to_string(),
            repo_path: request.repo_path.to_string_lossy().to_string(),
            feature_scope: request.feature_scope.clone(),
            main_branch: request.main_branch.clone(),
            feature_branch: request.feature_branch.clone(),
            bundle_file: bundle.path.clone(),
            uploaded_document: Some(document.name.clone()),
            results: StageResults::from_parts(source, diff, feature, guidelines),
            created_at,
            completed_at: Utc::now(),
        };
        self.store
            .save(&record)
            .map_err(|err| TaskFailure::at(AnalysisStage::Guidelines, err))?;

        tracing::info!(task_id, "analysis task completed");
        Ok(())
    }

    async fn upload_and_wait(
        &self,
        bundle: &BundleOutcome,
    ) -> Result<RemoteDocument, AnalysisError> {
        let document = self
            .backend
            .upload_document(std::path::Path::new(&bundle.path), "text/plain")
            .await?;

        loop {
            match self.backend.document_state(&document.name).await? {
                DocumentState::Active => return Ok(document),
                DocumentState::Failed => {
                    return Err(AnalysisError::Internal {
                        message: format!("document {} failed to process", document.name),
                    });
                }
                DocumentState::Processing => {
                    tokio::time::sleep(self.upload_poll_interval).await;
                }
            }
        }
    }

    fn stage_prompt(
        &self,
        stage: AnalysisStage,
        request: &AnalysisRequest,
        completed: &[StageResult],
    ) -> Result<String, crate::error::PromptError> {
        let scope = request.feature_scope.as_str();
        if stage == AnalysisStage::Guidelines {
            let previous = json!({
                "sourceCode": completed.first(),
                "diff": completed.get(1),
                "feature": completed.get(2),
            });
            let previous = serde_json::to_string(&previous).unwrap_or_else(|_| "{}".to_string());
            return self.prompts.render(
                stage.template(),
                &[("featureScope", scope), ("previousAnalyses", &previous)],
            );
        }
        self.prompts
            .render(stage.template(), &[("featureScope", scope)])
    }
}

fn progress_message(stage: AnalysisStage) -> &'static str {
    match stage {
        AnalysisStage::SourceCodeAnalysis => "Analyzing source code",
        AnalysisStage::DiffAnalysis => "Analyzing code changes",
        AnalysisStage::FeatureReview => "Reviewing feature implementation",
        AnalysisStage::Guidelines => "Generating guidelines and recommendations",
    }
}

fn complete_message(stage: AnalysisStage) -> &'static str {
    match stage {
        AnalysisStage::SourceCodeAnalysis => "Source code analysis completed",
        AnalysisStage::DiffAnalysis => "Changes analysis completed",
        AnalysisStage::FeatureReview => "Feature review completed",
        AnalysisStage::Guidelines => "Guidelines generation completed",
    }
}

/// Parses a model reply into a stage result. A reply that is not valid JSON
/// (after stripping an optional markdown fence) degrades rather than fails.
pub fn parse_model_reply(reply: &str) -> StageResult {
    let cleaned = strip_json_fence(reply);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => StageResult::Parsed(value),
        Err(_) => StageResult::Degraded {
            error: "Failed to parse AI analysis".to_string(),
            raw_response: reply.to_string(),
        },
    }
}

fn strip_json_fence(reply: &str) -> &str {
    let Some((_, after)) = reply.split_once("```json") else {
        return reply.trim();
    };
    after
        .split_once("```")
        .map(|(inner, _)| inner)
        .unwrap_or(after)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lens_ai::AiError;
    use lens_events::StageStatus;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::timeout;

    use crate::store::JsonTaskStore;

    struct ScriptedBackend {
        states: Mutex<VecDeque<DocumentState>>,
        replies: Mutex<VecDeque<Result<String, AiError>>>,
        state_polls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(states: Vec<DocumentState>, replies: Vec<Result<String, AiError>>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                replies: Mutex::new(replies.into()),
                state_polls: AtomicUsize::new(0),
            }
        }

        fn active_with_replies(replies: Vec<Result<String, AiError>>) -> Self {
            Self::new(vec![DocumentState::Active], replies)
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn upload_document(
            &self,
            path: &Path,
            mime_type: &str,
        ) -> Result<RemoteDocument, AiError> {
            Ok(RemoteDocument {
                name: "files/scripted".to_string(),
                uri: format!("uri:{}", path.display()),
                mime_type: mime_type.to_string(),
            })
        }

        async fn document_state(&self, _name: &str) -> Result<DocumentState, AiError> {
            self.state_polls.fetch_add(1, Ordering::SeqCst);
            let state = self.states.lock().unwrap().pop_front();
            Ok(state.unwrap_or(DocumentState::Active))
        }

        async fn start_session(
            &self,
            _document: &RemoteDocument,
        ) -> Result<Box<dyn ChatSession>, AiError> {
            let replies = std::mem::take(&mut *self.replies.lock().unwrap());
            Ok(Box::new(ScriptedSession { replies }))
        }
    }

    struct ScriptedSession {
        replies: VecDeque<Result<String, AiError>>,
    }

    #[async_trait]
    impl ChatSession for ScriptedSession {
        async fn send(&mut self, _prompt: &str) -> Result<String, AiError> {
            self.replies.pop_front().unwrap_or(Err(AiError::EmptyReply))
        }
    }

    struct Fixture {
        pipeline: Arc<AnalysisPipeline>,
        backend: Arc<ScriptedBackend>,
        bus: EventBus,
        repo: TempDir,
        _data: TempDir,
    }

    fn fixture(backend: ScriptedBackend) -> Fixture {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("app.js"), "app();\n").unwrap();

        let data = TempDir::new().unwrap();
        let prompts_dir = data.path().join("prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        for stage in AnalysisStage::SEQUENCE {
            fs::write(
                prompts_dir.join(stage.template()),
                "Scope: {{featureScope}}\nPrior: {{previousAnalyses}}",
            )
            .unwrap();
        }

        let backend = Arc::new(backend);
        let bus = EventBus::new(64);
        let pipeline = Arc::new(
            AnalysisPipeline::new(
                SourceBundler::new(data.path().join("sourcecodes")),
                PromptLibrary::new(prompts_dir),
                Arc::new(JsonTaskStore::new(data.path().join("tasks"))),
                backend.clone(),
                bus.clone(),
            )
            .with_upload_poll_interval(Duration::from_millis(1)),
        );

        Fixture {
            pipeline,
            backend,
            bus,
            repo,
            _data: data,
        }
    }

    fn request(fixture: &Fixture) -> AnalysisRequest {
        AnalysisRequest {
            repo_path: fixture.repo.path().to_path_buf(),
            feature_scope: "login flow".to_string(),
            main_branch: "main".to_string(),
            feature_branch: "feature/login".to_string(),
        }
    }

    async fn collect_until_terminal(
        receiver: &mut tokio::sync::broadcast::Receiver<StageEvent>,
    ) -> Vec<StageEvent> {
        let mut events = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(5), receiver.recv())
                .await
                .expect("event stream stalled")
                .expect("bus closed");
            let terminal = event.status == StageStatus::Error
                || (event.status == StageStatus::Complete
                    && event.step == AnalysisStage::Guidelines);
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    fn json_reply(body: &str) -> Result<String, AiError> {
        Ok(body.to_string())
    }

    #[tokio::test]
    async fn stages_complete_in_fixed_order() {
        let backend = ScriptedBackend::active_with_replies(vec![
            json_reply(r#"{"architecture": "mvc"}"#),
            json_reply(r#"{"changes": 3}"#),
            json_reply(r#"{"verdict": "ship"}"#),
            json_reply(r#"{"guidelines": []}"#),
        ]);
        let fixture = fixture(backend);
        let mut receiver = fixture.bus.subscribe();

        let task_id = fixture.pipeline.spawn(request(&fixture));
        let events = collect_until_terminal(&mut receiver).await;

        let completes: Vec<AnalysisStage> = events
            .iter()
            .filter(|event| event.status == StageStatus::Complete)
            .map(|event| event.step)
            .collect();
        assert_eq!(completes, AnalysisStage::SEQUENCE.to_vec());

        let seqs: Vec<i64> = events.iter().map(|event| event.seq).collect();
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));

        // Completed task is now visible to the polling endpoint.
        let status = fixture.pipeline.status(&task_id).unwrap();
        let TaskStatusReport::Completed(record) = status else {
            panic!("expected completed record");
        };
        assert_eq!(record.task_id, task_id);
        assert!(record.results.guidelines.is_some());
    }

    #[tokio::test]
    async fn stage_error_short_circuits_later_stages() {
        let backend = ScriptedBackend::active_with_replies(vec![
            json_reply(r#"{"architecture": "mvc"}"#),
            Err(AiError::Api {
                status: 500,
                message: "backend unavailable".to_string(),
            }),
        ]);
        let fixture = fixture(backend);
        let mut receiver = fixture.bus.subscribe();

        let task_id = fixture.pipeline.spawn(request(&fixture));
        let events = collect_until_terminal(&mut receiver).await;

        let last = events.last().unwrap();
        assert_eq!(last.status, StageStatus::Error);
        assert_eq!(last.step, AnalysisStage::DiffAnalysis);
        assert!(!events
            .iter()
            .any(|event| event.step == AnalysisStage::FeatureReview
                || event.step == AnalysisStage::Guidelines));

        // Failed tasks leave no record.
        assert!(matches!(
            fixture.pipeline.status(&task_id).unwrap(),
            TaskStatusReport::InProgress
        ));
    }

    #[tokio::test]
    async fn unparseable_reply_degrades_without_failing() {
        let backend = ScriptedBackend::active_with_replies(vec![
            json_reply(r#"{"architecture": "mvc"}"#),
            json_reply("this is prose, not json"),
            json_reply(r#"{"verdict": "ship"}"#),
            json_reply(r#"{"guidelines": []}"#),
        ]);
        let fixture = fixture(backend);
        let mut receiver = fixture.bus.subscribe();

        let task_id = fixture.pipeline.spawn(request(&fixture));
        collect_until_terminal(&mut receiver).await;

        let TaskStatusReport::Completed(record) = fixture.pipeline.status(&task_id).unwrap()
        else {
            panic!("expected completed record");
        };
        let diff = record.results.diff_analysis.unwrap();
        assert!(diff.is_degraded());
    }

    #[tokio::test]
    async fn upload_poll_repeats_until_active() {
        let backend = ScriptedBackend::new(
            vec![
                DocumentState::Processing,
                DocumentState::Processing,
                DocumentState::Active,
            ],
            vec![
                json_reply("{}"),
                json_reply("{}"),
                json_reply("{}"),
                json_reply("{}"),
            ],
        );
        let fixture = fixture(backend);
        let mut receiver = fixture.bus.subscribe();

        fixture.pipeline.spawn(request(&fixture));
        let events = collect_until_terminal(&mut receiver).await;
        assert_eq!(events.last().unwrap().status, StageStatus::Complete);
        assert_eq!(fixture.backend.state_polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_document_fails_the_task() {
        let backend = ScriptedBackend::new(vec![DocumentState::Failed], Vec::new());
        let fixture = fixture(backend);
        let mut receiver = fixture.bus.subscribe();

        fixture.pipeline.spawn(request(&fixture));
        let events = collect_until_terminal(&mut receiver).await;
        let last = events.last().unwrap();
        assert_eq!(last.status, StageStatus::Error);
        assert_eq!(last.step, AnalysisStage::SourceCodeAnalysis);
    }

    #[tokio::test]
    async fn unreadable_repo_fails_during_preparation() {
        let backend = ScriptedBackend::active_with_replies(Vec::new());
        let fixture = fixture(backend);
        let mut receiver = fixture.bus.subscribe();

        let mut req = request(&fixture);
        req.repo_path = fixture.repo.path().join("does-not-exist");
        fixture.pipeline.spawn(req);

        let events = collect_until_terminal(&mut receiver).await;
        let last = events.last().unwrap();
        assert_eq!(last.status, StageStatus::Error);
        assert_eq!(last.step, AnalysisStage::SourceCodeAnalysis);
        assert!(last.error.is_some());
    }

    #[test]
    fn fenced_reply_parses_to_inner_json() {
        let reply = "```json\n{\"key\": \"value\"}\n```";
        let result = parse_model_reply(reply);
        assert_eq!(
            result,
            StageResult::Parsed(json!({"key": "value"}))
        );
    }

    #[test]
    fn unfenced_json_parses_directly() {
        let result = parse_model_reply("  {\"a\": 1} ");
        assert_eq!(result, StageResult::Parsed(json!({"a": 1})));
    }

    #[test]
    fn prose_reply_degrades_with_raw_text() {
        let result = parse_model_reply("I could not produce JSON.");
        let StageResult::Degraded { raw_response, .. } = result else {
            panic!("expected degraded result");
        };
        assert_eq!(raw_response, "I could not produce JSON.");
    }
}
