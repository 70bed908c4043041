use crate::core::state::{now_millis, QuizQuestion, Story};
use crate::services::backend::{
    decode, BackendError, StoryBackend, AUDIO_PATH, CREATE_STORY_PATH, IMAGES_PATH, QUIZ_PATH,
    TRANSCRIPT_PATH,
};
use crate::services::store::StoryStore;
use anyhow::{anyhow, bail, Result};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationStage {
    Transcript,
    Audio,
    Visuals,
    Quiz,
    Persist,
}

impl GenerationStage {
    pub const ALL: [GenerationStage; 5] = [
        GenerationStage::Transcript,
        GenerationStage::Audio,
        GenerationStage::Visuals,
        GenerationStage::Quiz,
        GenerationStage::Persist,
    ];

    pub fn index(self) -> usize {
        match self {
            GenerationStage::Transcript => 0,
            GenerationStage::Audio => 1,
            GenerationStage::Visuals => 2,
            GenerationStage::Quiz => 3,
            GenerationStage::Persist => 4,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn title(self) -> &'static str {
        match self {
            GenerationStage::Transcript => "Generating Transcript",
            GenerationStage::Audio => "Generating Audio",
            GenerationStage::Visuals => "Generating Visual",
            GenerationStage::Quiz => "Generating Quiz",
            GenerationStage::Persist => "Saving Story",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            GenerationStage::Transcript => TRANSCRIPT_PATH,
            GenerationStage::Audio => AUDIO_PATH,
            GenerationStage::Visuals => IMAGES_PATH,
            GenerationStage::Quiz => QUIZ_PATH,
            GenerationStage::Persist => CREATE_STORY_PATH,
        }
    }
}

/// Artifacts produced so far, fed forward into later stages.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub topic: String,
    pub title: Option<String>,
    pub transcript: Option<String>,
    pub audio: Option<String>,
    pub images: Vec<String>,
    pub quiz: Vec<QuizQuestion>,
    pub story_id: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptArtifact {
    title: String,
    transcript: String,
}

impl GenerationContext {
    fn request_for(&self, stage: GenerationStage) -> Value {
        match stage {
            GenerationStage::Transcript => json!({ "topic": self.topic }),
            GenerationStage::Audio => json!({ "transcript": self.transcript }),
            GenerationStage::Visuals | GenerationStage::Quiz => json!({
                "transcript": self.transcript,
                "title": self.title,
            }),
            GenerationStage::Persist => json!({
                "title": self.title,
                "transcript": self.transcript,
                "audio": self.audio,
                "images": self.images,
                "quiz": self.quiz,
            }),
        }
    }

    /// Records a stage's artifact. Leaves the context untouched on error.
    fn apply(&mut self, stage: GenerationStage, data: Value) -> Result<(), BackendError> {
        match stage {
            GenerationStage::Transcript => {
                let artifact: TranscriptArtifact = decode(data)?;
                self.title = Some(artifact.title);
                self.transcript = Some(artifact.transcript);
            }
            GenerationStage::Audio => self.audio = Some(decode(data)?),
            GenerationStage::Visuals => self.images = decode(data)?,
            GenerationStage::Quiz => {
                let questions: Vec<QuizQuestion> = decode(data)?;
                let total = questions.len();
                let valid: Vec<QuizQuestion> =
                    questions.into_iter().filter(QuizQuestion::is_valid).collect();
                if valid.len() < total {
                    warn!(
                        "Dropped {} quiz questions with an out-of-range answer",
                        total - valid.len()
                    );
                }
                if valid.is_empty() {
                    return Err(BackendError::EmptyPayload);
                }
                self.quiz = valid;
            }
            GenerationStage::Persist => self.story_id = Some(decode(data)?),
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: GenerationStage,
    pub error: BackendError,
}

#[derive(Debug)]
pub enum StepOutcome {
    Advanced(GenerationStage),
    Completed(Story),
    Failed(GenerationStage),
}

#[derive(Debug)]
pub enum GenerationOutcome {
    Completed(Story),
    Failed {
        stage: GenerationStage,
        message: String,
    },
}

/// Drives the fixed stage sequence one network call at a time. A failed stage
/// halts the flow until `retry`/`retry_stage` re-issues it with the same
/// context.
pub struct GenerationWorkflow {
    backend: Arc<dyn StoryBackend>,
    store: StoryStore,
    stage: GenerationStage,
    context: GenerationContext,
    failure: Option<StageFailure>,
    story: Option<Story>,
}

impl GenerationWorkflow {
    pub fn new(backend: Arc<dyn StoryBackend>, store: StoryStore, topic: &str) -> Self {
        Self {
            backend,
            store,
            stage: GenerationStage::Transcript,
            context: GenerationContext {
                topic: topic.trim().to_string(),
                ..Default::default()
            },
            failure: None,
            story: None,
        }
    }

    pub fn current_stage(&self) -> GenerationStage {
        self.stage
    }

    pub fn failed_stage(&self) -> Option<GenerationStage> {
        self.failure.as_ref().map(|f| f.stage)
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn context(&self) -> &GenerationContext {
        &self.context
    }

    pub fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.story.is_some()
    }

    /// Runs the current stage once.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        if let Some(failure) = &self.failure {
            bail!("'{}' failed; retry it before continuing", failure.stage.title());
        }
        if self.story.is_some() {
            bail!("Story generation is already complete");
        }

        let stage = self.stage;
        info!(
            "{} ({}/{})",
            stage.title(),
            stage.index() + 1,
            GenerationStage::ALL.len()
        );

        let body = self.context.request_for(stage);
        let result = match self.backend.post_json(stage.path(), &body).await {
            Ok(data) => self.context.apply(stage, data),
            Err(e) => Err(e),
        };

        if let Err(error) = result {
            warn!("Error during stage processing ({}): {}", stage.title(), error);
            self.failure = Some(StageFailure { stage, error });
            return Ok(StepOutcome::Failed(stage));
        }

        match stage.next() {
            Some(next) => {
                self.stage = next;
                Ok(StepOutcome::Advanced(next))
            }
            None => {
                let story = self.finalize()?;
                self.store.save(story.clone()).await;
                info!("Story '{}' saved as {}", story.title, story.id);
                self.story = Some(story.clone());
                Ok(StepOutcome::Completed(story))
            }
        }
    }

    fn finalize(&self) -> Result<Story> {
        let id = self
            .context
            .story_id
            .clone()
            .ok_or_else(|| anyhow!("Persist stage returned no story id"))?;
        Ok(Story {
            id,
            title: self.context.title.clone().unwrap_or_default(),
            audio_url: self.context.audio.clone().unwrap_or_default(),
            transcript: self.context.transcript.clone().unwrap_or_default(),
            visual_scenes: self.context.images.clone(),
            created_at: now_millis(),
        })
    }

    /// Steps until the story is complete or a stage fails.
    pub async fn run(&mut self) -> Result<GenerationOutcome> {
        loop {
            let outcome = self.step().await?;
            if let Some(done) = self.settle(outcome) {
                return Ok(done);
            }
        }
    }

    /// Re-issues only the failed stage.
    pub async fn retry_stage(&mut self) -> Result<StepOutcome> {
        let failure = self
            .failure
            .take()
            .ok_or_else(|| anyhow!("No failed stage to retry"))?;
        info!("Retrying {}", failure.stage.title());
        self.step().await
    }

    /// Re-issues the failed stage and, if it succeeds, carries on with the rest.
    pub async fn retry(&mut self) -> Result<GenerationOutcome> {
        let outcome = self.retry_stage().await?;
        match self.settle(outcome) {
            Some(done) => Ok(done),
            None => self.run().await,
        }
    }

    fn settle(&self, outcome: StepOutcome) -> Option<GenerationOutcome> {
        match outcome {
            StepOutcome::Advanced(_) => None,
            StepOutcome::Completed(story) => Some(GenerationOutcome::Completed(story)),
            StepOutcome::Failed(stage) => Some(GenerationOutcome::Failed {
                stage,
                message: self
                    .failure
                    .as_ref()
                    .map(|f| f.error.to_string())
                    .unwrap_or_default(),
            }),
        }
    }
}

/// The one flow a front-end may have. A flow is checked out while it runs and
/// parked afterwards; while checked out, new flows and retries are refused.
#[derive(Default)]
pub struct ActiveFlow {
    parked: Option<GenerationWorkflow>,
    running: bool,
}

impl ActiveFlow {
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Checks out a new flow, dropping any parked one. `None` while another
    /// flow is running.
    pub fn start(&mut self, workflow: GenerationWorkflow) -> Option<GenerationWorkflow> {
        if self.running {
            warn!("A story is already being generated");
            return None;
        }
        self.parked = None;
        self.running = true;
        Some(workflow)
    }

    /// Checks the parked flow out again if it is waiting on a failed stage.
    pub fn resume(&mut self) -> Option<GenerationWorkflow> {
        if self.running || self.parked.as_ref()?.failed_stage().is_none() {
            return None;
        }
        self.running = true;
        self.parked.take()
    }

    pub fn park(&mut self, workflow: GenerationWorkflow) {
        self.parked = Some(workflow);
        self.running = false;
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::core::io::MemoryStorage;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Answers each path from a queue of canned results and records every call.
    #[derive(Default)]
    struct ScriptedBackend {
        responses: Mutex<HashMap<String, VecDeque<Result<Value, BackendError>>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedBackend {
        fn respond(&self, path: &str, result: Result<Value, BackendError>) {
            self.responses
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(result);
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }

        fn paths(&self) -> Vec<String> {
            self.calls().into_iter().map(|(p, _)| p).collect()
        }
    }

    #[async_trait]
    impl StoryBackend for ScriptedBackend {
        async fn post_json(&self, path: &str, body: &Value) -> Result<Value, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_string(), body.clone()));
            self.responses
                .lock()
                .unwrap()
                .get_mut(path)
                .and_then(|q| q.pop_front())
                .unwrap_or(Err(BackendError::Status(404)))
        }

        async fn get_json(&self, _path: &str) -> Result<Value, BackendError> {
            Err(BackendError::Status(404))
        }

        async fn post_audio(&self, _: &str, _: Vec<u8>, _: &str) -> Result<Value, BackendError> {
            Err(BackendError::Status(404))
        }
    }

    fn quiz_json(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| {
                    json!({
                        "id": format!("q{}", i),
                        "question": format!("Question {}?", i),
                        "options": ["Carthage", "Egypt", "Mali", "Axum"],
                        "correctAnswer": 0
                    })
                })
                .collect(),
        )
    }

    fn script_hanno(backend: &ScriptedBackend) {
        backend.respond(
            TRANSCRIPT_PATH,
            Ok(json!({ "title": "Hanno the Navigator", "transcript": "Hanno sailed from Carthage..." })),
        );
        backend.respond(AUDIO_PATH, Ok(json!("https://cdn.example/hanno.mp3")));
        backend.respond(
            IMAGES_PATH,
            Ok(json!([
                "https://cdn.example/1.png",
                "https://cdn.example/2.png",
                "https://cdn.example/3.png",
                "https://cdn.example/4.png"
            ])),
        );
        backend.respond(QUIZ_PATH, Ok(quiz_json(6)));
        backend.respond(CREATE_STORY_PATH, Ok(json!("abc123")));
    }

    fn setup() -> (Arc<ScriptedBackend>, StoryStore) {
        let backend = Arc::new(ScriptedBackend::default());
        let store = StoryStore::new(Arc::new(MemoryStorage::new()));
        (backend, store)
    }

    #[test]
    fn test_stage_order() {
        let order: Vec<usize> = GenerationStage::ALL.iter().map(|s| s.index()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(GenerationStage::Quiz.next(), Some(GenerationStage::Persist));
        assert_eq!(GenerationStage::Persist.next(), None);
    }

    #[tokio::test]
    async fn test_full_generation_saves_story() -> Result<()> {
        let (backend, store) = setup();
        script_hanno(&backend);

        let mut workflow = GenerationWorkflow::new(backend.clone(), store.clone(), "Hanno the Navigator");
        let story = match workflow.run().await? {
            GenerationOutcome::Completed(story) => story,
            other => panic!("expected completion, got {:?}", other),
        };

        assert_eq!(story.id, "abc123");
        assert_eq!(story.title, "Hanno the Navigator");
        assert_eq!(story.visual_scenes.len(), 4);
        assert_eq!(story.audio_url, "https://cdn.example/hanno.mp3");
        assert!(workflow.is_complete());
        assert_eq!(workflow.story(), Some(&story));
        assert_eq!(workflow.context().quiz.len(), 6);

        let recent = store.get_all().await;
        assert_eq!(recent[0].id, "abc123");

        assert_eq!(
            backend.paths(),
            vec![TRANSCRIPT_PATH, AUDIO_PATH, IMAGES_PATH, QUIZ_PATH, CREATE_STORY_PATH]
        );
        let calls = backend.calls();
        assert_eq!(calls[0].1, json!({ "topic": "Hanno the Navigator" }));
        assert_eq!(calls[1].1, json!({ "transcript": "Hanno sailed from Carthage..." }));
        assert_eq!(calls[2].1["title"], "Hanno the Navigator");
        assert_eq!(calls[4].1["audio"], "https://cdn.example/hanno.mp3");
        assert_eq!(calls[4].1["images"].as_array().map(Vec::len), Some(4));
        assert_eq!(calls[4].1["quiz"].as_array().map(Vec::len), Some(6));

        assert!(workflow.step().await.is_err(), "stepping a finished flow is an error");
        Ok(())
    }

    #[tokio::test]
    async fn test_audio_failure_then_retry_resumes() -> Result<()> {
        let (backend, store) = setup();
        backend.respond(AUDIO_PATH, Err(BackendError::Status(500)));
        script_hanno(&backend);

        let mut workflow = GenerationWorkflow::new(backend.clone(), store.clone(), "Hanno the Navigator");
        match workflow.run().await? {
            GenerationOutcome::Failed { stage, message } => {
                assert_eq!(stage.index(), 1);
                assert!(message.contains("500"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(workflow.failed_stage(), Some(GenerationStage::Audio));
        assert_eq!(workflow.context().title.as_deref(), Some("Hanno the Navigator"));
        assert!(workflow.step().await.is_err(), "must retry before continuing");
        assert!(store.get_all().await.is_empty());

        match workflow.retry_stage().await? {
            StepOutcome::Advanced(next) => assert_eq!(next, GenerationStage::Visuals),
            other => panic!("expected to advance, got {:?}", other),
        }
        assert_eq!(backend.paths(), vec![TRANSCRIPT_PATH, AUDIO_PATH, AUDIO_PATH]);
        let calls = backend.calls();
        assert_eq!(calls[1].1, calls[2].1, "retry reuses the same context");

        assert!(matches!(workflow.run().await?, GenerationOutcome::Completed(_)));
        assert_eq!(backend.paths()[3], IMAGES_PATH);
        assert_eq!(store.get_all().await[0].id, "abc123");
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_runs_to_completion() -> Result<()> {
        let (backend, store) = setup();
        backend.respond(QUIZ_PATH, Err(BackendError::Remote("model overloaded".to_string())));
        script_hanno(&backend);

        let mut workflow = GenerationWorkflow::new(backend.clone(), store, "Hanno the Navigator");
        assert!(matches!(
            workflow.run().await?,
            GenerationOutcome::Failed { stage: GenerationStage::Quiz, .. }
        ));

        let outcome = workflow.retry().await?;
        assert!(matches!(outcome, GenerationOutcome::Completed(ref s) if s.id == "abc123"));
        // Earlier stages were not repeated
        assert_eq!(backend.paths().iter().filter(|p| *p == TRANSCRIPT_PATH).count(), 1);
        assert_eq!(backend.paths().iter().filter(|p| *p == QUIZ_PATH).count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_without_failure_is_an_error() {
        let (backend, store) = setup();
        let mut workflow = GenerationWorkflow::new(backend, store, "Sundiata");
        assert!(workflow.retry_stage().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_payload_fails_stage() -> Result<()> {
        let (backend, store) = setup();
        backend.respond(TRANSCRIPT_PATH, Err(BackendError::EmptyPayload));

        let mut workflow = GenerationWorkflow::new(backend, store, "Sundiata");
        assert!(matches!(workflow.step().await?, StepOutcome::Failed(GenerationStage::Transcript)));
        assert!(workflow.context().title.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_artifact_fails_stage_without_side_effects() -> Result<()> {
        let (backend, store) = setup();
        script_hanno(&backend);
        // Visuals answers with an object instead of a list
        let mut queue = VecDeque::new();
        queue.push_back(Ok(json!({ "unexpected": true })));
        backend
            .responses
            .lock()
            .unwrap()
            .insert(IMAGES_PATH.to_string(), queue);

        let mut workflow = GenerationWorkflow::new(backend, store, "Hanno the Navigator");
        assert!(matches!(
            workflow.run().await?,
            GenerationOutcome::Failed { stage: GenerationStage::Visuals, .. }
        ));
        assert!(matches!(
            workflow.failure().map(|f| &f.error),
            Some(BackendError::Decode(_))
        ));
        assert!(workflow.context().images.is_empty());
        assert!(workflow.context().audio.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_quiz_with_only_invalid_questions_fails() -> Result<()> {
        let (backend, store) = setup();
        backend.respond(
            TRANSCRIPT_PATH,
            Ok(json!({ "title": "Anansi", "transcript": "..." })),
        );
        backend.respond(AUDIO_PATH, Ok(json!("a.mp3")));
        backend.respond(IMAGES_PATH, Ok(json!(["1.png"])));
        backend.respond(
            QUIZ_PATH,
            Ok(json!([{ "question": "?", "options": ["A"], "correctAnswer": 3 }])),
        );

        let mut workflow = GenerationWorkflow::new(backend, store, "Anansi");
        assert!(matches!(
            workflow.run().await?,
            GenerationOutcome::Failed { stage: GenerationStage::Quiz, .. }
        ));
        assert!(matches!(
            workflow.failure().map(|f| &f.error),
            Some(BackendError::EmptyPayload)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_active_flow_refuses_overlapping_runs() -> Result<()> {
        let (backend, store) = setup();
        backend.respond(TRANSCRIPT_PATH, Err(BackendError::Status(500)));

        let mut active = ActiveFlow::default();
        let mut first = active
            .start(GenerationWorkflow::new(backend.clone(), store.clone(), "Hanno"))
            .expect("nothing is running yet");
        assert!(active.is_running());
        assert!(active
            .start(GenerationWorkflow::new(backend.clone(), store.clone(), "Shaka"))
            .is_none());
        assert!(active.resume().is_none());

        assert!(matches!(
            first.step().await?,
            StepOutcome::Failed(GenerationStage::Transcript)
        ));
        active.park(first);
        assert!(!active.is_running());

        // The retry picks up the flow that failed, not a newer one
        let resumed = active.resume().expect("failed flow is parked");
        assert_eq!(resumed.context().topic, "Hanno");
        assert!(active.resume().is_none());
        active.park(resumed);

        let second = active
            .start(GenerationWorkflow::new(backend.clone(), store, "Shaka"))
            .expect("parked flow does not block a new one");
        assert_eq!(second.context().topic, "Shaka");
        active.park(second);
        assert!(active.resume().is_none());

        assert_eq!(backend.paths(), vec![TRANSCRIPT_PATH]);
        Ok(())
    }
}
