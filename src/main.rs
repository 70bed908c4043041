use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Select, Text};
use learnershood::core::config::Config;
use learnershood::core::io::{NativeStorage, Storage};
use learnershood::core::state::{QuizQuestion, Story};
use learnershood::services::backend::{HttpBackend, StoryBackend};
use learnershood::services::quiz::QuizSession;
use learnershood::services::setup;
use learnershood::services::store::StoryStore;
use learnershood::services::workflow::{GenerationStage, GenerationWorkflow, StepOutcome};
use learnershood::utils::image_cache::{HttpImageSource, ImageCache};
use std::sync::Arc;
use std::time::Duration;

const MENU_CREATE: &str = "Create a story";
const MENU_VOICE: &str = "Create a story from a voice recording";
const MENU_RECENT: &str = "Recent stories";
const MENU_EXPLORE: &str = "Explore all stories";
const MENU_CLEAR: &str = "Clear recent stories";
const MENU_QUIT: &str = "Quit";

struct App {
    config: Config,
    store: StoryStore,
    backend: Arc<dyn StoryBackend>,
    images: ImageCache<HttpImageSource>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut config = match Config::load_or_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please fix 'config.yml' or delete it to run setup again.");
            return Err(e);
        }
    };

    setup::run_setup(&mut config).await?;
    config.ensure_directories()?;

    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new(&config.data_folder));
    let backend: Arc<dyn StoryBackend> = Arc::new(HttpBackend::new(&config)?);
    let app = App {
        store: StoryStore::new(storage),
        backend,
        images: ImageCache::new(HttpImageSource::new()),
        config,
    };

    // `learnershood Hanno the Navigator` skips the menu
    let topic = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !topic.trim().is_empty() {
        app.generate(&topic).await?;
        return Ok(());
    }

    app.menu().await
}

impl App {
    async fn menu(&self) -> Result<()> {
        loop {
            let options = vec![
                MENU_CREATE,
                MENU_VOICE,
                MENU_RECENT,
                MENU_EXPLORE,
                MENU_CLEAR,
                MENU_QUIT,
            ];
            let choice = match Select::new("What would you like to do?", options).prompt() {
                Ok(choice) => choice,
                Err(_) => break,
            };

            let result = match choice {
                MENU_CREATE => self.create_from_search().await,
                MENU_VOICE => self.create_from_voice().await,
                MENU_RECENT => self.recent_stories().await,
                MENU_EXPLORE => self.explore().await,
                MENU_CLEAR => self.clear_recent().await,
                _ => break,
            };

            if let Err(e) = result {
                eprintln!("Error: {:#}", e);
            }
        }
        Ok(())
    }

    async fn create_from_search(&self) -> Result<()> {
        let topic = Text::new("Search for an African story:")
            .with_placeholder("Hanno the Navigator")
            .prompt()?;
        if topic.trim().is_empty() {
            return Ok(());
        }
        self.generate(&topic).await
    }

    async fn create_from_voice(&self) -> Result<()> {
        let path = Text::new("Path to the voice recording:").prompt()?;
        let audio = tokio::fs::read(path.trim())
            .await
            .with_context(|| format!("Failed to read {}", path.trim()))?;

        let spinner = spinner("Transcribing audio");
        let topic = self.backend.transcribe_audio(audio).await;
        spinner.finish_and_clear();
        let topic = topic.context("Transcription failed")?;

        println!("You asked for: {}", topic);
        if Confirm::new("Create this story?").with_default(true).prompt()? {
            self.generate(&topic).await?;
        }
        Ok(())
    }

    async fn generate(&self, topic: &str) -> Result<()> {
        println!("Creating your story: {}", topic.trim());
        let mut workflow =
            GenerationWorkflow::new(self.backend.clone(), self.store.clone(), topic);

        loop {
            let stage = workflow.current_stage();
            let pb = spinner(stage_label(stage));

            let outcome = if workflow.failed_stage().is_some() {
                workflow.retry_stage().await?
            } else {
                workflow.step().await?
            };

            match outcome {
                StepOutcome::Advanced(_) => pb.finish_with_message(format!("✔ {}", stage.title())),
                StepOutcome::Completed(story) => {
                    pb.finish_with_message(format!("✔ {}", stage.title()));
                    println!("Story ready: {} ({})", story.title, story.id);
                    return self.view_story(&story.id).await;
                }
                StepOutcome::Failed(stage) => {
                    let reason = workflow
                        .failure()
                        .map(|f| f.error.to_string())
                        .unwrap_or_default();
                    pb.abandon_with_message(format!("✘ {}: {}", stage.title(), reason));

                    if self.config.unattended {
                        anyhow::bail!("{} failed: {}", stage.title(), reason);
                    }
                    let retry = Confirm::new(&format!("Retry {}?", stage.title().to_lowercase()))
                        .with_default(true)
                        .prompt()?;
                    if !retry {
                        println!("Stopping as requested.");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn recent_stories(&self) -> Result<()> {
        let stories = self.store.get_all().await;
        if stories.is_empty() {
            println!("No stories yet. Start exploring to create your first story!");
            return Ok(());
        }

        let thumbnails: Vec<String> = stories
            .iter()
            .filter_map(|s| s.thumbnail().map(str::to_string))
            .collect();
        if let Err(e) = self.images.preload_all(&thumbnails).await {
            log::warn!("Failed to preload thumbnails: {:#}", e);
        }

        if let Some(id) = pick_story(&stories)? {
            self.view_story(&id).await?;
        }
        Ok(())
    }

    async fn explore(&self) -> Result<()> {
        let pb = spinner("Loading stories");
        let records = self.backend.fetch_all_stories().await;
        pb.finish_and_clear();

        let stories: Vec<Story> = records?.into_iter().map(Story::from).collect();
        if stories.is_empty() {
            println!("No stories found.");
            return Ok(());
        }
        if let Some(id) = pick_story(&stories)? {
            self.view_story(&id).await?;
        }
        Ok(())
    }

    async fn view_story(&self, id: &str) -> Result<()> {
        let record = self
            .backend
            .fetch_story(id)
            .await
            .with_context(|| format!("Failed to load story {}", id))?;
        let quiz = record.quiz.clone();
        let story = Story::from(record);

        println!();
        println!("== {} ==", story.title);
        println!("Audio: {}", story.audio_url);
        if let Err(e) = self.images.preload_all(&story.visual_scenes).await {
            log::warn!("Failed to preload scenes: {:#}", e);
        }
        for (i, scene) in story.visual_scenes.iter().enumerate() {
            match self.images.get(scene) {
                Some(bytes) => println!("Scene {}: {} ({} KB)", i + 1, scene, bytes.len() / 1024),
                None => println!("Scene {}: {}", i + 1, scene),
            }
        }
        println!();
        println!("{}", story.transcript);
        println!();

        if !quiz.is_empty() && Confirm::new("Take the quiz?").with_default(true).prompt()? {
            self.run_quiz(&quiz)?;
        }
        Ok(())
    }

    fn run_quiz(&self, pool: &[QuizQuestion]) -> Result<()> {
        let mut session = QuizSession::from_pool(pool, self.config.quiz_size);
        if session.is_empty() {
            println!("This story has no quiz.");
            return Ok(());
        }

        while let Some(question) = session.current().cloned() {
            let prompt = format!(
                "Question {}/{}: {}",
                session.position() + 1,
                session.len(),
                question.question
            );
            let answer = Select::new(&prompt, question.options.clone()).raw_prompt()?;
            session.select(answer.index);

            match session.confirm() {
                Some(true) => println!("Correct! Score: {}", session.score()),
                Some(false) => println!(
                    "Incorrect. The answer was: {}. Score: {}",
                    question.options[question.correct_answer_index],
                    session.score()
                ),
                None => {}
            }
            if !session.next() {
                break;
            }
        }

        println!("Quiz complete! You scored {}/{}", session.score(), session.len());
        Ok(())
    }

    async fn clear_recent(&self) -> Result<()> {
        if Confirm::new("Remove all recent stories?")
            .with_default(false)
            .prompt()?
        {
            self.store.clear().await;
            println!("Recent stories cleared.");
        }
        Ok(())
    }
}

fn stage_label(stage: GenerationStage) -> String {
    format!(
        "[{}/{}] {}",
        stage.index() + 1,
        GenerationStage::ALL.len(),
        stage.title()
    )
}

fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn pick_story(stories: &[Story]) -> Result<Option<String>> {
    let labels: Vec<String> = stories
        .iter()
        .map(|s| format!("{} ({} scenes)", s.title, s.visual_scenes.len()))
        .collect();
    match Select::new("Pick a story:", labels).raw_prompt_skippable()? {
        Some(choice) => Ok(Some(stories[choice.index].id.clone())),
        None => Ok(None),
    }
}
