use crate::core::io::Storage;
use crate::core::state::Story;
use anyhow::{Context, Result};
use log::{debug, error};
use std::sync::Arc;

pub const RECENT_STORIES_KEY: &str = "learnershood_recent_stories";
pub const RECENT_STORIES_LIMIT: usize = 10;

/// Most-recent-first list of generated stories, capped at
/// `RECENT_STORIES_LIMIT` and deduplicated by id.
///
/// Every operation is fail-soft: storage and parse errors are logged and the
/// store behaves as if empty.
#[derive(Clone)]
pub struct StoryStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl StoryStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_key(storage, RECENT_STORIES_KEY)
    }

    pub fn with_key(storage: Arc<dyn Storage>, key: &str) -> Self {
        Self {
            storage,
            key: key.to_string(),
        }
    }

    /// Replaces an existing entry with the same id where it stands, otherwise
    /// puts the story at the front.
    pub async fn save(&self, story: Story) {
        if let Err(e) = self.try_save(story).await {
            error!("Error saving story: {:#}", e);
        }
    }

    async fn try_save(&self, story: Story) -> Result<()> {
        let mut stories = self.get_all().await;

        match stories.iter().position(|s| s.id == story.id) {
            Some(i) => stories[i] = story,
            None => stories.insert(0, story),
        }
        stories.truncate(RECENT_STORIES_LIMIT);

        let content = serde_json::to_string(&stories)?;
        self.storage
            .write(&self.key, content.as_bytes())
            .await
            .context("Failed to write recent stories")?;
        debug!("Saved {} recent stories", stories.len());
        Ok(())
    }

    pub async fn get_all(&self) -> Vec<Story> {
        match self.load().await {
            Ok(stories) => stories,
            Err(e) => {
                error!("Error getting recent stories: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn load(&self) -> Result<Vec<Story>> {
        if !self.storage.exists(&self.key).await? {
            return Ok(Vec::new());
        }
        let bytes = self.storage.read(&self.key).await?;
        let content = String::from_utf8(bytes)?;
        serde_json::from_str(&content).context("Recent stories snapshot is malformed")
    }

    pub async fn clear(&self) {
        if let Err(e) = self.storage.delete(&self.key).await {
            error!("Error clearing stories: {:#}", e);
        }
    }
}
