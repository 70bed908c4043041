use serde::{Deserialize, Serialize};

/// Document ids arrive as `_id`, `id` or both. Stored documents prefer
/// `_id`; embedded questions prefer their own `id`.
#[derive(Deserialize)]
struct DocumentId {
    #[serde(default, rename = "_id")]
    document: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl DocumentId {
    fn stored(self) -> Option<String> {
        self.document.or(self.id)
    }

    fn embedded(self) -> Option<String> {
        self.id.or(self.document)
    }
}

/// A generated story as kept in the recency list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", try_from = "StoryWire")]
pub struct Story {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub audio_url: String,
    pub transcript: String,
    pub visual_scenes: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryWire {
    #[serde(flatten)]
    id: DocumentId,
    title: String,
    #[serde(default)]
    audio_url: String,
    #[serde(default)]
    transcript: String,
    #[serde(default, alias = "images")]
    visual_scenes: Vec<String>,
    #[serde(default)]
    created_at: i64,
}

impl TryFrom<StoryWire> for Story {
    type Error = String;

    fn try_from(wire: StoryWire) -> Result<Self, Self::Error> {
        Ok(Story {
            id: wire.id.stored().ok_or("story has no id")?,
            title: wire.title,
            audio_url: wire.audio_url,
            transcript: wire.transcript,
            visual_scenes: wire.visual_scenes,
            created_at: wire.created_at,
        })
    }
}

impl Story {
    pub fn thumbnail(&self) -> Option<&str> {
        self.visual_scenes.first().map(String::as_str)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "QuizQuestionWire")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "correctAnswer")]
    pub correct_answer_index: usize,
}

#[derive(Deserialize)]
struct QuizQuestionWire {
    #[serde(flatten)]
    id: DocumentId,
    question: String,
    options: Vec<String>,
    #[serde(rename = "correctAnswer", alias = "correctAnswerIndex")]
    correct_answer_index: usize,
}

impl From<QuizQuestionWire> for QuizQuestion {
    fn from(wire: QuizQuestionWire) -> Self {
        QuizQuestion {
            id: wire.id.embedded().unwrap_or_default(),
            question: wire.question,
            options: wire.options,
            correct_answer_index: wire.correct_answer_index,
        }
    }
}

impl QuizQuestion {
    pub fn is_valid(&self) -> bool {
        self.correct_answer_index < self.options.len()
    }

    pub fn is_correct(&self, answer: usize) -> bool {
        answer == self.correct_answer_index
    }
}

/// `createdAt` as the backend sends it: epoch millis or an RFC 3339 string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Timestamp::Millis(ms) => Some(*ms),
            Timestamp::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

/// A story as stored by the backend.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase", try_from = "StoryRecordWire")]
pub struct StoryRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub audio: String,
    pub transcript: String,
    pub images: Vec<String>,
    pub quiz: Vec<QuizQuestion>,
    pub created_at: Option<Timestamp>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRecordWire {
    #[serde(flatten)]
    id: DocumentId,
    title: String,
    #[serde(default)]
    audio: String,
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    quiz: Vec<QuizQuestion>,
    #[serde(default)]
    created_at: Option<Timestamp>,
}

impl TryFrom<StoryRecordWire> for StoryRecord {
    type Error = String;

    fn try_from(wire: StoryRecordWire) -> Result<Self, Self::Error> {
        Ok(StoryRecord {
            id: wire.id.stored().ok_or("story record has no id")?,
            title: wire.title,
            audio: wire.audio,
            transcript: wire.transcript,
            images: wire.images,
            quiz: wire.quiz,
            created_at: wire.created_at,
        })
    }
}

impl From<StoryRecord> for Story {
    fn from(record: StoryRecord) -> Self {
        let created_at = record
            .created_at
            .as_ref()
            .and_then(Timestamp::as_millis)
            .unwrap_or_default();
        Story {
            id: record.id,
            title: record.title,
            audio_url: record.audio,
            transcript: record.transcript,
            visual_scenes: record.images,
            created_at,
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
