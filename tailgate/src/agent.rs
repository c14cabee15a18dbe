//! Recommendation agent
//!
//! Runs one recommendation request end to end and records every step in the
//! shared [`LogStore`], which is what the log panel tails while a request is
//! in flight.

use crate::log_store::{LogLevel, LogStore};
use crate::memory::MemoryStore;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors from recommendation processing
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("Mood and activity are required.")]
    MissingFields,

    #[error("Recommender failed: {0}")]
    Recommender(String),
}

/// Free-form tags, either `"a, b"` / `"a b"` or `["a", "b"]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    Text(String),
    List(Vec<String>),
}

impl Tags {
    /// Split into trimmed, non-empty tags. Text is split on commas when it
    /// contains one, otherwise on whitespace.
    pub fn normalized(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Tags::Text(text) if text.contains(',') => text.split(',').collect(),
            Tags::Text(text) => text.split_whitespace().collect(),
            Tags::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Body of `POST /recommend`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mood: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

/// `null` counts as a missing field rather than a malformed body
fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// A validated request
#[derive(Debug, Clone)]
pub struct UserInput {
    pub mood: String,
    pub activity: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
}

impl TryFrom<&RecommendRequest> for UserInput {
    type Error = RecommendError;

    fn try_from(request: &RecommendRequest) -> Result<Self, Self::Error> {
        let mood = request.mood.trim();
        let activity = request.activity.trim();
        if mood.is_empty() || activity.is_empty() {
            return Err(RecommendError::MissingFields);
        }

        Ok(Self {
            mood: mood.to_string(),
            activity: activity.to_string(),
            location: request
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            tags: request.tags.as_ref().map(Tags::normalized).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub song: String,
    pub artist: String,
    pub genre: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Recommendations {
    pub items: Vec<Recommendation>,
    pub reasoning: String,
}

/// Response of `POST /recommend`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub success: bool,
    pub recommendations: Vec<Recommendation>,
    pub reasoning: String,
    pub memory_id: String,
}

/// Source of song recommendations
#[async_trait]
pub trait Recommender: Send + Sync {
    /// Name used in log entries
    fn name(&self) -> &str;

    async fn recommend(&self, input: &UserInput) -> Result<Recommendations, RecommendError>;
}

struct CatalogSong {
    song: &'static str,
    artist: &'static str,
    genre: &'static str,
    moods: &'static [&'static str],
    activities: &'static [&'static str],
    tags: &'static [&'static str],
}

const CATALOG: &[CatalogSong] = &[
    CatalogSong {
        song: "Weightless",
        artist: "Marconi Union",
        genre: "ambient",
        moods: &["calm", "anxious", "stressed", "tired"],
        activities: &["sleep", "relax", "meditate", "read"],
        tags: &["ambient", "instrumental", "chill"],
    },
    CatalogSong {
        song: "Lose Yourself",
        artist: "Eminem",
        genre: "hip-hop",
        moods: &["motivated", "determined", "angry", "energetic"],
        activities: &["workout", "run", "gym", "train"],
        tags: &["rap", "hype"],
    },
    CatalogSong {
        song: "Here Comes the Sun",
        artist: "The Beatles",
        genre: "rock",
        moods: &["happy", "hopeful", "cheerful", "sad"],
        activities: &["walk", "drive", "cook", "morning"],
        tags: &["classic", "sunny", "60s"],
    },
    CatalogSong {
        song: "Clair de Lune",
        artist: "Claude Debussy",
        genre: "classical",
        moods: &["calm", "reflective", "melancholic", "romantic"],
        activities: &["study", "read", "relax", "focus"],
        tags: &["piano", "instrumental", "classical"],
    },
    CatalogSong {
        song: "Blinding Lights",
        artist: "The Weeknd",
        genre: "synth-pop",
        moods: &["energetic", "happy", "excited"],
        activities: &["drive", "party", "dance", "run"],
        tags: &["80s", "synth", "pop"],
    },
    CatalogSong {
        song: "Someone Like You",
        artist: "Adele",
        genre: "pop",
        moods: &["sad", "heartbroken", "melancholic", "lonely"],
        activities: &["relax", "rain", "reflect"],
        tags: &["ballad", "piano"],
    },
    CatalogSong {
        song: "Intro",
        artist: "The xx",
        genre: "indie",
        moods: &["focused", "calm", "reflective"],
        activities: &["study", "work", "code", "focus"],
        tags: &["instrumental", "indie", "chill"],
    },
    CatalogSong {
        song: "Uptown Funk",
        artist: "Mark Ronson ft. Bruno Mars",
        genre: "funk",
        moods: &["happy", "excited", "playful"],
        activities: &["party", "dance", "clean", "cook"],
        tags: &["funk", "pop", "upbeat"],
    },
];

/// Scores a built-in catalog by overlap with the user's words
pub struct CatalogRecommender {
    limit: usize,
}

impl Default for CatalogRecommender {
    fn default() -> Self {
        Self { limit: 3 }
    }
}

impl CatalogRecommender {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn overlap(candidates: &[&str], words: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| words.iter().any(|w| w.starts_with(*c) || c.starts_with(w.as_str())))
        .map(|c| c.to_string())
        .collect()
}

#[async_trait]
impl Recommender for CatalogRecommender {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn recommend(&self, input: &UserInput) -> Result<Recommendations, RecommendError> {
        let mood_words = words(&input.mood);
        let activity_words = words(&input.activity);
        let tag_words: Vec<String> = input.tags.iter().flat_map(|t| words(t)).collect();

        let mut scored: Vec<(usize, usize, Recommendation)> = CATALOG
            .iter()
            .enumerate()
            .map(|(idx, song)| {
                let moods = overlap(song.moods, &mood_words);
                let activities = overlap(song.activities, &activity_words);
                let tags = overlap(song.tags, &tag_words);
                let score = moods.len() * 3 + activities.len() * 2 + tags.len();

                let mut matched: Vec<String> = Vec::new();
                matched.extend(moods.into_iter().map(|m| format!("mood '{m}'")));
                matched.extend(activities.into_iter().map(|a| format!("activity '{a}'")));
                matched.extend(tags.into_iter().map(|t| format!("tag '{t}'")));
                let reason = if matched.is_empty() {
                    "General pick from the catalog".to_string()
                } else {
                    format!("Matches {}", matched.join(", "))
                };

                debug!(song = song.song, score, "Scored catalog entry");
                (
                    score,
                    idx,
                    Recommendation {
                        song: song.song.to_string(),
                        artist: song.artist.to_string(),
                        genre: song.genre.to_string(),
                        reason,
                    },
                )
            })
            .collect();

        // Highest score first, catalog order breaks ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let best = scored.first().map(|s| s.0).unwrap_or(0);

        let items: Vec<Recommendation> = scored
            .into_iter()
            .take(self.limit)
            .map(|(_, _, r)| r)
            .collect();

        let reasoning = if best == 0 {
            format!(
                "No catalog entry matched mood '{}' or activity '{}'; returning general picks",
                input.mood, input.activity
            )
        } else {
            format!(
                "Ranked catalog by fit for mood '{}' while '{}'",
                input.mood, input.activity
            )
        };

        Ok(Recommendations { items, reasoning })
    }
}

/// Validates, remembers and answers recommendation requests
pub struct RecommendationAgent {
    recommender: Arc<dyn Recommender>,
    logs: Arc<LogStore>,
    memory: Arc<MemoryStore>,
}

impl RecommendationAgent {
    pub fn new(
        recommender: Arc<dyn Recommender>,
        logs: Arc<LogStore>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            recommender,
            logs,
            memory,
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Process one request, logging each step
    pub async fn process(
        &self,
        request: &RecommendRequest,
    ) -> Result<RecommendResponse, RecommendError> {
        self.logs.info("New recommendation request received");
        self.logs.record(
            LogLevel::Info,
            format!(
                "User input - Mood: {}, Activity: {}, Location: {}",
                request.mood.trim(),
                request.activity.trim(),
                request.location.as_deref().unwrap_or("").trim()
            ),
            json!({ "mood": request.mood, "activity": request.activity, "tags": request.tags }),
        );

        let input = match UserInput::try_from(request) {
            Ok(input) => input,
            Err(e) => {
                self.logs
                    .error("Validation failed: mood and activity are required");
                return Err(e);
            }
        };

        self.logs.info("Storing inputs in memory");
        let memory_id = self.memory.add_conversation(
            format!(
                "Mood: {}; Activity: {}; Tags: {}",
                input.mood,
                input.activity,
                input.tags.join(", ")
            ),
            2.0,
            input.tags.clone(),
            json!({ "source": "web", "location": input.location }),
        );
        self.logs
            .success(format!("Stored to short-term memory: {memory_id}"));

        self.logs.record(
            LogLevel::Info,
            format!("Asking recommender '{}'", self.recommender.name()),
            json!({ "tags": input.tags }),
        );
        let result = match self.recommender.recommend(&input).await {
            Ok(result) => result,
            Err(e) => {
                self.logs.error(format!("Recommender failed: {e}"));
                return Err(e);
            }
        };

        if result.items.is_empty() {
            self.logs.warn("No recommendations received");
        } else {
            self.logs.success(format!(
                "Received {} recommendation(s)",
                result.items.len()
            ));
            let top = &result.items[0];
            self.logs.record(
                LogLevel::Info,
                format!("Top recommendation: {} by {}", top.song, top.artist),
                json!({ "reason": top.reason }),
            );
        }

        self.logs
            .success("Recommendation request completed successfully");

        Ok(RecommendResponse {
            success: true,
            recommendations: result.items,
            reasoning: result.reasoning,
            memory_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with(recommender: Arc<dyn Recommender>) -> (RecommendationAgent, Arc<LogStore>) {
        let logs = Arc::new(LogStore::new());
        let agent = RecommendationAgent::new(
            recommender,
            Arc::clone(&logs),
            Arc::new(MemoryStore::new()),
        );
        (agent, logs)
    }

    fn request(mood: &str, activity: &str) -> RecommendRequest {
        RecommendRequest {
            mood: mood.to_string(),
            activity: activity.to_string(),
            ..Default::default()
        }
    }

    struct FailingRecommender;

    #[async_trait]
    impl Recommender for FailingRecommender {
        fn name(&self) -> &str {
            "failing"
        }

        async fn recommend(&self, _input: &UserInput) -> Result<Recommendations, RecommendError> {
            Err(RecommendError::Recommender("model offline".to_string()))
        }
    }

    #[test]
    fn test_tags_normalization() {
        assert_eq!(
            Tags::Text("chill, piano ,, ".into()).normalized(),
            vec!["chill", "piano"]
        );
        assert_eq!(
            Tags::Text("  lofi beats  ".into()).normalized(),
            vec!["lofi", "beats"]
        );
        assert_eq!(
            Tags::List(vec![" a ".into(), "".into(), "b".into()]).normalized(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_tags_accept_string_or_array() {
        let req: RecommendRequest =
            serde_json::from_str(r#"{"mood":"calm","activity":"read","tags":"a, b"}"#).unwrap();
        assert_eq!(req.tags, Some(Tags::Text("a, b".into())));

        let req: RecommendRequest =
            serde_json::from_str(r#"{"mood":"calm","activity":"read","tags":["a","b"]}"#).unwrap();
        assert_eq!(req.tags, Some(Tags::List(vec!["a".into(), "b".into()])));
    }

    #[test]
    fn test_validation_requires_mood_and_activity() {
        assert!(matches!(
            UserInput::try_from(&request("", "run")),
            Err(RecommendError::MissingFields)
        ));
        assert!(matches!(
            UserInput::try_from(&request("happy", "   ")),
            Err(RecommendError::MissingFields)
        ));
        let input = UserInput::try_from(&request(" happy ", "run")).unwrap();
        assert_eq!(input.mood, "happy");
        assert!(input.location.is_none());
    }

    #[tokio::test]
    async fn test_catalog_ranks_best_match_first() {
        let input = UserInput::try_from(&request("calm", "study")).unwrap();
        let result = CatalogRecommender::default().recommend(&input).await.unwrap();
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.items[0].song, "Clair de Lune");
        assert!(result.items[0].reason.contains("mood 'calm'"));
    }

    #[tokio::test]
    async fn test_catalog_falls_back_without_match() {
        let input = UserInput::try_from(&request("zzz", "qqq")).unwrap();
        let result = CatalogRecommender::new(2).recommend(&input).await.unwrap();
        assert_eq!(result.items.len(), 2);
        assert!(result.reasoning.starts_with("No catalog entry matched"));
    }

    #[tokio::test]
    async fn test_process_logs_each_step() {
        let (agent, logs) = agent_with(Arc::new(CatalogRecommender::default()));
        let response = agent.process(&request("happy", "dance")).await.unwrap();

        assert!(response.success);
        assert!(!response.recommendations.is_empty());
        assert_eq!(agent.memory().recent(1)[0].id, response.memory_id);

        let entries = logs.tail(100);
        assert_eq!(entries[0].message, "New recommendation request received");
        assert_eq!(
            entries.last().unwrap().message,
            "Recommendation request completed successfully"
        );
        assert!(entries.iter().any(|e| e.message.starts_with("Top recommendation:")));
    }

    #[tokio::test]
    async fn test_process_rejects_missing_fields() {
        let (agent, logs) = agent_with(Arc::new(CatalogRecommender::default()));
        let err = agent.process(&request("", "dance")).await.unwrap_err();
        assert!(matches!(err, RecommendError::MissingFields));
        assert_eq!(logs.tail(1)[0].level, LogLevel::Error);
        assert!(agent.memory().recent(5).is_empty());
    }

    #[tokio::test]
    async fn test_process_reports_recommender_failure() {
        let (agent, logs) = agent_with(Arc::new(FailingRecommender));
        let err = agent.process(&request("calm", "read")).await.unwrap_err();
        assert!(err.to_string().contains("model offline"));
        let last = &logs.tail(1)[0];
        assert_eq!(last.level, LogLevel::Error);
    }
}
