//! File-backed library of places, guide articles and reader ratings.
//!
//! Layout under the data directory:
//! - `places.json`: all places
//! - `articles/{placeId}_{style}.json`: one article per place and style
//! - `ratings/single.json`, `ratings/compare.json`: appended ratings

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeTarget {
    Adult,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleVolume {
    Full,
    Short,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub place_id: String,
    pub style: String,
    pub age_target: AgeTarget,
    pub volume: ArticleVolume,
    pub title: String,
    /// Markdown body.
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthVerdict {
    TooShort,
    JustRight,
    TooLong,
}

/// Rating form for one article, as posted by the reader.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SingleRatingInput {
    pub place_id: String,
    pub article_style: String,
    #[serde(deserialize_with = "lenient_score")]
    pub clarity: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub style_match: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub structure: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub usefulness: u8,
    pub length: Option<LengthVerdict>,
    #[serde(deserialize_with = "lenient_score")]
    pub enjoyment: u8,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRating {
    pub id: Uuid,
    pub timestamp: String,
    pub place_id: String,
    pub article_style: String,
    pub clarity: u8,
    pub style_match: u8,
    pub structure: u8,
    pub usefulness: u8,
    pub length: Option<LengthVerdict>,
    pub enjoyment: u8,
    pub comment: String,
}

/// Which article style won each category, when comparing all styles of a place.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompareRatingInput {
    pub place_id: String,
    pub best_overall: String,
    pub easiest_to_understand: String,
    pub best_for_children: String,
    pub best_for_quick_look: String,
    pub best_for_planning: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRating {
    pub id: Uuid,
    pub timestamp: String,
    pub place_id: String,
    pub best_overall: String,
    pub easiest_to_understand: String,
    pub best_for_children: String,
    pub best_for_quick_look: String,
    pub best_for_planning: String,
    pub comment: String,
}

/// Scores arrive as numbers or numeric strings; anything else counts as 0.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u8, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let score = match &value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(score.unwrap_or(0).min(u8::MAX as u64) as u8)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Ids end up in file names; only allow plain slugs.
fn is_slug(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct Library {
    root: PathBuf,
    /// Serializes read-modify-write of rating files.
    ratings_lock: Mutex<()>,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("Library at {}", root.display());
        Self {
            root,
            ratings_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn places(&self) -> Result<Vec<Place>> {
        let contents = fs::read_to_string(self.root.join("places.json")).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub async fn place(&self, id: &str) -> Result<Place> {
        self.places()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("place {id}")))
    }

    pub async fn article(&self, place_id: &str, style: &str) -> Result<Article> {
        let not_found = || Error::NotFound(format!("article {place_id}/{style}"));
        if !is_slug(place_id) || !is_slug(style) {
            return Err(not_found());
        }

        let path = self.root.join("articles").join(format!("{place_id}_{style}.json"));
        let contents = fs::read_to_string(&path).await.map_err(|_| not_found())?;
        serde_json::from_str(&contents).map_err(|e| {
            warn!("Unreadable article {}: {e}", path.display());
            not_found()
        })
    }

    pub async fn single_ratings(&self) -> Vec<SingleRating> {
        read_ratings(&self.single_path()).await
    }

    pub async fn compare_ratings(&self) -> Vec<CompareRating> {
        read_ratings(&self.compare_path()).await
    }

    pub async fn add_single_rating(&self, input: SingleRatingInput) -> Result<SingleRating> {
        let rating = SingleRating {
            id: Uuid::new_v4(),
            timestamp: now(),
            place_id: input.place_id,
            article_style: input.article_style,
            clarity: input.clarity,
            style_match: input.style_match,
            structure: input.structure,
            usefulness: input.usefulness,
            length: input.length,
            enjoyment: input.enjoyment,
            comment: input.comment,
        };
        self.append(&self.single_path(), &rating).await?;
        info!("Saved rating {} for {}/{}", rating.id, rating.place_id, rating.article_style);
        Ok(rating)
    }

    pub async fn add_compare_rating(&self, input: CompareRatingInput) -> Result<CompareRating> {
        let rating = CompareRating {
            id: Uuid::new_v4(),
            timestamp: now(),
            place_id: input.place_id,
            best_overall: input.best_overall,
            easiest_to_understand: input.easiest_to_understand,
            best_for_children: input.best_for_children,
            best_for_quick_look: input.best_for_quick_look,
            best_for_planning: input.best_for_planning,
            comment: input.comment,
        };
        self.append(&self.compare_path(), &rating).await?;
        info!("Saved comparison {} for {}", rating.id, rating.place_id);
        Ok(rating)
    }

    fn single_path(&self) -> PathBuf {
        self.root.join("ratings/single.json")
    }

    fn compare_path(&self) -> PathBuf {
        self.root.join("ratings/compare.json")
    }

    /// Append to a JSON array file. Existing entries are kept as raw JSON so
    /// records with an older shape survive the rewrite.
    async fn append<T: Serialize>(&self, path: &Path, rating: &T) -> Result<()> {
        let _guard = self.ratings_lock.lock().await;

        let mut entries: Vec<serde_json::Value> = match fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        entries.push(serde_json::to_value(rating)?);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(path, serde_json::to_string_pretty(&entries)?).await?;
        debug!("{} now holds {} ratings", path.display(), entries.len());
        Ok(())
    }
}

/// Read a ratings file; missing or corrupt files read as empty and malformed
/// entries are skipped.
async fn read_ratings<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(contents) = fs::read_to_string(path).await else {
        return Vec::new();
    };
    let entries: Vec<serde_json::Value> = serde_json::from_str(&contents).unwrap_or_default();
    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect()
}
