use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use crate::models::Feedback;
use crate::storage::collection::JsonCollection;

/// Append-only store of job feedback.
pub struct FeedbackStore {
    collection: JsonCollection<Feedback>,
}

impl FeedbackStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            collection: JsonCollection::open(data_dir, "feedback.json").await?,
        })
    }

    pub async fn append(&self, job_id: i64, user_id: i64, text: &str) -> Result<Feedback> {
        let text = text.to_string();
        self.collection
            .update(move |entries| {
                let feedback = Feedback {
                    id: entries.iter().map(|f| f.id).max().unwrap_or(0) + 1,
                    job_id,
                    user_id,
                    text,
                    created_at: Utc::now(),
                };
                entries.push(feedback.clone());
                feedback
            })
            .await
    }

    pub async fn list_for_job(&self, job_id: i64) -> Vec<Feedback> {
        self.collection
            .read(|entries| {
                entries
                    .iter()
                    .filter(|f| f.job_id == job_id)
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn list_all(&self) -> Vec<Feedback> {
        self.collection.read(|entries| entries.to_vec()).await
    }
}
