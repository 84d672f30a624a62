use std::{cmp::Reverse, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use quickpost_api::{
    Comment, CommentId, CommentListing, Error, NewComment, PageParam, RemoteCommentStore,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct MockConfig {
    /// Bounds of the uniformly random latency of `create_comment`
    pub min_delay: std::time::Duration,
    pub max_delay: std::time::Duration,

    /// Probability for each `create_comment` call to fail
    pub failure_rate: f64,

    /// Seed for the latency and failure draws, random if unset
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> MockConfig {
        MockConfig {
            min_delay: std::time::Duration::from_millis(2000),
            max_delay: std::time::Duration::from_millis(4000),
            failure_rate: 0.1,
            seed: None,
        }
    }
}

impl MockConfig {
    /// Answers right away and never fails on its own
    pub fn instant() -> MockConfig {
        MockConfig {
            min_delay: std::time::Duration::ZERO,
            max_delay: std::time::Duration::ZERO,
            failure_rate: 0.0,
            seed: Some(0),
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
pub struct JsonDb {
    pub comments: Vec<Comment>,
}

#[derive(Debug)]
struct Db {
    comments: Vec<Comment>,
    next_id: u64,
    rng: StdRng,
    fail_next: usize,
}

/// In-memory comment store behaving like a json-server instance, with
/// simulated network latency and failures
#[derive(Clone, Debug)]
pub struct MockServer {
    config: Arc<MockConfig>,
    db: Arc<Mutex<Db>>,
}

impl MockServer {
    pub fn new(config: MockConfig) -> MockServer {
        MockServer::with_comments(config, Vec::new())
    }

    /// A failure rate that is not a number never fails
    pub fn with_comments(mut config: MockConfig, comments: Vec<Comment>) -> MockServer {
        if config.failure_rate.is_nan() {
            tracing::warn!("failure rate is not a number, disabling simulated failures");
            config.failure_rate = 0.0;
        }
        let next_id = comments.iter().map(|c| c.id.0).max().unwrap_or(0) + 1;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        MockServer {
            config: Arc::new(config),
            db: Arc::new(Mutex::new(Db {
                comments,
                next_id,
                rng,
                fail_next: 0,
            })),
        }
    }

    /// Loads a json-server style `{ "comments": [...] }` document
    pub fn from_json(config: MockConfig, json: &str) -> anyhow::Result<MockServer> {
        let db: JsonDb = serde_json::from_str(json).context("parsing mock server database")?;
        Ok(MockServer::with_comments(config, db.comments))
    }

    /// Make the next `create_comment` call fail regardless of the failure rate
    pub async fn test_fail_next(&self) {
        self.db.lock().await.fail_next += 1;
    }

    /// Return the current number of comments
    pub async fn test_num_comments(&self) -> usize {
        self.db.lock().await.comments.len()
    }

    /// Return the comments, newest first
    pub async fn test_comments(&self) -> Vec<Comment> {
        let mut comments = self.db.lock().await.comments.clone();
        sort_newest_first(&mut comments);
        comments
    }
}

fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by_key(|c| (Reverse(c.created_at), Reverse(c.id)));
}

#[async_trait]
impl RemoteCommentStore for MockServer {
    async fn create_comment(&self, c: NewComment) -> Result<Comment, Error> {
        c.validate()?;
        let (delay, fail) = {
            let mut db = self.db.lock().await;
            let delay = match self.config.min_delay < self.config.max_delay {
                true => db.rng.gen_range(self.config.min_delay..=self.config.max_delay),
                false => self.config.min_delay,
            };
            let fail = match db.fail_next {
                0 => db.rng.gen_bool(self.config.failure_rate.clamp(0.0, 1.0)),
                _ => {
                    db.fail_next -= 1;
                    true
                }
            };
            (delay, fail)
        };
        tokio::time::sleep(delay).await;
        if fail {
            tracing::info!("simulating a failed comment creation");
            return Err(Error::Network(String::from(
                "Simulated network error. Please try again.",
            )));
        }

        let mut db = self.db.lock().await;
        let comment = Comment {
            id: CommentId(db.next_id),
            client_id: None,
            text: c.text,
            user: c.user,
            created_at: c.created_at,
        };
        db.next_id += 1;
        db.comments.push(comment.clone());
        tracing::debug!(id = ?comment.id, "created comment");
        Ok(comment)
    }

    async fn fetch_comments(&self, page: PageParam, limit: usize) -> Result<CommentListing, Error> {
        let mut comments = self.db.lock().await.comments.clone();
        let total_count = comments.len() as u64;
        sort_newest_first(&mut comments);
        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit);
        Ok(CommentListing {
            comments: comments.into_iter().skip(skip).take(limit).collect(),
            total_count,
        })
    }
}
