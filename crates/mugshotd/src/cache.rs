//! On-disk cache of the candidate list used by the ranked pick.

use chrono::{DateTime, Duration, Utc};
use mugshot_core::CandidatePost;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    saved_at: DateTime<Utc>,
    memes: Vec<CandidatePost>,
}

pub struct MemeCache {
    path: PathBuf,
    ttl: Duration,
}

impl MemeCache {
    pub fn new(path: PathBuf, ttl_secs: u64) -> Self {
        Self {
            path,
            ttl: Duration::seconds(ttl_secs.min(u32::MAX as u64) as i64),
        }
    }

    /// Cached candidates if the file exists, parses and is younger than the TTL.
    pub fn load(&self) -> Option<Vec<CandidatePost>> {
        self.load_at(Utc::now())
    }

    fn load_at(&self, now: DateTime<Utc>) -> Option<Vec<CandidatePost>> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let file: CacheFile = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt meme cache");
                return None;
            }
        };
        (now - file.saved_at < self.ttl).then_some(file.memes)
    }

    /// Best effort: a failed write only costs a refetch next time.
    pub fn save(&self, memes: &[CandidatePost]) {
        self.save_at(memes, Utc::now());
    }

    fn save_at(&self, memes: &[CandidatePost], now: DateTime<Utc>) {
        let file = CacheFile { saved_at: now, memes: memes.to_vec() };
        let result = serde_json::to_string(&file)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write meme cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meme(title: &str) -> CandidatePost {
        CandidatePost {
            source: "Reddit".into(),
            title: title.into(),
            url: "https://i.redd.it/a.png".into(),
            score: 900,
            comments: 12,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            selection_reason: None,
        }
    }

    #[test]
    fn test_roundtrip_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MemeCache::new(dir.path().join("cache.json"), 7200);
        let now = Utc::now();
        cache.save_at(&[meme("a"), meme("b")], now);

        let loaded = cache.load_at(now + Duration::seconds(7199)).unwrap();
        assert_eq!(loaded, vec![meme("a"), meme("b")]);
    }

    #[test]
    fn test_expired_entries_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MemeCache::new(dir.path().join("cache.json"), 7200);
        let now = Utc::now();
        cache.save_at(&[meme("a")], now);
        assert!(cache.load_at(now + Duration::seconds(7200)).is_none());
    }

    #[test]
    fn test_missing_or_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = MemeCache::new(path.clone(), 7200);
        assert!(cache.load().is_none());
        std::fs::write(&path, "{not json").unwrap();
        assert!(cache.load().is_none());
    }
}
