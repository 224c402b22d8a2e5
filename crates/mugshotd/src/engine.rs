use crate::cache::MemeCache;
use crate::config::Config;
use mugshot_core::{
    CandidatePost, CandidateSource, FaceLocator, FaceSubstitution, Generated, InSwapper,
    OnnxFaceAnalyzer, Pipeline, PipelineError, Ranker, UpstreamError,
};
use mugshot_net::download::DEFAULT_DOWNLOAD_TIMEOUT;
use mugshot_net::{ImageDownloader, RedditCredentials, RedditFeed, XaiClient};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face analyzer: {0}")]
    Analyzer(#[from] mugshot_core::AnalyzerError),
    #[error("face swapper: {0}")]
    Swapper(#[from] mugshot_core::swapper::SwapperError),
    #[error("output store: {0}")]
    Store(#[from] mugshot_core::store::StoreError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Work the engine thread performs. Everything that touches the models or
/// blocking HTTP clients runs here, one request at a time.
pub trait Worker {
    fn generate(&mut self) -> Result<Generated, PipelineError>;
    fn pick(&mut self) -> Result<Option<CandidatePost>, UpstreamError>;
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Generate {
        reply: oneshot::Sender<Result<Generated, PipelineError>>,
    },
    Pick {
        reply: oneshot::Sender<Result<Option<CandidatePost>, UpstreamError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Find a meme with a face and swap the reference face into it.
    pub async fn generate(&self) -> Result<Result<Generated, PipelineError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Generate { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Rank current candidates and pick one.
    pub async fn pick(&self) -> Result<Result<Option<CandidatePost>, UpstreamError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Pick { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// The production worker: ONNX models, Reddit, xAI and the candidate cache.
pub struct MemeWorker {
    pipeline: Pipeline<RedditFeed, ImageDownloader, OnnxFaceAnalyzer, InSwapper>,
    source: CandidateSource<RedditFeed>,
    ranker: Ranker<XaiClient>,
    cache: MemeCache,
    pick_limit: usize,
}

impl MemeWorker {
    /// Load both models and build the HTTP clients. Fails fast if any model
    /// file is missing.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let analyzer =
            OnnxFaceAnalyzer::load(&config.scrfd_model_path(), &config.arcface_model_path())?;
        tracing::info!("face analyzer loaded");

        let swapper =
            InSwapper::load(&config.inswapper_model_path(), &config.inswapper_emap_path())?;
        tracing::info!("face swapper loaded");

        let credentials = RedditCredentials {
            client_id: config.reddit_client_id.clone(),
            client_secret: config.reddit_client_secret.clone(),
            user_agent: config.reddit_user_agent.clone(),
        };

        let locator = FaceLocator::new(
            RedditFeed::new(credentials.clone(), &config.subreddits)?,
            ImageDownloader::new(&config.reddit_user_agent, DEFAULT_DOWNLOAD_TIMEOUT)?,
            config.scan,
        );
        let pipeline = Pipeline::new(
            locator,
            FaceSubstitution::new(&config.reference_face_path),
            analyzer,
            swapper,
            mugshot_core::ArtifactStore::open(&config.output_dir)?,
        );

        if !config.reference_face_path.exists() {
            tracing::warn!(
                path = %config.reference_face_path.display(),
                "reference face not found; generate will fail until it exists"
            );
        }

        Ok(Self {
            pipeline,
            source: CandidateSource::new(RedditFeed::new(credentials, &config.subreddits)?)
                .with_min_score(config.feed_min_score),
            ranker: Ranker::new(XaiClient::new(
                config.xai_api_key.clone(),
                config.xai_model.clone(),
            )?),
            cache: MemeCache::new(config.cache_file.clone(), config.cache_ttl_secs),
            pick_limit: config.pick_limit,
        })
    }
}

impl Worker for MemeWorker {
    fn generate(&mut self) -> Result<Generated, PipelineError> {
        self.pipeline.generate()
    }

    fn pick(&mut self) -> Result<Option<CandidatePost>, UpstreamError> {
        if let Some(cached) = self.cache.load() {
            tracing::debug!(count = cached.len(), "using cached candidates");
            return Ok(self.ranker.pick_best(&cached));
        }

        let candidates = self.source.fetch(self.pick_limit)?;
        if !candidates.is_empty() {
            self.cache.save(&candidates);
        }
        Ok(self.ranker.pick_best(&candidates))
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The worker is moved onto the thread and never shared, so the models are
/// used by one request at a time.
pub fn spawn_engine<W: Worker + Send + 'static>(mut worker: W) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("mugshot-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Generate { reply } => {
                        let _ = reply.send(worker.generate());
                    }
                    EngineRequest::Pick { reply } => {
                        let _ = reply.send(worker.pick());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::DateTime;
    use mugshot_core::store::Artifact;
    use std::path::PathBuf;

    pub(crate) fn post(title: &str) -> CandidatePost {
        CandidatePost {
            source: "Reddit".into(),
            title: title.into(),
            url: "https://i.redd.it/a.jpg".into(),
            score: 1500,
            comments: 40,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            selection_reason: None,
        }
    }

    /// Worker with canned answers; counts calls.
    pub(crate) struct FakeWorker {
        pub found: bool,
        pub upstream_down: bool,
        pub calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl FakeWorker {
        pub(crate) fn new(found: bool) -> Self {
            Self { found, upstream_down: false, calls: Default::default() }
        }
    }

    impl Worker for FakeWorker {
        fn generate(&mut self) -> Result<Generated, PipelineError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.upstream_down {
                return Err(UpstreamError::Timeout { service: "reddit" }.into());
            }
            if !self.found {
                return Err(PipelineError::NotFound);
            }
            Ok(Generated {
                artifact: Artifact {
                    filename: "meme_1700000000000.png".into(),
                    path: PathBuf::from("/tmp/meme_1700000000000.png"),
                },
                post: post("Distracted boyfriend"),
                inspected: 3,
            })
        }

        fn pick(&mut self) -> Result<Option<CandidatePost>, UpstreamError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.upstream_down {
                return Err(UpstreamError::Timeout { service: "reddit" });
            }
            Ok(self.found.then(|| post("Drake").with_reason("faces")))
        }
    }

    #[tokio::test]
    async fn test_requests_round_trip_through_thread() {
        let worker = FakeWorker::new(true);
        let calls = worker.calls.clone();
        let handle = spawn_engine(worker).unwrap();

        let generated = handle.generate().await.unwrap().unwrap();
        assert_eq!(generated.artifact.filename, "meme_1700000000000.png");
        assert_eq!(generated.post.title, "Distracted boyfriend");

        let picked = handle.pick().await.unwrap().unwrap().unwrap();
        assert_eq!(picked.selection_reason.as_deref(), Some("faces"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_errors_are_returned_not_fatal() {
        let handle = spawn_engine(FakeWorker::new(false)).unwrap();
        let err = handle.generate().await.unwrap().unwrap_err();
        assert!(err.is_not_found());
        // Thread keeps serving after a failed request.
        assert!(handle.pick().await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_worker() {
        let worker = FakeWorker::new(true);
        let calls = worker.calls.clone();
        let handle = spawn_engine(worker).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.generate().await })
            })
            .collect();
        for t in tasks {
            assert!(t.await.unwrap().unwrap().is_ok());
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 8);
    }
}
