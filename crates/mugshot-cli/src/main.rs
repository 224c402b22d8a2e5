use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mugshot_core::locator::ScanOutcome;
use mugshot_core::{
    ArtifactStore, CandidateSource, FaceAnalyzer, FaceLocator, FaceSubstitution, InSwapper,
    OnnxFaceAnalyzer, Pipeline, Ranker, ScanOptions,
};
use mugshot_net::download::DEFAULT_DOWNLOAD_TIMEOUT;
use mugshot_net::{ImageDownloader, RedditCredentials, RedditFeed, XaiClient};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mugshot", version, about = "Face-swapped meme generator")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    /// Directory containing the ONNX model files
    #[arg(long, global = true, env = "MUGSHOT_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Image holding the face to insert
    #[arg(long, global = true, env = "REFERENCE_FACE_PATH", default_value = "reference_face.jpg")]
    reference: PathBuf,

    /// Subreddits joined with '+'
    #[arg(long, global = true, env = "MUGSHOT_SUBREDDITS", default_value = "memes+dankmemes")]
    subreddits: String,

    #[arg(long, global = true, env = "REDDIT_CLIENT_ID", hide_env_values = true)]
    reddit_client_id: Option<String>,

    #[arg(long, global = true, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    reddit_client_secret: Option<String>,

    #[arg(long, global = true, env = "REDDIT_USER_AGENT")]
    reddit_user_agent: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Find a meme with a face, swap the reference face in, save the result
    Generate {
        /// Output directory
        #[arg(short, long, env = "MUGSHOT_OUTPUT_DIR", default_value = "static/output")]
        output: PathBuf,
        /// Posts to inspect
        #[arg(long, env = "MUGSHOT_SCAN_LIMIT", default_value_t = mugshot_core::locator::DEFAULT_SCAN_LIMIT)]
        limit: usize,
        /// Minimum face area in pixels
        #[arg(long, env = "MUGSHOT_MIN_FACE_AREA", default_value_t = mugshot_core::locator::DEFAULT_MIN_FACE_AREA)]
        min_face_area: f32,
        /// Skip posts scoring below this
        #[arg(long, env = "MUGSHOT_SCAN_MIN_SCORE", default_value_t = mugshot_core::locator::DEFAULT_SCAN_MIN_SCORE)]
        min_score: i64,
    },
    /// Run the face search only and print what each post was judged
    Scan {
        #[arg(long, env = "MUGSHOT_SCAN_LIMIT", default_value_t = mugshot_core::locator::DEFAULT_SCAN_LIMIT)]
        limit: usize,
        #[arg(long, env = "MUGSHOT_MIN_FACE_AREA", default_value_t = mugshot_core::locator::DEFAULT_MIN_FACE_AREA)]
        min_face_area: f32,
        /// Skip posts scoring below this
        #[arg(long, env = "MUGSHOT_SCAN_MIN_SCORE", default_value_t = mugshot_core::locator::DEFAULT_SCAN_MIN_SCORE)]
        min_score: i64,
    },
    /// Rank trending memes and print the pick
    Pick {
        /// Candidates offered to the ranker
        #[arg(long, env = "MUGSHOT_PICK_LIMIT", default_value_t = 12)]
        limit: usize,
        /// Only posts scoring above this are ranked
        #[arg(long, env = "MUGSHOT_FEED_MIN_SCORE", default_value_t = mugshot_core::source::DEFAULT_MIN_SCORE)]
        min_score: i64,
        #[arg(long, env = "XAI_API_KEY", hide_env_values = true)]
        xai_api_key: String,
        #[arg(long, env = "XAI_MODEL", default_value = mugshot_net::xai::DEFAULT_MODEL)]
        xai_model: String,
    },
    /// Detect faces in a local image
    Detect {
        image: PathBuf,
    },
    /// Swap the reference face into a local image
    Swap {
        target: PathBuf,
        #[arg(short, long, default_value = "swapped.png")]
        output: PathBuf,
    },
    /// Query a running daemon's health
    Status {
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        url: String,
    },
}

impl Settings {
    fn model_path(&self, name: &str) -> String {
        self.model_dir
            .clone()
            .unwrap_or_else(mugshot_core::default_model_dir)
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    fn analyzer(&self) -> Result<OnnxFaceAnalyzer> {
        OnnxFaceAnalyzer::load(
            &self.model_path("buffalo_l/det_10g.onnx"),
            &self.model_path("buffalo_l/w600k_r50.onnx"),
        )
        .context("loading face analyzer")
    }

    fn swapper(&self) -> Result<InSwapper> {
        InSwapper::load(
            &self.model_path("inswapper_128.onnx"),
            &self.model_path("inswapper_128.emap"),
        )
        .context("loading face swapper")
    }

    fn user_agent(&self) -> String {
        self.reddit_user_agent
            .clone()
            .unwrap_or_else(|| concat!("mugshot/", env!("CARGO_PKG_VERSION")).to_string())
    }

    fn reddit(&self) -> Result<RedditFeed> {
        let (Some(client_id), Some(client_secret)) =
            (self.reddit_client_id.clone(), self.reddit_client_secret.clone())
        else {
            bail!("REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET must be set");
        };
        let credentials = RedditCredentials {
            client_id,
            client_secret,
            user_agent: self.user_agent(),
        };
        Ok(RedditFeed::new(credentials, &self.subreddits)?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // .env must be loaded before clap reads env-backed arguments.
    let _ = dotenv::dotenv();
    let cli = Cli::parse();
    let settings = &cli.settings;

    match cli.command {
        Commands::Generate { output, limit, min_face_area, min_score } => {
            let options = ScanOptions { scan_limit: limit, min_score, min_face_area };
            let locator = FaceLocator::new(
                settings.reddit()?,
                ImageDownloader::new(&settings.user_agent(), DEFAULT_DOWNLOAD_TIMEOUT)?,
                options,
            );
            let mut pipeline = Pipeline::new(
                locator,
                FaceSubstitution::new(&settings.reference),
                settings.analyzer()?,
                settings.swapper()?,
                ArtifactStore::open(&output)?,
            );

            let generated = pipeline.generate()?;
            println!("Meme:    {} (score {})", generated.post.title, generated.post.score);
            println!("Source:  {}", generated.post.url);
            println!("Scanned: {} posts", generated.inspected);
            println!("Saved:   {}", generated.artifact.path.display());
        }
        Commands::Scan { limit, min_face_area, min_score } => {
            let options = ScanOptions { scan_limit: limit, min_score, min_face_area };
            let mut locator = FaceLocator::new(
                settings.reddit()?,
                ImageDownloader::new(&settings.user_agent(), DEFAULT_DOWNLOAD_TIMEOUT)?,
                options,
            );
            let mut analyzer = settings.analyzer()?;
            let report = locator.find_with_face(&mut analyzer)?;

            for entry in &report.entries {
                println!("{:<60.60}  {}", entry.title, describe(&entry.outcome));
            }
            println!("{} inspected, {} skipped", report.entries.len(), report.skipped());
            match report.found {
                Some(found) => println!("Match: {} ({})", found.post.title, found.post.url),
                None => println!("No suitable meme with face found"),
            }
        }
        Commands::Pick { limit, min_score, xai_api_key, xai_model } => {
            let mut source = CandidateSource::new(settings.reddit()?).with_min_score(min_score);
            let ranker = Ranker::new(XaiClient::new(xai_api_key, xai_model)?);

            match mugshot_core::pick(&mut source, &ranker, limit.max(1))? {
                Some(post) => println!("{}", serde_json::to_string_pretty(&post)?),
                None => println!("No memes available"),
            }
        }
        Commands::Detect { image } => {
            let img = open_rgb(&image)?;
            let mut analyzer = settings.analyzer()?;
            let faces = analyzer.detect(&img)?;

            println!("{}: {}x{}, {} face(s)", image.display(), img.width(), img.height(), faces.len());
            for (i, face) in faces.iter().enumerate() {
                let b = &face.bbox;
                println!(
                    "  [{i}] x={:.0} y={:.0} {:.0}x{:.0} area={:.0} conf={:.3}",
                    b.x,
                    b.y,
                    b.width,
                    b.height,
                    face.area(),
                    b.confidence
                );
            }
            if let Some(largest) = mugshot_core::types::largest_face(&faces) {
                let verdict = if largest.area() >= mugshot_core::locator::DEFAULT_MIN_FACE_AREA {
                    "usable"
                } else {
                    "too small"
                };
                println!("Largest face: {:.0} px ({verdict})", largest.area());
            }
        }
        Commands::Swap { target, output } => {
            let img = open_rgb(&target)?;
            let mut analyzer = settings.analyzer()?;
            let mut swapper = settings.swapper()?;

            let swapped = FaceSubstitution::new(&settings.reference).swap(
                &mut analyzer,
                &mut swapper,
                &img,
            )?;
            swapped
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Saved: {}", output.display());
        }
        Commands::Status { url } => {
            let health = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?
                .get(format!("{}/health", url.trim_end_matches('/')))
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json::<serde_json::Value>());

            match health {
                Ok(body) => println!(
                    "mugshotd: {} (version {})",
                    body["status"].as_str().unwrap_or("unknown"),
                    body["version"].as_str().unwrap_or("unknown")
                ),
                Err(e) => println!("mugshotd: not reachable at {url} ({e})"),
            }
        }
    }

    Ok(())
}

fn open_rgb(path: &Path) -> Result<image::RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgb8())
}

fn describe(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Accepted { face_area } => format!("accepted (face {face_area:.0} px)"),
        ScanOutcome::Skipped(reason) => format!("skipped: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mugshot_core::locator::SkipReason;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["mugshot", "swap", "in.jpg", "-o", "out.png", "--reference", "me.jpg"])
            .unwrap();
        assert_eq!(cli.settings.reference, PathBuf::from("me.jpg"));
        match cli.command {
            Commands::Swap { target, output } => {
                assert_eq!(target, PathBuf::from("in.jpg"));
                assert_eq!(output, PathBuf::from("out.png"));
            }
            _ => panic!("expected swap"),
        }

        let cli = Cli::try_parse_from(["mugshot", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { ref url } if url == "http://127.0.0.1:5000"));
    }

    #[test]
    fn test_min_score_flags() {
        let cli = Cli::try_parse_from(["mugshot", "scan", "--min-score", "42"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { min_score: 42, .. }));

        let cli = Cli::try_parse_from(["mugshot", "pick", "--xai-api-key", "k", "--min-score", "7"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Pick { min_score: 7, .. }));

        let cli = Cli::try_parse_from(["mugshot", "generate", "--min-score", "900"]).unwrap();
        assert!(matches!(cli.command, Commands::Generate { min_score: 900, .. }));
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(
            describe(&ScanOutcome::Accepted { face_area: 12000.4 }),
            "accepted (face 12000 px)"
        );
        assert_eq!(describe(&ScanOutcome::Skipped(SkipReason::Nsfw)), "skipped: nsfw");
    }
}
