//! HTTP boundary.

use crate::engine::EngineHandle;
use actix_web::{
    web::{self, Data, Path},
    HttpResponse,
};
use mugshot_core::ArtifactStore;
use serde::Serialize;
use serde_json::json;

/// Public prefix under which stored artifacts are served.
pub const OUTPUT_ROUTE: &str = "/static/output";

pub struct AppState {
    pub engine: EngineHandle,
    pub store: ArtifactStore,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    success: bool,
    image_url: String,
    meme_title: String,
    meme_score: i64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/generate").route(web::post().to(generate)))
        .service(web::resource("/meme").route(web::get().to(meme)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource(format!("{OUTPUT_ROUTE}/{{file}}")).route(web::get().to(artifact)));
}

fn error_body(reason: impl std::fmt::Display) -> serde_json::Value {
    json!({ "error": reason.to_string() })
}

async fn generate(state: Data<AppState>) -> HttpResponse {
    tracing::info!("generate requested");
    match state.engine.generate().await {
        Ok(Ok(generated)) => HttpResponse::Ok().json(GenerateResponse {
            success: true,
            image_url: format!("{OUTPUT_ROUTE}/{}", generated.artifact.filename),
            meme_title: generated.post.title,
            meme_score: generated.post.score,
        }),
        Ok(Err(e)) if e.is_not_found() => {
            tracing::info!("no meme with a usable face");
            HttpResponse::NotFound().json(error_body(e))
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "generate failed");
            HttpResponse::InternalServerError().json(error_body(e))
        }
        Err(e) => {
            tracing::error!(error = %e, "engine unavailable");
            HttpResponse::InternalServerError().json(error_body(e))
        }
    }
}

async fn meme(state: Data<AppState>) -> HttpResponse {
    match state.engine.pick().await {
        Ok(Ok(Some(post))) => HttpResponse::Ok().json(post),
        Ok(Ok(None)) => HttpResponse::NotFound().json(error_body("No memes available")),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "pick failed");
            HttpResponse::InternalServerError().json(error_body(e))
        }
        Err(e) => {
            tracing::error!(error = %e, "engine unavailable");
            HttpResponse::InternalServerError().json(error_body(e))
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn artifact(state: Data<AppState>, file: Path<String>) -> HttpResponse {
    let Some(path) = state.store.resolve(&file) else {
        return HttpResponse::NotFound().finish();
    };
    match web::block(move || std::fs::read(path)).await {
        Ok(Ok(bytes)) => HttpResponse::Ok().content_type("image/png").body(bytes),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => HttpResponse::NotFound().finish(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "reading artifact failed");
            HttpResponse::InternalServerError().finish()
        }
        Err(e) => {
            tracing::error!(error = %e, "blocking pool error");
            HttpResponse::InternalServerError().finish()
        }
    }
}
