//! AI annotation collaborator.
//!
//! The annotator is a remote text-completion call: slow, fallible, and
//! possibly unconfigured. A deterministic local fallback string keeps the
//! pipeline flowing whatever the collaborator does.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use game_session::engine::EngineEvaluation;

use crate::error::ReviewError;
use crate::metrics::Severity;
use crate::review::{GameReview, ReviewItem};

#[derive(Debug, Serialize)]
pub struct AnnotationRequest<'a> {
    pub position: &'a str,
    #[serde(rename = "move")]
    pub played: &'a str,
    pub evaluation: i32,
    pub best_move: &'a str,
    pub principal_variation: &'a [String],
    pub centipawn_loss: i32,
}

#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, req: &AnnotationRequest<'_>) -> Result<String, ReviewError>;
}

/// HTTP annotator posting the request as JSON and expecting `{"text": ...}`.
pub struct HttpAnnotator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAnnotator {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl Annotator for HttpAnnotator {
    async fn annotate(&self, req: &AnnotationRequest<'_>) -> Result<String, ReviewError> {
        let mut request = self.client.post(&self.endpoint).json(req);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        body.get("text")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| ReviewError::Annotation("response had no text field".into()))
    }
}

/// Deterministic comment used when the collaborator fails or is not
/// configured.
pub fn fallback_comment(item: &ReviewItem, best_move: &str) -> String {
    let pawns = f64::from(item.centipawn_change) / 100.0;
    match item.severity {
        Severity::Blunder => format!(
            "{} loses about {:.1} pawns of evaluation; {} was much stronger.",
            item.san, pawns, best_move
        ),
        Severity::Mistake => format!(
            "{} gives up around {:.1} pawns; consider {} instead.",
            item.san, pawns, best_move
        ),
        Severity::Inaccuracy => format!(
            "{} is slightly imprecise; {} keeps more of the position.",
            item.san, best_move
        ),
        Severity::None => format!("{} is a reasonable move.", item.san),
    }
}

/// Annotate the selected (budgeted) items in place. Never fails: each item
/// either gets the collaborator's text or the fallback.
pub async fn annotate_selected(
    review: &mut GameReview,
    fens: &[String],
    evals: &[EngineEvaluation],
    annotator: Option<&dyn Annotator>,
) {
    for item in review.items.iter_mut().filter(|it| it.will_use_ai) {
        let eval = &evals[item.ply];
        let fen = fens.get(item.ply).map(String::as_str).unwrap_or("");
        let req = AnnotationRequest {
            position: fen,
            played: &item.san,
            evaluation: item.eval_after.unwrap_or(item.eval_before),
            best_move: &eval.best_move,
            principal_variation: &eval.principal_variation,
            centipawn_loss: item.centipawn_change,
        };
        let comment = match annotator {
            Some(a) => match a.annotate(&req).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(ply = item.ply, error = %e, "annotation failed, using fallback");
                    fallback_comment(item, &eval.best_move)
                }
            },
            None => fallback_comment(item, &eval.best_move),
        };
        item.comment = Some(comment);
    }
}
