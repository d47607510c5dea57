//! Progressive update ordering and sink failure tolerance.

mod common;

use common::*;
use anyhow::bail;
use async_trait::async_trait;
use lingua_relay::{
    AdaptiveConfig, AdaptiveController, ProgressSink, TranslationPreference, TranslationRequest,
    TranslationStage, TranslationUpdate,
};
use std::sync::Arc;

fn controller_with(translator: Arc<dyn lingua_relay::Translator>) -> AdaptiveController {
    AdaptiveController::new(AdaptiveConfig::default(), translator, None, None)
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<TranslationUpdate>) -> Vec<TranslationUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn fast_path_emits_semantic_and_analyzing_stages_in_order() {
    let controller =
        controller_with(PhraseTableTranslator::new(&[("Hello, world!", "Bonjour, le monde !")]));
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);

    let result = controller
        .progressive_translate(
            TranslationRequest::new("Hello, world!", "en", "fr")
                .with_preference(TranslationPreference::Fast),
            &tx,
        )
        .await
        .unwrap();
    assert_eq!(result.translation, "Bonjour, le monde !");

    let updates = drain(&mut rx);
    let stages: Vec<TranslationStage> = updates.iter().map(|u| u.stage).collect();
    assert_eq!(
        stages,
        vec![
            TranslationStage::Semantic,  // starting
            TranslationStage::Semantic,  // post-translation
            TranslationStage::Analyzing, // scoring
            TranslationStage::Semantic,  // final, no optimization
        ]
    );

    // All updates belong to the same request and progress never regresses.
    let request_id = updates[0].request_id;
    assert!(updates.iter().all(|u| u.request_id == request_id));
    for pair in updates.windows(2) {
        assert!(pair[0].progress <= pair[1].progress);
    }

    // The post-translation update carries the translation and chunking.
    assert_eq!(updates[1].translation.as_deref(), Some("Bonjour, le monde !"));
    assert!(updates[1].chunking_result.is_some());
    // The final update carries quality metrics.
    assert!(updates[3].quality_metrics.is_some());
    assert_eq!(updates[3].progress, 1.0);
}

#[tokio::test]
async fn optimizing_stages_appear_when_the_gate_trips() {
    let controller = controller_with(PhraseTableTranslator::new(&[]));
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);

    controller
        .progressive_translate(
            TranslationRequest::new("A short sentence to improve.", "en", "fr")
                .with_preference(TranslationPreference::Balanced)
                .with_force_optimization(true),
            &tx,
        )
        .await
        .unwrap();

    let stages: Vec<TranslationStage> = drain(&mut rx).iter().map(|u| u.stage).collect();
    assert_eq!(
        stages,
        vec![
            TranslationStage::Semantic,
            TranslationStage::Semantic,
            TranslationStage::Analyzing,
            TranslationStage::Optimizing,
            TranslationStage::Optimized,
        ]
    );
}

#[tokio::test]
async fn cache_hit_emits_a_terminal_semantic_update() {
    let controller =
        controller_with(PhraseTableTranslator::new(&[("Hello, world!", "Bonjour, le monde !")]));
    let request = TranslationRequest::new("Hello, world!", "en", "fr")
        .with_preference(TranslationPreference::Fast);
    controller.translate(request.clone()).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let result = controller.progressive_translate(request, &tx).await.unwrap();
    assert!(result.cache_hit);

    let updates = drain(&mut rx);
    assert_eq!(updates.len(), 2); // starting + cache-hit terminal
    assert_eq!(updates[1].stage, TranslationStage::Semantic);
    assert_eq!(updates[1].progress, 1.0);
    assert_eq!(updates[1].status_message, "retrieved from cache");
}

#[tokio::test]
async fn pipeline_failure_emits_a_terminal_error_update() {
    let controller = controller_with(Arc::new(FailingTranslator));
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);

    let err = controller
        .progressive_translate(
            TranslationRequest::new("doomed text", "en", "fr"),
            &tx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, lingua_relay::CoreError::UpstreamUnavailable { .. }));

    let updates = drain(&mut rx);
    let last = updates.last().expect("at least the error update");
    assert_eq!(last.stage, TranslationStage::Error);
    assert!(last.status_message.contains("translation failed"));
}

/// Sink that always fails; the pipeline must not care.
struct BrokenSink;

#[async_trait]
impl ProgressSink for BrokenSink {
    async fn emit(&self, _update: TranslationUpdate) -> anyhow::Result<()> {
        bail!("sink is broken")
    }
}

#[tokio::test]
async fn a_failing_sink_never_aborts_the_pipeline() {
    let controller =
        controller_with(PhraseTableTranslator::new(&[("Hello, world!", "Bonjour, le monde !")]));

    let result = controller
        .progressive_translate(
            TranslationRequest::new("Hello, world!", "en", "fr")
                .with_preference(TranslationPreference::Fast),
            &BrokenSink,
        )
        .await
        .unwrap();

    assert_eq!(result.translation, "Bonjour, le monde !");
}
