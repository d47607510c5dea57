//! Cache semantics exercised through the controller and the cache surface.

mod common;

use common::*;
use lingua_relay::{
    AdaptiveConfig, AdaptiveController, ContentType, TranslationPreference, TranslationRequest,
};
use std::sync::Arc;

#[tokio::test]
async fn quality_preference_round_trips_through_the_optimized_level() {
    // Echo translator: the optimizer runs (score < 0.85) but never wins, so
    // the semantic translation is cached at the optimized level.
    let controller = AdaptiveController::new(
        AdaptiveConfig::default(),
        PhraseTableTranslator::new(&[("Hello, world!", "Bonjour, le monde !")]),
        None,
        None,
    );

    let request = TranslationRequest::new("Hello, world!", "en", "fr")
        .with_preference(TranslationPreference::Quality);

    let first = controller.translate(request.clone()).await.unwrap();
    assert!(!first.cache_hit);

    let second = controller.translate(request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.translation, first.translation);
}

#[tokio::test]
async fn invalidation_forces_a_fresh_translation() {
    let controller = AdaptiveController::new(
        AdaptiveConfig::default(),
        PhraseTableTranslator::new(&[("Hello, world!", "Bonjour, le monde !")]),
        None,
        Some(Arc::new(MemoryKv::default()) as _),
    );

    let request = TranslationRequest::new("Hello, world!", "en", "fr")
        .with_preference(TranslationPreference::Fast);
    controller.translate(request.clone()).await.unwrap();
    assert!(controller.translate(request.clone()).await.unwrap().cache_hit);

    controller.invalidate("en", "fr", None).await;
    assert!(!controller.translate(request).await.unwrap().cache_hit);
}

#[tokio::test]
async fn content_type_scoped_invalidation_leaves_other_keys_alone() {
    let controller = AdaptiveController::new(
        AdaptiveConfig::default(),
        PhraseTableTranslator::new(&[]),
        None,
        None,
    );

    let request = TranslationRequest::new("Hello, world!", "en", "fr")
        .with_preference(TranslationPreference::Fast);
    controller.translate(request.clone()).await.unwrap();

    // Controller keys carry no content type, so a type-scoped invalidation
    // must not remove them.
    controller
        .invalidate("en", "fr", Some(ContentType::Technical))
        .await;
    assert!(controller.translate(request).await.unwrap().cache_hit);
}

#[tokio::test]
async fn warmed_cache_serves_hits_with_recomputed_metrics() {
    let controller = AdaptiveController::new(
        AdaptiveConfig::default(),
        Arc::new(FailingTranslator),
        None,
        None,
    );

    controller
        .warm_cache(vec![(
            "Hello, world!".to_string(),
            "en".to_string(),
            "fr".to_string(),
            "Bonjour, le monde !".to_string(),
        )])
        .await;

    // The translator is dead, so only the warmed entry can answer.
    let result = controller
        .translate(
            TranslationRequest::new("Hello, world!", "en", "fr")
                .with_preference(TranslationPreference::Fast),
        )
        .await
        .unwrap();

    assert!(result.cache_hit);
    assert_eq!(result.translation, "Bonjour, le monde !");
    // Warm writes carry no metrics; the controller recomputes them.
    assert!(result.quality_metrics.overall_score > 0.0);
    assert_eq!(result.chunking_result.chunks.len(), 1);
}

#[tokio::test]
async fn similar_query_reuses_a_cached_translation() {
    // Embeddings: the two cat sentences sit 0.95 apart, the dog sentence is
    // orthogonal to both.
    let embedder = TableEmbedder::new(&[
        ("The cat sat on the mat.", vec![1.0, 0.0, 0.0, 0.0]),
        (
            "The cat sat on the mat!",
            vec![0.95, (1.0f32 - 0.95 * 0.95).sqrt(), 0.0, 0.0],
        ),
        ("The dog slept by the door.", vec![0.0, 0.0, 1.0, 0.0]),
    ]);

    let controller = AdaptiveController::new(
        AdaptiveConfig::default(),
        PhraseTableTranslator::new(&[
            ("The cat sat on the mat.", "Le chat etait assis sur le tapis."),
            ("The dog slept by the door.", "Le chien dormait pres de la porte."),
        ]),
        Some(embedder),
        None,
    );

    controller
        .translate(
            TranslationRequest::new("The cat sat on the mat.", "en", "fr")
                .with_preference(TranslationPreference::Fast),
        )
        .await
        .unwrap();

    // Near-identical query: served from the cache without a translator call.
    let similar = controller
        .translate(
            TranslationRequest::new("The cat sat on the mat!", "en", "fr")
                .with_preference(TranslationPreference::Fast),
        )
        .await
        .unwrap();
    assert!(similar.cache_hit);
    assert_eq!(similar.translation, "Le chat etait assis sur le tapis.");

    // Unrelated query: translated fresh.
    let unrelated = controller
        .translate(
            TranslationRequest::new("The dog slept by the door.", "en", "fr")
                .with_preference(TranslationPreference::Fast),
        )
        .await
        .unwrap();
    assert!(!unrelated.cache_hit);
    assert_eq!(unrelated.translation, "Le chien dormait pres de la porte.");
}

#[tokio::test]
async fn l2_survives_l1_eviction() {
    let config = AdaptiveConfig {
        cache_l1_capacity: 1,
        ..Default::default()
    };
    let controller = AdaptiveController::new(
        config,
        PhraseTableTranslator::new(&[("first text", "premier texte"), ("second text", "deuxieme texte")]),
        None,
        Some(Arc::new(MemoryKv::default()) as _),
    );

    let first = TranslationRequest::new("first text", "en", "fr")
        .with_preference(TranslationPreference::Fast);
    let second = TranslationRequest::new("second text", "en", "fr")
        .with_preference(TranslationPreference::Fast);

    controller.translate(first.clone()).await.unwrap();
    // Evicts "first text" from the single-slot L1.
    controller.translate(second).await.unwrap();

    let revived = controller.translate(first).await.unwrap();
    assert!(revived.cache_hit, "entry should come back from L2");
    assert_eq!(revived.translation, "premier texte");
}

#[tokio::test]
async fn cache_statistics_reflect_traffic() {
    let controller = AdaptiveController::new(
        AdaptiveConfig::default(),
        PhraseTableTranslator::new(&[]),
        None,
        None,
    );

    let request = TranslationRequest::new("Hello, world!", "en", "fr")
        .with_preference(TranslationPreference::Fast);
    controller.translate(request.clone()).await.unwrap();
    controller.translate(request).await.unwrap();

    let stats = controller.cache_stats().await;
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    assert_eq!(stats.l1_entries, 1);
    assert!(!stats.l2_available);
}
