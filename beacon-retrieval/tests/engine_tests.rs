//! End-to-end engine tests over deterministic embedding and geocoding
//! fakes: catalog ingestion, hybrid ranking, location handling, and the
//! degradation paths.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use beacon_retrieval::{
    EmbeddingProvider, GeoPoint, GeocodeError, Geocoder, Result, RetrievalConfig, RetrievalEngine,
    RetrievalError,
};

const NEWARK: GeoPoint = GeoPoint { latitude: 40.7357, longitude: -74.1724 };

/// Embeds text onto four keyword axes, L2-normalized. Deterministic, so
/// rankings are reproducible across runs.
struct KeywordEmbedder;

const KEYWORDS: [&str; 4] = ["food", "shelter", "crisis", "legal"];

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let mut vector = vec![0.0f32; KEYWORDS.len()];
        for (axis, keyword) in KEYWORDS.iter().enumerate() {
            vector[axis] = lowered.matches(keyword).count() as f32;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len()
    }

    fn model_id(&self) -> &str {
        "keyword-axes-v1"
    }
}

/// Resolves a fixed set of place names and counts outbound requests.
struct StaticGeocoder {
    calls: AtomicUsize,
    places: HashMap<String, GeoPoint>,
}

impl StaticGeocoder {
    fn newark_only() -> Self {
        let mut places = HashMap::new();
        places.insert("newark".to_string(), NEWARK);
        Self { calls: AtomicUsize::new(0), places }
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, location: &str) -> std::result::Result<Option<GeoPoint>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.places.get(&location.trim().to_lowercase()).copied())
    }
}

/// Always fails at the transport layer.
struct BrokenGeocoder;

#[async_trait]
impl Geocoder for BrokenGeocoder {
    async fn geocode(&self, _location: &str) -> std::result::Result<Option<GeoPoint>, GeocodeError> {
        Err(GeocodeError::Transport("connection refused".into()))
    }
}

/// Six-row catalog: two equally food-matched resources (one close, one
/// beyond the radius), a shelter, a virtual crisis line, a legal clinic
/// with no coordinates, and a non-virtual crisis center.
fn write_catalog_csv(dir: &Path) -> PathBuf {
    let path = dir.join("cspnj_resources.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "service,description,url,phone,latitude,longitude,virtual").unwrap();
    for row in [
        "South Food Pantry,food assistance weekly,https://south.example.org,856-555-0103,39.9526,-75.1652,",
        "Community FoodBank,food pantry and groceries,https://cfb.example.org,973-555-0100,40.7357,-74.1724,",
        "Hope Shelter,emergency shelter beds,https://hope.example.org,973-555-0101,40.7000,-74.2000,",
        "NJ Crisis Line,crisis hotline statewide,https://crisis.example.org,988,,,true",
        "Legal Aid Society,free legal aid clinic,https://legal.example.org,973-555-0102,,,",
        "Crisis Counseling Center,walk in crisis support,https://ccc.example.org,973-555-0104,,,",
    ] {
        writeln!(file, "{row}").unwrap();
    }
    path
}

fn engine_with(
    dir: &Path,
    geocoder: Option<Arc<dyn Geocoder>>,
) -> (RetrievalEngine, Arc<StaticGeocoder>) {
    let static_geocoder = Arc::new(StaticGeocoder::newark_only());
    let geocoder = geocoder.unwrap_or_else(|| static_geocoder.clone());
    let engine = RetrievalEngine::builder()
        .config(RetrievalConfig::default())
        .embedding_provider(Arc::new(KeywordEmbedder))
        .geocoder(geocoder)
        .resource_catalog("cspnj", write_catalog_csv(dir))
        .unwrap()
        .build()
        .unwrap();
    (engine, static_geocoder)
}

#[tokio::test]
async fn newark_food_query_ranks_five_results_with_distances() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, geocoder) = engine_with(dir.path(), None);

    let results = engine
        .search_resources("I need food for my family", "cspnj", Some("Newark"), Some(5))
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);

    // Sorted by descending final score.
    for pair in results.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }

    // The Newark food bank beats the equally food-matched pantry beyond
    // the proximity radius.
    assert!(results[0].document.text.contains("Community FoodBank"));
    assert!(results[1].document.text.contains("South Food Pantry"));

    // Every non-virtual resource with known coordinates carries a distance.
    for result in &results {
        if !result.is_virtual && result.document.location.is_some() {
            assert!(result.distance_km.is_some(), "{} lacks a distance", result.document.id);
        }
    }
}

#[tokio::test]
async fn repeated_query_is_deterministic_and_geocodes_once() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, geocoder) = engine_with(dir.path(), None);

    let first = engine
        .search_resources("I need food for my family", "cspnj", Some("Newark"), Some(5))
        .await
        .unwrap();
    let second = engine
        .search_resources("I need food for my family", "cspnj", Some("Newark"), Some(5))
        .await
        .unwrap();

    assert_eq!(first, second);
    // The second query hits the geocode cache.
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_location_uses_the_virtual_boost_pathway() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _geocoder) = engine_with(dir.path(), None);

    let results =
        engine.search_resources("crisis support help", "cspnj", None, Some(6)).await.unwrap();

    for result in &results {
        assert_eq!(result.distance_km, None);
        if result.is_virtual {
            assert_eq!(result.geographic_score, 1.0);
        } else if result.document.location.is_none() {
            assert_eq!(result.geographic_score, 0.5);
        }
    }

    // The virtual crisis line and the walk-in center are equal semantic
    // matches; the virtual one must not rank below it.
    let line_rank =
        results.iter().position(|r| r.document.text.contains("NJ Crisis Line")).unwrap();
    let center_rank =
        results.iter().position(|r| r.document.text.contains("Crisis Counseling Center")).unwrap();
    assert!(line_rank < center_rank);
}

#[tokio::test]
async fn overfetch_lets_geography_promote_the_closer_match() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _geocoder) = engine_with(dir.path(), None);

    // k=1: the pantry beyond the radius is the first semantic candidate
    // (insertion order on a distance tie), but the over-fetched Newark
    // food bank wins on proximity.
    let results =
        engine.search_resources("food", "cspnj", Some("Newark"), Some(1)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].document.text.contains("Community FoodBank"));
}

#[tokio::test]
async fn truncation_respects_k_and_candidate_count() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _geocoder) = engine_with(dir.path(), None);

    let two = engine.search_resources("food", "cspnj", None, Some(2)).await.unwrap();
    assert_eq!(two.len(), 2);

    let all = engine.search_resources("food", "cspnj", None, Some(50)).await.unwrap();
    assert_eq!(all.len(), 6);

    let none = engine.search_resources("food", "cspnj", None, Some(0)).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn geocode_failure_degrades_instead_of_erroring() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _geocoder) = engine_with(dir.path(), Some(Arc::new(BrokenGeocoder)));

    let results = engine
        .search_resources("I need food for my family", "cspnj", Some("Newark"), Some(5))
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    for result in &results {
        assert_eq!(result.distance_km, None);
        let expected = if result.is_virtual { 1.0 } else { 0.5 };
        assert_eq!(result.geographic_score, expected);
    }
}

#[tokio::test]
async fn unknown_and_invalid_organizations_are_typed_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _geocoder) = engine_with(dir.path(), None);

    let err = engine.search_resources("food", "nowhere", None, None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::UnknownCatalog(_)));

    let err = engine.search_resources("food", "bad org!", None, None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidKey(_)));
}

#[tokio::test]
async fn empty_catalog_returns_an_empty_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "service,description,url,phone,latitude,longitude,virtual\n").unwrap();

    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(KeywordEmbedder))
        .resource_catalog("empty", path)
        .unwrap()
        .build()
        .unwrap();

    let results = engine.search_resources("food", "empty", None, None).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn missing_source_surfaces_as_a_build_error() {
    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(KeywordEmbedder))
        .resource_catalog("cspnj", "/nonexistent/cspnj.csv")
        .unwrap()
        .build()
        .unwrap();

    let err = engine.search_resources("food", "cspnj", None, None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Build { .. }));
}

#[tokio::test]
async fn guidance_search_returns_article_texts() {
    let dir = tempfile::tempdir().unwrap();
    let guidance = dir.path().join("crisis");
    std::fs::create_dir_all(&guidance).unwrap();
    std::fs::write(guidance.join("deescalation.txt"), "Steps for crisis deescalation.\n").unwrap();
    std::fs::write(guidance.join("hotlines.txt"), "When to hand off to a crisis hotline.\n")
        .unwrap();
    std::fs::write(guidance.join("housing.txt"), "Finding emergency shelter placements.\n")
        .unwrap();

    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(KeywordEmbedder))
        .guidance_catalog("crisis", guidance)
        .unwrap()
        .build()
        .unwrap();

    let texts = engine.search_guidance("crisis support", "crisis", Some(2)).await.unwrap();
    assert_eq!(texts.len(), 2);
    for text in &texts {
        assert!(text.starts_with("Article: "), "got {text}");
        assert!(text.to_lowercase().contains("crisis"));
    }

    let err = engine.search_guidance("anything", "housing", None).await.unwrap_err();
    assert!(matches!(err, RetrievalError::UnknownCatalog(_)));
}

#[tokio::test]
async fn scores_stay_within_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _geocoder) = engine_with(dir.path(), None);

    for location in [Some("Newark"), None] {
        let results =
            engine.search_resources("food shelter crisis legal", "cspnj", location, Some(6)).await.unwrap();
        for result in &results {
            assert!(result.semantic_score > 0.0 && result.semantic_score <= 1.0);
            assert!((0.0..=1.0).contains(&result.geographic_score));
            assert!((0.0..=1.0).contains(&result.final_score));
        }
    }
}
