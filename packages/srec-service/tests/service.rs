use std::{
	fs,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use srec_config::{Config, EmbeddingProviderConfig};
use srec_domain::{
	EmbedSource, Filter, Metadata, MetadataValue, NewsRecord, Predicate, StockRecord,
};
use srec_service::{
	BoxFuture, EmbeddingProvider, Error, ErrorKind, Providers, RecommendRequest,
	RecommendService, Result, UpsertItemRequest,
};
use srec_storage::{DeleteOutcome, UpsertOutcome};
use srec_testkit::TestDir;

/// Sets one axis per known word found in the text.
struct SpyEmbedding {
	calls: Arc<AtomicUsize>,
}
impl SpyEmbedding {
	fn new() -> Self {
		Self { calls: Arc::new(AtomicUsize::new(0)) }
	}

	fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for SpyEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = sources.iter().map(|source| axis_vector(&source.text())).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

struct SlowEmbedding;
impl EmbeddingProvider for SlowEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			tokio::time::sleep(Duration::from_millis(500)).await;

			Ok(vec![vec![1.0, 0.0, 0.0]; sources.len()])
		})
	}
}

struct FailingEmbedding;
impl EmbeddingProvider for FailingEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Err(Error::Embedding { message: "upstream returned 503".to_string() })
		})
	}
}

/// Succeeds on the first call, then fails every later one.
struct FlakyEmbedding {
	calls: AtomicUsize,
}
impl EmbeddingProvider for FlakyEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if call > 0 {
				return Err(Error::Embedding { message: "rate limited".to_string() });
			}

			Ok(vec![vec![1.0, 0.0, 0.0]; sources.len()])
		})
	}
}

struct WrongDimensionEmbedding;
impl EmbeddingProvider for WrongDimensionEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(vec![vec![1.0, 0.0]; sources.len()]) })
	}
}

fn axis_vector(text: &str) -> Vec<f32> {
	let text = text.to_lowercase();
	let mut vector = vec![0.0_f32; 3];

	for (axis, word) in ["battery", "bank", "game"].iter().enumerate() {
		if text.contains(word) {
			vector[axis] = 1.0;
		}
	}

	vector
}

fn test_config(dir: &TestDir, timeout_ms: u64, bootstrap: Option<&str>) -> Config {
	test_config_with_news(dir, timeout_ms, bootstrap, None)
}

fn test_config_with_news(
	dir: &TestDir,
	timeout_ms: u64,
	stocks: Option<&str>,
	news: Option<&str>,
) -> Config {
	let mut bootstrap = String::from("[bootstrap]\n");

	if let Some(path) = stocks {
		bootstrap.push_str(&format!("stock_data_path = {path:?}\n"));
	}
	if let Some(path) = news {
		bootstrap.push_str(&format!("news_data_path = {path:?}\n"));
	}

	let raw = format!(
		r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "info"

[storage]
path        = {path:?}
dimension   = 3
metric      = "cosine"
candidate_k = 10

[providers.embedding]
provider_id = "hashing"
dimensions  = 3

[recommend]
default_k          = 2
max_k              = 5
request_timeout_ms = {timeout_ms}

[cache]
enabled     = true
ttl_ms      = 60000
max_entries = 16

{bootstrap}
"#,
		path = dir.child("index").display().to_string(),
	);

	srec_config::parse(&raw).expect("Failed to parse test config.")
}

fn service_with(cfg: Config, embedding: Arc<dyn EmbeddingProvider>) -> RecommendService {
	let stores = srec_service::open_stores(&cfg).expect("Failed to open stores.");

	RecommendService::with_providers(cfg, stores, Providers::new(embedding))
}

fn stock(code: &str, name: &str, market: &str, description: &str) -> StockRecord {
	StockRecord {
		code: code.to_string(),
		name: name.to_string(),
		market: market.to_string(),
		industry: String::new(),
		description: description.to_string(),
		comments: Vec::new(),
		tags: Vec::new(),
		features: Default::default(),
	}
}

async fn seed_abc(service: &RecommendService) {
	for (id, vector) in
		[("A", vec![1.0, 0.0, 0.0]), ("B", vec![0.9, 0.1, 0.0]), ("C", vec![-1.0, 0.0, 0.0])]
	{
		service
			.upsert_item(UpsertItemRequest { id: id.to_string(), vector, metadata: Metadata::new() })
			.await
			.expect("Failed to upsert.");
	}
}

#[tokio::test]
async fn worked_example_ranks_a_then_b() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));

	seed_abc(&service).await;
	service.mark_ready();

	let response = service
		.recommend(RecommendRequest::vector(vec![1.0, 0.0, 0.0], Some(2)))
		.await
		.expect("Failed to recommend.");
	let ids: Vec<&str> = response.items.iter().map(|item| item.item_id.as_str()).collect();

	assert_eq!(ids, vec!["A", "B"]);
	assert!(!response.cache_hit);
	assert!(response.items[0].score >= response.items[1].score);
}

#[tokio::test]
async fn requests_before_ready_fail() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));
	let err = service
		.recommend(RecommendRequest::keyword("battery", None))
		.await
		.expect_err("Expected not ready.");

	assert_eq!(err.kind(), ErrorKind::NotReady);
}

#[tokio::test]
async fn identical_requests_are_served_from_cache() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let spy = Arc::new(SpyEmbedding::new());
	let service = service_with(test_config(&dir, 5_000, None), spy.clone());

	seed_abc(&service).await;
	service.mark_ready();

	let first = service
		.recommend(RecommendRequest::keyword("battery makers", Some(2)))
		.await
		.expect("Failed to recommend.");
	let second = service
		.recommend(RecommendRequest::keyword("  battery   makers ", Some(2)))
		.await
		.expect("Failed to recommend.");
	let stats = service.stats();

	assert!(!first.cache_hit);
	assert!(second.cache_hit);
	assert_eq!(first.items, second.items);
	assert_eq!(stats.rankings, 1);
	assert_eq!(stats.cache_hits, 1);
	assert_eq!(stats.cache_misses, 1);
	assert_eq!(spy.count(), 1);
}

#[tokio::test]
async fn writes_invalidate_cached_results() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));

	seed_abc(&service).await;
	service.mark_ready();

	let request = RecommendRequest::vector(vec![1.0, 0.0, 0.0], Some(1));
	let before = service.recommend(request.clone()).await.expect("Failed to recommend.");

	service
		.upsert_item(UpsertItemRequest {
			id: "Z".to_string(),
			vector: vec![1.0, 0.0, 0.0],
			metadata: Metadata::new(),
		})
		.await
		.expect("Failed to upsert.");

	let after = service.recommend(request).await.expect("Failed to recommend.");

	assert_eq!(before.items[0].item_id, "A");
	assert!(!after.cache_hit);
	assert_eq!(service.stats().rankings, 2);
	assert_eq!(after.items[0].item_id, "A");
}

#[tokio::test]
async fn slow_embedding_surfaces_timeout() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 50, None), Arc::new(SlowEmbedding));

	service.mark_ready();

	let err = service
		.recommend(RecommendRequest::keyword("battery", None))
		.await
		.expect_err("Expected timeout.");

	assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn embedding_failure_surfaces_embedding_error() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(FailingEmbedding));

	service.mark_ready();

	let err = service
		.recommend(RecommendRequest::keyword("battery", None))
		.await
		.expect_err("Expected embedding failure.");

	assert_eq!(err.kind(), ErrorKind::EmbeddingError);
}

#[tokio::test]
async fn wrong_dimension_embedding_is_rejected() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service =
		service_with(test_config(&dir, 5_000, None), Arc::new(WrongDimensionEmbedding));

	service.mark_ready();

	let err = service
		.recommend(RecommendRequest::keyword("battery", None))
		.await
		.expect_err("Expected dimension mismatch.");

	assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));

	service.mark_ready();

	let cases = [
		(RecommendRequest::default(), ErrorKind::InvalidRequest),
		(RecommendRequest::keyword("   ", None), ErrorKind::InvalidRequest),
		(RecommendRequest::keyword("battery", Some(0)), ErrorKind::InvalidRequest),
		(RecommendRequest::keyword("battery", Some(6)), ErrorKind::InvalidRequest),
		(RecommendRequest::vector(vec![1.0, 0.0], None), ErrorKind::DimensionMismatch),
		(RecommendRequest::vector(vec![1.0, f32::NAN, 0.0], None), ErrorKind::InvalidRequest),
		(
			RecommendRequest {
				keyword: Some("battery".to_string()),
				vector: Some(vec![1.0, 0.0, 0.0]),
				..Default::default()
			},
			ErrorKind::InvalidRequest,
		),
	];

	for (request, expected) in cases {
		let err = service.recommend(request).await.expect_err("Expected rejection.");

		assert_eq!(err.kind(), expected);
	}
}

#[tokio::test]
async fn empty_index_returns_an_empty_result() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));

	service.mark_ready();

	let response = service
		.recommend(RecommendRequest::keyword("battery", None))
		.await
		.expect("Failed to recommend.");

	assert!(response.items.is_empty());
}

#[tokio::test]
async fn stock_records_are_embedded_and_filterable() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));
	let records = vec![
		stock("373220", "LG Energy Solution", "KOSPI", "EV battery cells."),
		stock("247540", "EcoPro BM", "KOSDAQ", "Battery cathode materials."),
		stock("105560", "KB Financial", "KOSPI", "Retail bank holding company."),
		stock("247540", "EcoPro BM duplicate", "KOSDAQ", "Battery."),
	];
	let upserted = service.upsert_stocks(records).await.expect("Failed to upsert stocks.");

	assert_eq!(upserted.inserted, 3);

	service.mark_ready();

	let filters = Filter::new(vec![Predicate::Eq {
		field: "market".to_string(),
		value: MetadataValue::from("KOSPI"),
	}])
	.expect("valid filter");
	let response = service
		.recommend(RecommendRequest {
			keyword: Some("battery".to_string()),
			k: Some(1),
			filters,
			..Default::default()
		})
		.await
		.expect("Failed to recommend.");

	assert_eq!(response.items.len(), 1);
	assert_eq!(response.items[0].item_id, "373220");
	assert_eq!(response.items[0].metadata["name"], MetadataValue::from("LG Energy Solution"));
}

#[tokio::test]
async fn delete_and_get_item() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));

	seed_abc(&service).await;

	assert!(service.get_item("B").is_ok());
	assert_eq!(
		service.delete_item("B").await.expect("Failed to delete.").outcome,
		DeleteOutcome::Deleted
	);
	assert_eq!(
		service.delete_item("B").await.expect("Failed to delete.").outcome,
		DeleteOutcome::NotFound
	);

	let missing = service.get_item("B").expect_err("Expected missing item.");

	assert_eq!(missing.kind(), ErrorKind::NotFound);

	let err = service
		.upsert_item(UpsertItemRequest {
			id: "D".to_string(),
			vector: vec![1.0],
			metadata: Metadata::new(),
		})
		.await
		.expect_err("Expected dimension mismatch.");

	assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

	let again = service
		.upsert_item(UpsertItemRequest {
			id: "A".to_string(),
			vector: vec![1.0, 0.0, 0.0],
			metadata: Metadata::new(),
		})
		.await
		.expect("Failed to upsert.");

	assert_eq!(again.outcome, UpsertOutcome::Unchanged);
}

#[tokio::test]
async fn bootstrap_loads_only_into_an_empty_store() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let dataset = dir.child("stock_info.json");
	let records = vec![
		stock("373220", "LG Energy Solution", "KOSPI", "EV battery cells."),
		stock("105560", "KB Financial", "KOSPI", "Retail bank holding company."),
	];

	fs::write(&dataset, serde_json::to_vec(&records).expect("encode failed"))
		.expect("Failed to write dataset.");

	let cfg = test_config(&dir, 5_000, Some(&dataset.display().to_string()));
	let spy = Arc::new(SpyEmbedding::new());
	let service = service_with(cfg, spy.clone());

	assert!(!service.ready());

	let report = service.initialize().await.stocks.expect("Bootstrap ran.");

	assert!(service.ready());
	assert!(!report.skipped);
	assert_eq!(report.upserted.inserted, 2);
	assert_eq!(service.store().len(), 2);

	let again = service.bootstrap_from_file(&dataset).await.expect("Failed to bootstrap.");

	assert!(again.skipped);
	assert_eq!(spy.count(), 1);
}

#[tokio::test]
async fn failed_bootstrap_still_becomes_ready() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let missing = dir.child("missing.json").display().to_string();
	let service =
		service_with(test_config(&dir, 5_000, Some(&missing)), Arc::new(SpyEmbedding::new()));

	assert!(service.initialize().await.stocks.is_none());
	assert!(service.ready());
}

#[tokio::test]
async fn maintain_sweeps_and_reports() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));

	seed_abc(&service).await;

	let report = service.maintain().await.expect("Failed to maintain.");

	assert_eq!(report.cache_swept, 0);
	assert!(report.compaction.is_none());
	assert!(report.news_compaction.is_none());

	service.checkpoint().await.expect("Failed to checkpoint.");
}

#[tokio::test]
async fn interrupted_bootstrap_writes_nothing_and_retries_on_next_start() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let dataset = dir.child("stock_info.json");
	let records: Vec<StockRecord> = (0..100)
		.map(|idx| {
			stock(&format!("{idx:06}"), &format!("Company {idx}"), "KOSPI", "Battery maker.")
		})
		.collect();

	fs::write(&dataset, serde_json::to_vec(&records).expect("encode failed"))
		.expect("Failed to write dataset.");

	let cfg = test_config(&dir, 5_000, Some(&dataset.display().to_string()));
	let flaky =
		service_with(cfg.clone(), Arc::new(FlakyEmbedding { calls: AtomicUsize::new(0) }));

	assert!(flaky.initialize().await.stocks.is_none());
	assert!(flaky.ready());
	assert!(flaky.store().is_empty());

	drop(flaky);

	let healthy = service_with(cfg, Arc::new(SpyEmbedding::new()));
	let report = healthy.initialize().await.stocks.expect("Bootstrap ran.");

	assert!(!report.skipped);
	assert_eq!(report.upserted.inserted, 100);
	assert_eq!(healthy.store().len(), 100);
}

fn news(code: &str, title: &str, link: &str, published_date: &str) -> NewsRecord {
	NewsRecord {
		code: code.to_string(),
		title: title.to_string(),
		content: format!("{title} in detail."),
		link: link.to_string(),
		published_date: published_date.to_string(),
	}
}

#[tokio::test]
async fn news_bootstrap_and_lookup_by_code() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let dataset = dir.child("news.json");
	let articles = vec![
		news("373220", "Battery plant opens", "https://news.example/1", "2024-03-01"),
		news("373220", "Battery orders grow", "https://news.example/2", "2024-05-01"),
		news("373220", "Battery exports dip", "https://news.example/3", "2024-01-15"),
		news("373220", "Battery chemistry deal", "https://news.example/4", "2024-04-10"),
		news("105560", "Bank raises dividend", "https://news.example/5", "2024-02-01"),
		news("373220", "Battery orders grow", "https://news.example/2", "2024-05-01"),
	];

	fs::write(&dataset, serde_json::to_vec(&articles).expect("encode failed"))
		.expect("Failed to write dataset.");

	let cfg = test_config_with_news(&dir, 5_000, None, Some(&dataset.display().to_string()));
	let service = service_with(cfg, Arc::new(SpyEmbedding::new()));
	let report = service.initialize().await.news.expect("News bootstrap ran.");

	assert_eq!(report.records, 6);
	assert_eq!(report.upserted.inserted, 5);
	assert_eq!(service.news_store().len(), 5);
	assert!(service.store().is_empty());

	let latest = service.news_for_code("373220", 3).await.expect("Failed to look up news.");
	let titles: Vec<&str> = latest.iter().map(|item| item.title.as_str()).collect();

	assert_eq!(
		titles,
		vec!["Battery orders grow", "Battery chemistry deal", "Battery plant opens"]
	);
	assert_eq!(latest[0].link, "https://news.example/2");

	assert_eq!(service.news_for_code("105560", 3).await.expect("lookup failed").len(), 1);
	assert!(service.news_for_code("000000", 3).await.expect("lookup failed").is_empty());
	assert!(service.news_for_code("373220", 0).await.expect("lookup failed").is_empty());
	assert_eq!(service.stats().news.items, 5);
}

#[tokio::test]
async fn news_without_title_is_rejected() {
	let dir = TestDir::new("srec_service").expect("Failed to create test dir.");
	let service = service_with(test_config(&dir, 5_000, None), Arc::new(SpyEmbedding::new()));
	let err = service
		.upsert_news(vec![news("373220", "  ", "https://news.example/1", "2024-03-01")])
		.await
		.expect_err("Expected rejection.");

	assert_eq!(err.kind(), ErrorKind::InvalidRequest);
	assert!(service.news_store().is_empty());
}
