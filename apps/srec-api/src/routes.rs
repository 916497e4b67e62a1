use axum::{
	Json, Router,
	extract::{
		Path, Query, State,
		rejection::{JsonRejection, QueryRejection},
	},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use srec_domain::{Item, Metadata, NewsRecord, RankedItem};
use srec_service::{
	DeleteItemResponse, ErrorKind, RecommendRequest, RecommendResponse, ServiceStats,
	UpsertItemRequest, UpsertItemResponse,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/recommend", post(recommend))
		.route("/api/company", get(company))
		.route("/v1/items/{id}", put(upsert_item).delete(delete_item).get(get_item))
		.route("/v1/news/{code}", get(news))
		.route("/v1/stats", get(stats))
		.with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthBody {
	status: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompanyParams {
	keyword: Option<String>,
	k: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct NewsParams {
	k: Option<u32>,
}

/// One row of the keyword lookup, shaped for the company search page.
#[derive(Debug, Serialize)]
pub struct CompanyMatch {
	pub code: String,
	pub name: String,
	pub market: String,
	pub industry: String,
	pub description: String,
	pub similarity: f32,
	pub news: Vec<NewsRecord>,
}
impl CompanyMatch {
	fn from_ranked(item: RankedItem, news: Vec<NewsRecord>) -> Self {
		let field = |key: &str| {
			item.metadata.get(key).and_then(|value| value.as_str()).unwrap_or_default().to_string()
		};

		Self {
			name: field("name"),
			market: field("market"),
			industry: field("industry"),
			description: field("description"),
			code: item.item_id.clone(),
			similarity: item.score,
			news,
		}
	}
}

#[derive(Debug, Deserialize)]
struct ItemBody {
	vector: Vec<f32>,
	#[serde(default)]
	metadata: Metadata,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
	if state.service.ready() {
		(StatusCode::OK, Json(HealthBody { status: "ready" }))
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, Json(HealthBody { status: "starting" }))
	}
}

async fn recommend(
	State(state): State<AppState>,
	payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.recommend(payload).await?;

	Ok(Json(response))
}

async fn company(
	State(state): State<AppState>,
	params: Result<Query<CompanyParams>, QueryRejection>,
) -> Result<Json<Vec<CompanyMatch>>, ApiError> {
	let Query(params) = params?;
	let keyword = params
		.keyword
		.filter(|keyword| !keyword.trim().is_empty())
		.ok_or_else(|| ApiError::invalid_request("keyword is required"))?;
	let response = state.service.recommend(RecommendRequest::keyword(keyword, params.k)).await?;
	let news_per_item = state.service.cfg.recommend.news_per_item as usize;
	let mut rows = Vec::with_capacity(response.items.len());

	for item in response.items {
		let news = state.service.news_for_code(&item.item_id, news_per_item).await?;

		rows.push(CompanyMatch::from_ranked(item, news));
	}

	Ok(Json(rows))
}

async fn news(
	State(state): State<AppState>,
	Path(code): Path<String>,
	params: Result<Query<NewsParams>, QueryRejection>,
) -> Result<Json<Vec<NewsRecord>>, ApiError> {
	let Query(params) = params?;
	let limit = params.k.unwrap_or(state.service.cfg.recommend.news_per_item) as usize;
	let news = state.service.news_for_code(&code, limit).await?;

	Ok(Json(news))
}

async fn upsert_item(
	State(state): State<AppState>,
	Path(id): Path<String>,
	payload: Result<Json<ItemBody>, JsonRejection>,
) -> Result<Json<UpsertItemResponse>, ApiError> {
	let Json(ItemBody { vector, metadata }) = payload?;
	let response = state.service.upsert_item(UpsertItemRequest { id, vector, metadata }).await?;

	Ok(Json(response))
}

async fn delete_item(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<DeleteItemResponse>, ApiError> {
	let response = state.service.delete_item(&id).await?;

	Ok(Json(response))
}

async fn get_item(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Item>, ApiError> {
	let item = state.service.get_item(&id)?;

	Ok(Json(item.as_ref().clone()))
}

async fn stats(State(state): State<AppState>) -> Json<ServiceStats> {
	Json(state.service.stats())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_kind: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_kind: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_kind: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_kind: error_kind.into(), message: message.into() }
	}

	fn invalid_request(message: impl Into<String>) -> Self {
		Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest.as_str(), message)
	}
}
impl From<srec_service::Error> for ApiError {
	fn from(err: srec_service::Error) -> Self {
		let kind = err.kind();
		let status = match kind {
			ErrorKind::InvalidRequest | ErrorKind::DimensionMismatch => StatusCode::BAD_REQUEST,
			ErrorKind::EmbeddingError => StatusCode::BAD_GATEWAY,
			ErrorKind::NotFound => StatusCode::NOT_FOUND,
			ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
			ErrorKind::NotReady => StatusCode::SERVICE_UNAVAILABLE,
			ErrorKind::StorageCorruption | ErrorKind::Storage => {
				tracing::error!(
					error_kind = kind.as_str(),
					error = %err,
					"Request hit a storage failure."
				);

				StatusCode::INTERNAL_SERVER_ERROR
			},
		};

		Self::new(status, kind.as_str(), err.to_string())
	}
}
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self::invalid_request(rejection.body_text())
	}
}
impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		Self::invalid_request(rejection.body_text())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_kind: self.error_kind, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
