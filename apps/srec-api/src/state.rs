use std::sync::Arc;

use srec_config::Config;
use srec_service::RecommendService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RecommendService>,
}
impl AppState {
	/// Opens the configured stores off the async workers and wraps them in a service that is not
	/// yet ready.
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let (config, stores) = tokio::task::spawn_blocking(move || {
			let stores = srec_service::open_stores(&config)?;

			Ok::<_, srec_service::Error>((config, stores))
		})
		.await??;
		let service = RecommendService::new(config, stores);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: RecommendService) -> Self {
		Self { service: Arc::new(service) }
	}
}
