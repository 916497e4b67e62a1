use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = srec_api::Args::parse();

	srec_api::run(args).await
}
