use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = griot_api::Args::parse();
	griot_api::run(args).await
}
