use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = echo_worker::Args::parse();

	echo_worker::run(args).await
}
