use clap::Parser;
use raumwart::Error;
use raumwart_cli::{cli::Cli, logging, output, run};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		render_error(&err);
		std::process::exit(1);
	}
}

fn render_error(err: &Error) {
	if err.is_no_room() {
		eprintln!("{}", output::NO_ROOM_AVAILABLE);
	} else if err.is_login_failure() {
		eprintln!("{err}");
		eprintln!("Log in failed, try rebuilding your local state (remove the raumwart config and cache files).");
	} else {
		eprintln!("Error: {err}");
	}
}
