pub mod cli;
pub mod logging;
pub mod login;
pub mod output;

use raumwart::Result;
use raumwart::api::PortalClient;
use raumwart::credentials::CredentialStore;
use raumwart::registry::RoomRegistry;
use raumwart::store::StatePaths;
use raumwart::workflow::{BookingWorkflow, WorkflowOptions};

/// Wires stores, portal client and login driver into one booking run.
pub async fn run(cli: cli::Cli) -> Result<()> {
	let paths = StatePaths::new(cli.data_dir.as_deref());
	let credentials = CredentialStore::load(paths.credentials.clone());
	let registry = RoomRegistry::load(paths.rooms.clone());
	let portal = PortalClient::new(&cli.base_url)?;
	let login = login::BrowserLogin::new(&cli.base_url, !cli.headed);

	let options = WorkflowOptions {
		user: cli.user.clone(),
		password: cli.password.clone(),
		registry_max_age_days: cli.update_interval,
		login_timeout: std::time::Duration::from_secs(cli.login_timeout),
	};
	let mut workflow = BookingWorkflow::new(portal, login, credentials, registry, options);

	let target = cli.booking_datetime();
	workflow.prepare(target.date()).await?;

	let available = workflow.available_rooms(target);
	output::print_available(&available, target);

	let plan = workflow.plan_booking(target, cli.choice())?;
	if let Some(room) = workflow.registry().get(plan.room_id) {
		output::print_chosen(room, target);
	}
	output::print_plan(&plan);

	let response = workflow.book(&plan).await?;
	println!("{response}");
	Ok(())
}
