mod cli;
mod connection;

use anyhow::{bail, Result};
use clap::Parser;
use cli::{Cli, Command};
use connection::DispatchConnection;
use dispatch_shared::protocol::{DroneLookup, LoadMedicine, RegisterDrone};
use dispatch_shared::{Request, Response};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr so that stdout only carries the drone JSON
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let request = match &cli.command {
        Command::Register {
            serial_number,
            model,
            weight_limit,
            battery,
        } => Request::Register(RegisterDrone {
            serial_number: serial_number.clone(),
            model: (*model).into(),
            weight_limit_grams: *weight_limit,
            battery_percentage: *battery,
        }),
        Command::Load {
            serial_number,
            items,
        } => {
            let parts = cli::build_parts(items).await?;
            debug!("Uploading {} parts", parts.len());
            Request::LoadMedicine(LoadMedicine {
                serial_number: serial_number.clone(),
                parts,
            })
        }
        Command::Get { serial_number } => Request::GetDrone(DroneLookup {
            serial_number: serial_number.clone(),
        }),
    };

    let mut conn =
        DispatchConnection::connect(&cli.server, cli.connect_timeout(), cli.request_timeout())
            .await?;
    info!("Connected to {}", cli.server);

    match conn.call(request).await? {
        Response::Drone(view) => {
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Response::Error(body) => bail!("{:?}: {}", body.kind, body.message),
    }
}
