use anyhow::Result;
use clap::{Parser, Subcommand};
use server_api::{mark_recovered, open_nets, open_nets_map_json, report_net, ApiContext, SessionState};
use shared::{
    domain::NetId,
    error::ApiException,
    protocol::{NetForm, PersonForm},
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/ghostnets.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List reported and pending nets, one line per location.
    OpenNets,
    /// Print the map marker array for open nets.
    MapJson,
    Report {
        #[arg(long)]
        coordinates: String,
        #[arg(long, default_value = "")]
        size: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone_prefix: Option<String>,
        #[arg(long)]
        phone_number: Option<String>,
    },
    MarkRecovered {
        net_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = ApiContext {
        storage: Storage::new(&cli.database_url).await?,
    };

    match cli.command {
        Command::OpenNets => {
            for net in open_nets(&ctx).await.map_err(ApiException::from)? {
                println!(
                    "#{}\t{}\t{}\t{}",
                    net.net_id, net.status, net.gps_coordinates, net.estimated_size
                );
            }
        }
        Command::MapJson => {
            println!("{}", open_nets_map_json(&ctx).await.map_err(ApiException::from)?);
        }
        Command::Report {
            coordinates,
            size,
            name,
            phone_prefix,
            phone_number,
        } => {
            let mut session =
                report_session(coordinates, size, name, phone_prefix, phone_number);
            let outcome = report_net(&ctx, &mut session)
                .await
                .map_err(ApiException::from)?;
            println!("reported, next view: {}", outcome.as_str());
        }
        Command::MarkRecovered { net_id } => {
            let mut session = SessionState::new();
            mark_recovered(&ctx, &mut session, NetId(net_id))
                .await
                .map_err(ApiException::from)?;
            let messages = session.drain_messages();
            if messages.is_empty() {
                println!("net #{net_id} not found");
            }
            for notice in messages {
                println!("{}: {}", notice.summary, notice.detail);
            }
        }
    }

    Ok(())
}

/// A report is anonymous unless a name or phone number is given.
fn report_session(
    coordinates: String,
    size: String,
    name: Option<String>,
    phone_prefix: Option<String>,
    phone_number: Option<String>,
) -> SessionState {
    let mut session = SessionState::new();
    session.new_net = NetForm {
        gps_coordinates: coordinates,
        estimated_size: size,
    };
    session.anonymous = name.is_none() && phone_number.is_none();
    session.reporter = PersonForm {
        name,
        phone_prefix,
        phone_number,
    };
    session
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
