use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pcbook::client::{AuthClient, LaptopClient, TokenRefresher};
use pcbook::proto::memory::Unit;
use pcbook::proto::{Filter, Memory};
use pcbook::{sample, serializer};
use tonic::transport::Channel;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Laptop catalog gRPC client", long_about = None)]
struct Cli {
    #[arg(short, long, env = "PCBOOK_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    #[arg(short, long, env = "PCBOOK_USERNAME", default_value = "admin1")]
    username: String,

    #[arg(short, long, env = "PCBOOK_PASSWORD", default_value = "secret")]
    password: String,

    /// Seconds between token refreshes; keep below the token lifetime
    #[arg(long, default_value = "30")]
    refresh_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create random laptops, or one laptop read from a JSON file
    Create {
        #[arg(short, long, default_value = "1")]
        count: usize,

        #[arg(long, conflicts_with = "count")]
        from_json: Option<PathBuf>,
    },

    /// Create some random laptops and search them
    Search {
        #[arg(long, default_value = "3000")]
        max_price: f64,

        #[arg(long, default_value = "4")]
        min_cores: u32,

        #[arg(long, default_value = "2.5")]
        min_ghz: f64,

        #[arg(long, default_value = "8", help = "Minimum RAM in gigabytes")]
        min_ram_gb: u64,

        #[arg(long, default_value = "10", help = "Random laptops created first")]
        seed: usize,
    },

    /// Create a random laptop and upload an image for it
    Upload {
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Create random laptops and rate them with random scores
    Rate {
        #[arg(short, long, default_value = "3")]
        laptops: usize,

        #[arg(short, long, default_value = "1")]
        rounds: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(server = %cli.server, "dial server");
    let channel = Channel::from_shared(cli.server.clone())?.connect().await?;

    let auth = AuthClient::new(channel.clone(), cli.username.as_str(), cli.password.as_str());
    let refresher = TokenRefresher::start(auth, Duration::from_secs(cli.refresh_secs)).await?;
    let mut client = LaptopClient::new(channel, refresher.subscribe());

    match cli.command {
        Commands::Create { count, from_json } => {
            if let Some(path) = from_json {
                let laptop = serializer::read_json_file(&path).await?;
                client.create_laptop(laptop).await?;
            } else {
                for _ in 0..count {
                    client.create_laptop(sample::new_laptop()).await?;
                }
            }
        }
        Commands::Search {
            max_price,
            min_cores,
            min_ghz,
            min_ram_gb,
            seed,
        } => {
            for _ in 0..seed {
                client.create_laptop(sample::new_laptop()).await?;
            }

            let filter = Filter {
                max_price_usd: max_price,
                min_cpu_cores: min_cores,
                min_cpu_ghz: min_ghz,
                min_ram: Some(Memory {
                    value: min_ram_gb,
                    unit: Unit::Gigabyte as i32,
                }),
            };

            let found = client.search_laptop(filter).await?;
            println!("found {} laptops", found.len());
        }
        Commands::Upload { image } => {
            let laptop_id = client.create_laptop(sample::new_laptop()).await?;
            let response = client.upload_image(&laptop_id, &image).await?;
            println!("image uploaded: id {} size {}", response.id, response.size);
        }
        Commands::Rate { laptops, rounds } => {
            let mut ids = Vec::with_capacity(laptops);
            for _ in 0..laptops {
                ids.push(client.create_laptop(sample::new_laptop()).await?);
            }

            for round in 1..=rounds {
                let scores = ids
                    .iter()
                    .map(|id| (id.clone(), sample::random_score()))
                    .collect();

                for response in client.rate_laptop(scores).await? {
                    println!(
                        "round {round}: laptop {} rated {} times, average {:.2}",
                        response.laptop_id, response.rated_count, response.average_score
                    );
                }
            }
        }
    }

    refresher.shutdown().await;
    Ok(())
}
