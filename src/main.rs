use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tour_search::{
    mock_server::MockTourApi,
    tour_page::load_tour,
    ClientConfig, HttpTourApi, SearchPage, SearchView, TourApi,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tour-search", about = "Search tour offers from the command line")]
struct Args {
    /// Backend base URL (overrides TOUR_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in milliseconds, 0 disables it
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Use the built-in demo catalogue instead of a real backend
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List countries available for search
    Countries,
    /// Autocomplete a destination
    Geo { query: String },
    /// Run a price search for a country and print the offers
    Search { country_id: String },
    /// Show a single tour offer
    Tour { hotel_id: String, price_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::from_env().context("loading configuration")?;
    if let Some(base_url) = args.base_url.clone() {
        config.base_url = base_url;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.validate()?;

    if args.demo {
        run(Arc::new(MockTourApi::seeded().await), &config, args.command).await
    } else {
        let api = HttpTourApi::new(&config).context("building http client")?;
        run(Arc::new(api), &config, args.command).await
    }
}

async fn run<A: TourApi>(api: Arc<A>, config: &ClientConfig, command: Command) -> Result<()> {
    match command {
        Command::Countries => {
            let countries = api.countries().await.context("listing countries")?;
            for country in countries.values() {
                println!("{:>6}  {}", country.id, country.name);
            }
        }
        Command::Geo { query } => {
            let found = api.search_geo(&query).await.context("searching destinations")?;
            for entity in found.values() {
                println!("{:>6}  {}", entity.id(), entity.name());
            }
        }
        Command::Search { country_id } => {
            let page = SearchPage::new(api, config.retry.clone());
            page.submit(&country_id).await;

            match page.view() {
                SearchView::Results(cards) => {
                    println!("Found {} offers", cards.len());
                    for card in cards {
                        println!(
                            "{}  {}  ({})  from {}  {}",
                            card.price, card.hotel_name, card.location, card.start_date, card.route
                        );
                    }
                }
                SearchView::Empty => println!("No tours found for this search"),
                SearchView::Failed(message) => bail!("search failed: {}", message),
                SearchView::Loading | SearchView::Hidden => bail!("search did not finish"),
            }
        }
        Command::Tour { hotel_id, price_id } => {
            let tour = load_tour(api.as_ref(), &hotel_id, &price_id).await?;
            println!("{}", tour.name);
            println!("{}, {}", tour.country_name, tour.city_name);
            println!("{}", tour.image);
            println!();
            println!("{}", tour.description);
            if !tour.services.is_empty() {
                let labels: Vec<&str> = tour.services.iter().map(|s| s.label).collect();
                println!("Services: {}", labels.join(", "));
            }
            println!("{} - {}  {}", tour.start_date, tour.end_date, tour.price);
            println!("Back: {}", tour.back);
        }
    }

    Ok(())
}
