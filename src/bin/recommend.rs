use anyhow::Context;
use num_format::{Locale, ToFormattedString};

use cadenza::config::AppConfig;
use cadenza::io;
use cadenza::knn::Paradigm;
use cadenza::logging;
use cadenza::storage::RecommenderStorage;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().context("Config file not specified!")?;
    let user_uri = args.next().context("User not specified!")?;

    let config = AppConfig::new(&config_path)?;
    logging::init_logging(&config.log.level);
    let how_many = match args.next() {
        Some(value) => value
            .parse::<usize>()
            .with_context(|| format!("invalid number of recommendations '{}'", value))?,
        None => config.eval.num_items_to_recommend,
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.runtime.num_threads)
        .build_global()?;

    let observations = io::read_ratings(
        &config.data.ratings_path,
        config.data.delimiter,
        config.data.has_headers,
    )
    .with_context(|| format!("reading ratings from {}", config.data.ratings_path))?;

    let mut storage = RecommenderStorage::new(config.model.clone())?;
    let num_observations = storage.ingest(observations)?;
    storage.prepare()?;
    println!(
        "Indexed {} ratings over {} resources",
        num_observations.to_formatted_string(&Locale::en),
        storage.resource_counter().to_formatted_string(&Locale::en)
    );

    let user = storage.require(&user_uri)?;
    if config.model.paradigm == Paradigm::UserBased {
        println!("Nearest neighbours of {}:", user_uri);
        for neighbor in storage.get_neighborhood(user).unwrap_or_default() {
            println!(
                "  {}\t{:.4}",
                storage.require_uri(neighbor.id)?,
                neighbor.rating
            );
        }
    }

    println!("Recommendations for {}:", user_uri);
    for recommendation in storage.recommend(user, how_many)? {
        println!(
            "  {}\t{}",
            storage.require_uri(recommendation.id)?,
            recommendation.rating
        );
    }

    Ok(())
}
