use anyhow::Context;
use csv::Writer;
use indicatif::ProgressBar;
use num_format::{Locale, ToFormattedString};
use tracing::info;

use cadenza::config::AppConfig;
use cadenza::io;
use cadenza::logging;
use cadenza::metrics::evaluation_reporter::EvaluationReporter;
use cadenza::stopwatch::Stopwatch;
use cadenza::storage::RecommenderStorage;
use cadenza::ResourceId;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_default();
    let config = AppConfig::new(&config_path)?;
    logging::init_logging(&config.log.level);

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.runtime.num_threads)
        .build_global()?;

    let ratings_path = &config.data.ratings_path;
    let observations = io::read_ratings(ratings_path, config.data.delimiter, config.data.has_headers)
        .with_context(|| format!("reading ratings from {}", ratings_path))?;
    let (training, test) = io::leave_one_out(observations);
    info!(
        training = training.len(),
        test = test.len(),
        "split ratings with leave-one-out"
    );

    let mut storage = RecommenderStorage::new(config.model.clone())?;
    storage.ingest(training)?;
    storage.prepare()?;

    let num_items_to_recommend = config.eval.num_items_to_recommend;
    let mut reporter = EvaluationReporter::new(num_items_to_recommend);
    let mut stopwatch = Stopwatch::new();

    let pb = ProgressBar::new(test.len() as u64);
    for held_out in &test {
        pb.inc(1);
        // Every evaluated user keeps at least one training rating.
        let user = storage.require(&held_out.user)?;
        let item = storage.lookup(&held_out.item);

        stopwatch.start();
        let predicted = match item {
            Some(item) => storage.predict(user, item)?,
            None => None,
        };
        stopwatch.stop();

        let recommended_items = storage
            .recommend(user, num_items_to_recommend)?
            .iter()
            .map(|scored| scored.id)
            .collect::<Vec<ResourceId>>();
        reporter.add(predicted, held_out.rating, &recommended_items, item);
    }
    pb.finish_and_clear();

    println!("===============================================================");
    println!("===            START EVALUATING HELD-OUT RATINGS           ====");
    println!("===============================================================");
    println!(
        "Model: k={}, normalization={}, posting_lists={}, similarity={}, paradigm={}",
        config.model.neighborhood_size_k,
        config.model.normalization,
        config.model.posting_lists,
        config.model.similarity,
        config.model.paradigm
    );
    println!(
        "Qty test evaluations: {}",
        stopwatch.get_n().to_formatted_string(&Locale::en)
    );
    println!("{}", reporter.get_name());
    println!("{}", reporter.result());
    println!("Prediction latency");
    println!("p90 (microseconds): {}", stopwatch.get_percentile_in_micros(0.90));
    println!("p95 (microseconds): {}", stopwatch.get_percentile_in_micros(0.95));
    println!("p99.5 (microseconds): {}", stopwatch.get_percentile_in_micros(0.995));

    let mut wtr = Writer::from_writer(std::io::stdout());
    wtr.serialize(reporter.summary())?;
    wtr.flush()?;

    Ok(())
}
