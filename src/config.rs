use std::ffi::OsStr;
use std::fs::File;

use justconfig::item::ValueExtractor;
use justconfig::processors::Trim;
use justconfig::sources::env::Env;
use justconfig::sources::text::ConfigText;
use justconfig::ConfPath;
use justconfig::Config;

use crate::config_processors::{Lowercase, Unquote};
use crate::error::{RecError, Result};
use crate::knn::posting_store::PostingListVariant;
use crate::knn::scaled_posting_store::MAX_RATING_LEVELS;
use crate::knn::{Paradigm, SimilarityAlgorithm};
use crate::ratings::normalization::Normalization;

// Set some default values
const DEFAULT_NEIGHBORHOOD_SIZE_K: usize = 20;
const DEFAULT_DECIMAL_PRECISION: u32 = 4;
const DEFAULT_RATING_LEVELS: u8 = 5;
const DEFAULT_NUM_ITEMS_TO_RECOMMEND: usize = 10;
const DEFAULT_LOG_LEVEL: &str = "info";

pub const MAX_NEIGHBORHOOD_SIZE_K: usize = 100;
pub const MAX_DECIMAL_PRECISION: u32 = 6;

pub struct AppConfig {
    pub log: LogConfig,
    pub data: DataConfig,
    pub model: RecommenderConfig,
    pub eval: EvalConfig,
    pub runtime: RuntimeConfig,
}

pub struct LogConfig {
    pub level: String,
}

pub struct DataConfig {
    pub ratings_path: String,
    pub delimiter: u8,
    pub has_headers: bool,
}

/// Everything a [`crate::storage::RecommenderStorage`] session is configured with.
#[derive(Clone, Debug, PartialEq)]
pub struct RecommenderConfig {
    pub neighborhood_size_k: usize,
    pub normalization: Normalization,
    pub decimal_precision: u32,
    pub posting_lists: PostingListVariant,
    pub similarity: SimilarityAlgorithm,
    pub paradigm: Paradigm,
    /// Highest discretised rating level of the scaled lists.
    pub rating_levels: u8,
    /// Number of items folded by the scaled lists, zero disables folding.
    pub top_resources: usize,
}

pub struct EvalConfig {
    pub num_items_to_recommend: usize,
}

pub struct RuntimeConfig {
    pub num_threads: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        RecommenderConfig {
            neighborhood_size_k: DEFAULT_NEIGHBORHOOD_SIZE_K,
            normalization: Normalization::None,
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
            posting_lists: PostingListVariant::Plain,
            similarity: SimilarityAlgorithm::Merge,
            paradigm: Paradigm::UserBased,
            rating_levels: DEFAULT_RATING_LEVELS,
            top_resources: 0,
        }
    }
}

impl RecommenderConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_NEIGHBORHOOD_SIZE_K).contains(&self.neighborhood_size_k) {
            return Err(RecError::InvalidConfiguration(format!(
                "neighborhood_size_k must be within 1..={}, got {}",
                MAX_NEIGHBORHOOD_SIZE_K, self.neighborhood_size_k
            )));
        }
        if self.decimal_precision > MAX_DECIMAL_PRECISION {
            return Err(RecError::InvalidConfiguration(format!(
                "decimal_precision must be within 0..={}, got {}",
                MAX_DECIMAL_PRECISION, self.decimal_precision
            )));
        }
        if !(1..=MAX_RATING_LEVELS).contains(&self.rating_levels) {
            return Err(RecError::InvalidConfiguration(format!(
                "rating_levels must be within 1..={}, got {}",
                MAX_RATING_LEVELS, self.rating_levels
            )));
        }
        if self.paradigm == Paradigm::ItemBased
            && self.posting_lists == PostingListVariant::Scaled
        {
            return Err(RecError::InvalidConfiguration(
                "scaled posting lists only support the user based paradigm".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn new(config_path: &str) -> Result<AppConfig> {
        // Initialize config object
        let mut conf = Config::default();

        // Check if there is a config file
        if let Ok(config_file) = File::open(config_path) {
            let config_text = ConfigText::new(config_file, config_path).map_err(|e| {
                RecError::InvalidConfiguration(format!("cannot load {}: {}", config_path, e))
            })?;
            conf.add_source(config_text);
        }

        // Define config params from environment variables
        let config_env = Env::new(&[
            (
                ConfPath::from(&["data", "ratings_path"]),
                OsStr::new("RATINGS_DATA"),
            ),
            (
                ConfPath::from(&["runtime", "num_threads"]),
                OsStr::new("NUM_THREADS"),
            ),
            (ConfPath::from(&["log", "level"]), OsStr::new("LOG_LEVEL")),
        ]);
        conf.add_source(config_env);

        AppConfig::parse(&conf)
    }

    pub fn parse(conf: &Config) -> Result<AppConfig> {
        let app_config = AppConfig {
            log: LogConfig::parse(conf, ConfPath::from(&["log"])),
            data: DataConfig::parse(conf, ConfPath::from(&["data"]))?,
            model: RecommenderConfig::parse(conf, ConfPath::from(&["model"]))?,
            eval: EvalConfig::parse(conf, ConfPath::from(&["eval"])),
            runtime: RuntimeConfig::parse(conf, ConfPath::from(&["runtime"])),
        };
        app_config.model.validate()?;
        Ok(app_config)
    }
}

impl LogConfig {
    fn parse(conf: &Config, path: ConfPath) -> LogConfig {
        LogConfig {
            level: conf
                .get(path.push("level"))
                .unquote()
                .lowercase()
                .value()
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

impl DataConfig {
    fn parse(conf: &Config, path: ConfPath) -> Result<DataConfig> {
        let ratings_path: String = conf
            .get(path.push("ratings_path"))
            .unquote()
            .value()
            .map_err(|e| RecError::InvalidConfiguration(format!("data.ratings_path: {}", e)))?;
        let delimiter: String = conf
            .get(path.push("delimiter"))
            .unquote()
            .value()
            .unwrap_or_else(|_| "tab".to_string());

        Ok(DataConfig {
            ratings_path,
            delimiter: parse_delimiter(&delimiter)?,
            has_headers: conf
                .get(path.push("has_headers"))
                .trim()
                .value()
                .unwrap_or(true),
        })
    }
}

fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        _ => Err(RecError::InvalidConfiguration(format!(
            "delimiter must be a single ascii character, got '{}'",
            value
        ))),
    }
}

fn parse_choice<T>(conf: &Config, path: ConfPath, default: T) -> Result<T>
where
    T: std::str::FromStr<Err = RecError>,
{
    let choice: std::result::Result<String, _> = conf.get(path).unquote().lowercase().value();
    match choice {
        Ok(choice) => choice.parse(),
        Err(_) => Ok(default),
    }
}

impl RecommenderConfig {
    fn parse(conf: &Config, path: ConfPath) -> Result<RecommenderConfig> {
        let defaults = RecommenderConfig::default();
        Ok(RecommenderConfig {
            neighborhood_size_k: conf
                .get(path.push("neighborhood_size_k"))
                .trim()
                .value()
                .unwrap_or(defaults.neighborhood_size_k),
            normalization: parse_choice(conf, path.push("normalization"), defaults.normalization)?,
            decimal_precision: conf
                .get(path.push("decimal_precision"))
                .trim()
                .value()
                .unwrap_or(defaults.decimal_precision),
            posting_lists: parse_choice(conf, path.push("posting_lists"), defaults.posting_lists)?,
            similarity: parse_choice(conf, path.push("similarity"), defaults.similarity)?,
            paradigm: parse_choice(conf, path.push("paradigm"), defaults.paradigm)?,
            rating_levels: conf
                .get(path.push("rating_levels"))
                .trim()
                .value()
                .unwrap_or(defaults.rating_levels),
            top_resources: conf
                .get(path.push("top_resources"))
                .trim()
                .value()
                .unwrap_or(defaults.top_resources),
        })
    }
}

impl EvalConfig {
    fn parse(conf: &Config, path: ConfPath) -> EvalConfig {
        EvalConfig {
            num_items_to_recommend: conf
                .get(path.push("num_items_to_recommend"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_NUM_ITEMS_TO_RECOMMEND),
        }
    }
}

impl RuntimeConfig {
    fn parse(conf: &Config, path: ConfPath) -> RuntimeConfig {
        RuntimeConfig {
            num_threads: conf
                .get(path.push("num_threads"))
                .trim()
                .value()
                // Detect number of CPUs
                .unwrap_or_else(|_| sys_info::cpu_num().map_or(1, |cpus| cpus as usize).max(1)),
        }
    }
}

#[cfg(test)]
mod config_test {
    use justconfig::sources::defaults::Defaults;

    use super::*;

    fn config_from(pairs: &[(&[&str], &str)]) -> Config {
        let mut conf = Config::default();
        let mut defaults = Defaults::default();
        for (path, value) in pairs {
            defaults.set(conf.root().push_all(*path), *value, "test");
        }
        conf.add_source(defaults);
        conf
    }

    #[test]
    fn should_apply_defaults_for_missing_model_values() {
        let conf = config_from(&[(&["data", "ratings_path"], "\"ratings.tsv\"")]);
        let app_config = AppConfig::parse(&conf).unwrap();

        assert_eq!("ratings.tsv", app_config.data.ratings_path);
        assert_eq!(b'\t', app_config.data.delimiter);
        assert!(app_config.data.has_headers);
        assert_eq!(RecommenderConfig::default(), app_config.model);
        assert_eq!("info", app_config.log.level);
        assert_eq!(10, app_config.eval.num_items_to_recommend);
        assert!(app_config.runtime.num_threads >= 1);
    }

    #[test]
    fn should_parse_model_choices_case_insensitively() {
        let conf = config_from(&[
            (&["data", "ratings_path"], "ratings.csv"),
            (&["data", "delimiter"], ","),
            (&["model", "neighborhood_size_k"], "4"),
            (&["model", "normalization"], "\"Mean_Centering\""),
            (&["model", "posting_lists"], "SCALED"),
            (&["model", "similarity"], "galloping"),
            (&["model", "top_resources"], "3"),
        ]);
        let app_config = AppConfig::parse(&conf).unwrap();

        assert_eq!(b',', app_config.data.delimiter);
        assert_eq!(4, app_config.model.neighborhood_size_k);
        assert_eq!(Normalization::MeanCentering, app_config.model.normalization);
        assert_eq!(PostingListVariant::Scaled, app_config.model.posting_lists);
        assert_eq!(SimilarityAlgorithm::Galloping, app_config.model.similarity);
        assert_eq!(3, app_config.model.top_resources);
    }

    #[test]
    fn should_require_a_ratings_path() {
        let conf = config_from(&[(&["model", "neighborhood_size_k"], "4")]);
        assert!(matches!(
            AppConfig::parse(&conf),
            Err(RecError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn should_reject_unknown_choices() {
        let conf = config_from(&[
            (&["data", "ratings_path"], "ratings.csv"),
            (&["model", "normalization"], "min_max"),
        ]);
        assert!(AppConfig::parse(&conf).is_err());
    }

    #[test]
    fn should_validate_ranges_and_combinations() {
        assert!(RecommenderConfig::default().validate().is_ok());

        let too_large_k = RecommenderConfig {
            neighborhood_size_k: 101,
            ..RecommenderConfig::default()
        };
        assert!(too_large_k.validate().is_err());

        let zero_k = RecommenderConfig {
            neighborhood_size_k: 0,
            ..RecommenderConfig::default()
        };
        assert!(zero_k.validate().is_err());

        let too_precise = RecommenderConfig {
            decimal_precision: 7,
            ..RecommenderConfig::default()
        };
        assert!(too_precise.validate().is_err());

        let scaled_items = RecommenderConfig {
            paradigm: Paradigm::ItemBased,
            posting_lists: PostingListVariant::Scaled,
            ..RecommenderConfig::default()
        };
        assert!(matches!(
            scaled_items.validate(),
            Err(RecError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn should_parse_delimiters() {
        assert_eq!(b'\t', parse_delimiter("tab").unwrap());
        assert_eq!(b';', parse_delimiter(";").unwrap());
        assert!(parse_delimiter("::").is_err());
    }
}
