use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use labelstream::{Matcher, PostingsStrategy, ServiceConfig, ValueFilter};
use std::path::PathBuf;

/// Runtime configuration for the `labelstream` binary.
///
/// All tuning values can come from CLI arguments, environment variables or a
/// `.env` file in the working directory. Defaults match the library's.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "labelstream",
    version,
    about = "Stream label names, values and series cardinality from a series file"
)]
pub struct CliArgs {
    /// JSON file holding an array of series, each an object mapping label
    /// names to values.
    ///
    /// Example: `[{"__name__": "up", "job": "api"}]`
    ///
    /// Environment variable: `SERIES_FILE`
    #[arg(long, env = "SERIES_FILE")]
    pub series_file: PathBuf,

    /// Series selector, e.g. `job="api"` or `instance=~"host-.*"`. May be
    /// repeated; all matchers must hold.
    #[arg(long = "matcher", short = 'm')]
    pub matchers: Vec<String>,

    /// Byte budget per emitted batch. A batch is flushed as soon as its label
    /// names and values add up to this many bytes.
    ///
    /// Environment variable: `MESSAGE_SIZE_THRESHOLD`
    #[arg(long, env = "MESSAGE_SIZE_THRESHOLD", default_value_t = labelstream::DEFAULT_MESSAGE_SIZE_THRESHOLD)]
    pub message_size_threshold: usize,

    /// Number of blocking workers counting series per label name. Defaults to
    /// the number of CPUs.
    ///
    /// Environment variable: `COUNT_WORKERS`
    #[arg(long, env = "COUNT_WORKERS")]
    pub count_workers: Option<usize>,

    /// Capacity of the channel between counting workers and the aggregator.
    ///
    /// Environment variable: `RESULT_BUFFER_SIZE`
    #[arg(long, env = "RESULT_BUFFER_SIZE", default_value_t = labelstream::DEFAULT_RESULT_BUFFER_SIZE)]
    pub result_buffer_size: usize,

    /// Number of batches buffered ahead of the printer.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = labelstream::DEFAULT_STREAM_BUFFER_SIZE)]
    pub stream_buffer_size: usize,

    /// Which label values the cardinality query lists.
    ///
    /// Environment variable: `VALUE_FILTER`
    #[arg(long, env = "VALUE_FILTER", value_enum, default_value_t = ValueFilterArg::Matched)]
    pub value_filter: ValueFilterArg,

    /// How per-value postings are combined with the matchers.
    ///
    /// Environment variable: `POSTINGS_STRATEGY`
    #[arg(long, env = "POSTINGS_STRATEGY", value_enum, default_value_t = PostingsStrategyArg::PerValue)]
    pub postings_strategy: PostingsStrategyArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stream every label name with its values.
    NamesValues,
    /// Stream the number of series for each value of the given labels.
    Cardinality {
        /// Label name to report. May be repeated; order is kept.
        #[arg(long = "label-name", short = 'l', required = true)]
        label_names: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFilterArg {
    Matched,
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingsStrategyArg {
    PerValue,
    Intersect,
}

impl From<ValueFilterArg> for ValueFilter {
    fn from(value: ValueFilterArg) -> Self {
        match value {
            ValueFilterArg::Matched => Self::Matched,
            ValueFilterArg::All => Self::All,
        }
    }
}

impl From<PostingsStrategyArg> for PostingsStrategy {
    fn from(value: PostingsStrategyArg) -> Self {
        match value {
            PostingsStrategyArg::PerValue => Self::PerValue,
            PostingsStrategyArg::Intersect => Self::Intersect,
        }
    }
}

/// Everything `main` needs after argument validation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub series_file: PathBuf,
    pub matchers: Vec<Matcher>,
    pub command: Command,
    pub service: ServiceConfig,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let matchers = args
            .matchers
            .iter()
            .map(|raw| {
                raw.parse::<Matcher>()
                    .with_context(|| format!("invalid --matcher {raw:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if let Command::Cardinality { label_names } = &args.command {
            if label_names.iter().any(String::is_empty) {
                bail!("--label-name must not be empty");
            }
        }

        let service = ServiceConfig::try_from(&args)?;

        Ok(Self {
            series_file: args.series_file,
            matchers,
            command: args.command,
            service,
        })
    }
}

impl TryFrom<&CliArgs> for ServiceConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CliArgs) -> Result<Self, Self::Error> {
        let defaults = ServiceConfig::default();
        let count_workers = args.count_workers.unwrap_or(defaults.count_workers);

        if args.message_size_threshold == 0 {
            bail!("MESSAGE_SIZE_THRESHOLD must be greater than 0");
        }
        if count_workers == 0 {
            bail!("COUNT_WORKERS must be greater than 0");
        }
        if args.result_buffer_size == 0 {
            bail!("RESULT_BUFFER_SIZE must be greater than 0");
        }
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            message_size_threshold: args.message_size_threshold,
            count_workers,
            result_buffer_size: args.result_buffer_size,
            stream_buffer_size: args.stream_buffer_size,
            value_filter: args.value_filter.into(),
            postings_strategy: args.postings_strategy.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliConfig> {
        let args = CliArgs::try_parse_from(
            ["labelstream", "--series-file", "series.json"]
                .into_iter()
                .chain(args.iter().copied()),
        )?;
        CliConfig::try_from(args)
    }

    #[test]
    fn parses_cardinality_command() {
        let config = parse(&[
            "--matcher",
            r#"job="api""#,
            "-m",
            "env!~dev.*",
            "--message-size-threshold",
            "512",
            "--count-workers",
            "4",
            "--value-filter",
            "all",
            "--postings-strategy",
            "intersect",
            "cardinality",
            "--label-name",
            "instance",
            "-l",
            "__name__",
        ])
        .unwrap();

        assert_eq!(config.matchers.len(), 2);
        assert_eq!(config.matchers[0], Matcher::equal("job", "api"));
        assert_eq!(
            config.command,
            Command::Cardinality {
                label_names: vec!["instance".to_string(), "__name__".to_string()]
            }
        );
        assert_eq!(config.service.message_size_threshold, 512);
        assert_eq!(config.service.count_workers, 4);
        assert_eq!(config.service.value_filter, ValueFilter::All);
        assert_eq!(config.service.postings_strategy, PostingsStrategy::Intersect);
    }

    #[test]
    fn defaults_follow_library() {
        let config = parse(&["names-values"]).unwrap();
        assert_eq!(config.command, Command::NamesValues);
        assert!(config.matchers.is_empty());
        assert_eq!(
            config.service.message_size_threshold,
            labelstream::DEFAULT_MESSAGE_SIZE_THRESHOLD
        );
        assert!(config.service.count_workers >= 1);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--matcher", "job", "names-values"]).is_err());
        assert!(parse(&["--count-workers", "0", "names-values"]).is_err());
        assert!(parse(&["--message-size-threshold", "0", "names-values"]).is_err());
        assert!(parse(&["cardinality"]).is_err());
    }
}
