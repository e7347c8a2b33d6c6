use clap::{Parser, Subcommand, ValueEnum};
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};

use dt_report::{report, settings::Settings};
use flash_dt::metrics::{CacheCapacity, DtAggregator, HitRateAggregator, PeakBinning, TraceMetrics};
use flash_dt::reader::read_records;
use flash_dt::scheme::{PipelineModulo, SchemeClassifier, SchemeLabel, TagThenPipeline};
use flash_dt::sweep::{ParameterRule, SizeUnit, SweepCollator, SweepMetric};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Disk-head time and hit-rate reports for flash-cache traces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// TOML settings file; flags given on the command line take precedence
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Maximum number of records read from each trace
    #[arg(long, global = true)]
    max_entries: Option<usize>,

    /// Unit of the trace timestamps (s, ms, us); required here or in the settings file
    #[arg(long, global = true)]
    time_unit: Option<String>,

    /// Trace line format (csv, baleen)
    #[arg(long, global = true)]
    format: Option<String>,

    /// Glob selecting the trace file inside a directory
    #[arg(long, value_name = "GLOB", global = true)]
    trace_glob: Option<String>,

    /// What consecutive requests must share to form a DT sample (key, pipeline, scheme)
    #[arg(long, global = true)]
    grouping: Option<String>,

    /// Ignore inter-arrival gaps longer than this many seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    max_gap: Option<f64>,

    /// How records are attributed to eviction schemes
    #[arg(long, value_enum, default_value = "pipeline", global = true)]
    classifier: ClassifierArg,
}

/// Subcommands for the CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// Peak (95th percentile) DT per eviction scheme
    Peak {
        /// Trace file, or a directory holding one
        path: PathBuf,

        /// Export results to CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },

    /// Median DT over time
    Median {
        /// Trace file, or a directory holding one
        path: PathBuf,

        /// Bucket width in seconds
        #[arg(long)]
        bucket_width: Option<f64>,

        /// Gaussian smoothing sigma, in buckets
        #[arg(long, value_name = "SIGMA")]
        smooth: Option<f64>,

        /// Export results to CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },

    /// Per-group peak DT binned by mean gap (tau) or access rate (alpha-tti)
    Bins {
        /// Trace file, or a directory holding one
        path: PathBuf,

        /// Per-group statistic to bin on
        #[arg(long, value_enum, default_value = "tau")]
        statistic: StatisticArg,

        /// Number of equal-width bins
        #[arg(long, default_value_t = PeakBinning::DEFAULT_BINS)]
        bins: usize,

        /// Export results to CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },

    /// LRU hit rate for one cache size
    HitRate {
        /// Trace file, or a directory holding one
        path: PathBuf,

        /// Cache capacity in entries
        #[arg(long, conflicts_with = "bytes", required_unless_present = "bytes")]
        entries: Option<usize>,

        /// Cache capacity in bytes
        #[arg(long)]
        bytes: Option<u64>,

        /// Export results to CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },

    /// One metric across parameter-named subdirectories
    Sweep {
        /// Directory holding one subdirectory per configuration
        root: PathBuf,

        /// Built-in naming rule of the subdirectories
        #[arg(long, value_enum, conflicts_with = "label")]
        rule: Option<RuleArg>,

        /// Custom rule label: subdirectories are named <LABEL>_<number><unit>
        #[arg(long, required_unless_present = "rule")]
        label: Option<String>,

        /// Size unit of a custom rule (B, KB, MB, GB, TB)
        #[arg(long, requires = "label")]
        unit: Option<String>,

        /// Metric computed for every subdirectory
        #[arg(long, value_enum, default_value = "peak")]
        metric: MetricArg,

        /// Restrict DT metrics to one scheme (required for mean-group-peak)
        #[arg(long)]
        scheme: Option<String>,

        /// Capacity in entries for the hit-rate metric
        #[arg(long)]
        entries: Option<usize>,

        /// Divide every value by the value at this parameter
        #[arg(long, value_name = "VALUE")]
        normalize_to: Option<f64>,

        /// Process subdirectories on parallel threads
        #[arg(long)]
        parallel: bool,

        /// Export results to CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ClassifierArg {
    /// pipeline_id mod 3
    Pipeline,
    /// Scheme tag column when present, otherwise pipeline_id mod 3
    Tag,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatisticArg {
    /// Mean inter-arrival gap; mean peak per bin
    Tau,
    /// 1000 / mean gap in ms, outliers filtered; median peak per bin
    AlphaTti,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RuleArg {
    /// cache_<n>GB
    CacheSize,
    /// tau_dt_<n>
    TauDt,
    /// protected_cap_<n>
    ProtectedCap,
    /// alpha_tti_<n>
    AlphaTti,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MetricArg {
    Peak,
    Median,
    MeanGroupPeak,
    HitRate,
    /// Hit rate with the swept parameter as the cache size
    HitRateAtParameter,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings = settings.merged_with(Settings {
        time_unit: args.time_unit.clone(),
        format: args.format.clone(),
        max_entries: args.max_entries,
        trace_glob: args.trace_glob.clone(),
        grouping: args.grouping.clone(),
        max_gap_seconds: args.max_gap,
        ..Settings::default()
    });

    match args.classifier {
        ClassifierArg::Pipeline => run(args.command, &settings, PipelineModulo),
        ClassifierArg::Tag => run(args.command, &settings, TagThenPipeline),
    }
}

/// Initialize tracing, `RUST_LOG` overrides the default `info` level
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn run<C>(command: Commands, settings: &Settings, classifier: C) -> Result<(), Box<dyn std::error::Error>>
where
    C: SchemeClassifier + Sync,
{
    match command {
        Commands::Peak { path, output_csv } => {
            let config = settings.to_config(&path)?;
            let mut dt = DtAggregator::with_classifier(classifier, config.grouping)
                .with_max_gap(config.max_gap_seconds);
            read_records(&path, &config, |record| dt.observe(&record))?;

            let rows = report::peak_rows(&dt);
            report::print_peak_summary(&rows);
            export(&rows, output_csv.as_deref())
        }

        Commands::Median {
            path,
            bucket_width,
            smooth,
            output_csv,
        } => {
            let mut config = settings.to_config(&path)?;
            if let Some(width) = bucket_width {
                config = config.with_bucket_width(width);
            }
            if smooth.is_some() {
                config = config.with_smoothing(smooth);
            }
            config.validate()?;

            let mut dt = DtAggregator::with_classifier(classifier, config.grouping)
                .with_max_gap(config.max_gap_seconds);
            read_records(&path, &config, |record| dt.observe(&record))?;

            let mut series = dt.median_series(config.bucket_width_seconds);
            if let Some(sigma) = config.smoothing_sigma {
                series = series.smoothed(sigma);
            }
            let rows = report::median_rows(&series);
            report::print_median_summary(&rows, config.smoothing_sigma.is_some());
            if let Some((start, value)) = series.min_marker() {
                println!("\nMinimum median DT {value:.2} ms in bucket starting at {start:.1} s");
            }
            export(&rows, output_csv.as_deref())
        }

        Commands::Bins {
            path,
            statistic,
            bins,
            output_csv,
        } => {
            let config = settings.to_config(&path)?;
            let binning = match statistic {
                StatisticArg::Tau => PeakBinning::tau(),
                StatisticArg::AlphaTti => PeakBinning::alpha_tti(),
            }
            .with_bins(bins);
            let mut dt = DtAggregator::with_classifier(classifier, config.grouping)
                .with_max_gap(config.max_gap_seconds);
            read_records(&path, &config, |record| dt.observe(&record))?;

            let rows = report::bin_rows(&dt.binned_peaks(&binning), binning.statistic);
            report::print_bin_summary(&rows);
            export(&rows, output_csv.as_deref())
        }

        Commands::HitRate {
            path,
            entries,
            bytes,
            output_csv,
        } => {
            let config = settings.to_config(&path)?;
            let capacity = capacity_from_args(entries, bytes)?;
            let mut hits = HitRateAggregator::with_classifier(classifier, capacity);
            read_records(&path, &config, |record| hits.observe(&record))?;

            let rows = report::hit_rate_rows(&hits);
            report::print_hit_rate_summary(&rows);
            export(&rows, output_csv.as_deref())
        }

        Commands::Sweep {
            root,
            rule,
            label,
            unit,
            metric,
            scheme,
            entries,
            normalize_to,
            parallel,
            output_csv,
        } => {
            let config = settings.to_config(&root)?;
            let rule = build_rule(rule, label, unit)?;
            let scheme = scheme.map(|s| s.parse::<SchemeLabel>()).transpose()?;
            let metric = match metric {
                MetricArg::Peak => SweepMetric::PeakDt(scheme),
                MetricArg::Median => SweepMetric::MedianDt(scheme),
                MetricArg::MeanGroupPeak => SweepMetric::MeanGroupPeakDt(
                    scheme.ok_or("--scheme is required for the mean-group-peak metric")?,
                ),
                MetricArg::HitRate => SweepMetric::HitRate(capacity_from_args(entries, None)?),
                MetricArg::HitRateAtParameter => SweepMetric::HitRateAtParameter,
            };

            info!(root = %root.display(), label = rule.label(), %metric, parallel, "starting sweep");
            let collator = SweepCollator::with_classifier(config, classifier);
            let sweep = if parallel {
                collator.collect_parallel(&rule, &metric)?
            } else {
                collator.collect(&rule, &metric)?
            };

            let rows = report::sweep_rows(&sweep, &rule, &metric, normalize_to);
            report::print_sweep_summary(&rows, &sweep);
            export(&rows, output_csv.as_deref())
        }
    }
}

fn capacity_from_args(
    entries: Option<usize>,
    bytes: Option<u64>,
) -> Result<CacheCapacity, Box<dyn std::error::Error>> {
    match (entries, bytes) {
        (Some(n), _) => Ok(CacheCapacity::Entries(
            NonZeroUsize::new(n).ok_or("cache capacity must be at least one entry")?,
        )),
        (None, Some(n)) => Ok(CacheCapacity::Bytes(
            NonZeroU64::new(n).ok_or("cache capacity must be at least one byte")?,
        )),
        (None, None) => Err("a cache capacity is required (--entries or --bytes)".into()),
    }
}

fn build_rule(
    preset: Option<RuleArg>,
    label: Option<String>,
    unit: Option<String>,
) -> Result<ParameterRule, Box<dyn std::error::Error>> {
    let rule = match (preset, label) {
        (Some(RuleArg::CacheSize), _) => ParameterRule::cache_size_gb()?,
        (Some(RuleArg::TauDt), _) => ParameterRule::tau_dt()?,
        (Some(RuleArg::ProtectedCap), _) => ParameterRule::protected_cap()?,
        (Some(RuleArg::AlphaTti), _) => ParameterRule::alpha_tti()?,
        (None, Some(label)) => {
            let unit = unit.map(|u| u.parse::<SizeUnit>()).transpose()?;
            ParameterRule::new(label, unit)?
        }
        (None, None) => return Err("either --rule or --label is required".into()),
    };
    Ok(rule)
}

fn export<R: serde::Serialize>(rows: &[R], path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(csv_path) = path {
        report::export_csv(rows, csv_path)?;
        println!("\nResults exported to: {}", csv_path.display());
    }
    Ok(())
}
