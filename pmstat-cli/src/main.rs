use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use pmstat_common::Config;
use pmstat_core::{
    export_json, map_stream, reduce_stream, run_path, write_chart, write_json, write_report,
    write_run_summary, JobKind, JobReport, MergeShape, Normalizer,
};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum JobArg {
    Stddev,
    Skewness,
    Minmax,
    Median,
    Percentile90,
}

impl From<JobArg> for JobKind {
    fn from(j: JobArg) -> Self {
        match j {
            JobArg::Stddev => JobKind::StdDev,
            JobArg::Skewness => JobKind::Skewness,
            JobArg::Minmax => JobKind::MinMax,
            JobArg::Median => JobKind::Median,
            JobArg::Percentile90 => JobKind::Percentile90,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum MergeArg {
    Fold,
    Tree,
}

impl From<MergeArg> for MergeShape {
    fn from(m: MergeArg) -> Self {
        match m {
            MergeArg::Fold => MergeShape::Fold,
            MergeArg::Tree => MergeShape::Tree,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "pmstat", version, about = "Mergeable statistics over partitioned air-quality data")]
struct Cli {
    /// Lower clamp of the histogram domain
    #[arg(long, global = true, allow_negative_numbers = true)]
    min_value: Option<f64>,
    /// Upper clamp of the histogram domain
    #[arg(long, global = true, allow_negative_numbers = true)]
    max_value: Option<f64>,
    /// Histogram resolution
    #[arg(long, global = true)]
    buckets: Option<usize>,
    /// Name of the measurement column
    #[arg(long, global = true)]
    column: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit merge records for one partition (stdin or file)
    Map {
        job: JobArg,
        input: Option<PathBuf>,
        /// Pre-aggregate the partition before emitting
        #[arg(long)]
        combine: bool,
    },
    /// Merge records from every mapper into the final report
    Reduce {
        job: JobArg,
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
        #[arg(long)]
        chart: bool,
    },
    /// Rescale the value column of header-less rows to [0, 1]
    Normalize {
        #[arg(allow_negative_numbers = true)]
        global_min: f64,
        #[arg(allow_negative_numbers = true)]
        global_max: f64,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Aggregate local partitions in parallel and merge in-process
    Run {
        job: JobArg,
        path: String,
        #[arg(long, value_enum, default_value = "fold")]
        merge: MergeArg,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        chart: bool,
    },
    /// Print the effective configuration
    Config {
        #[arg(long)]
        save: bool,
    },
}

fn open_input(path: Option<&PathBuf>) -> anyhow::Result<Box<dyn BufRead>> {
    Ok(match path {
        Some(p) => Box::new(BufReader::new(
            std::fs::File::open(p).with_context(|| format!("cannot open {}", p.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load().map_err(|e| anyhow::anyhow!("{e}"))?;
    if let Some(v) = cli.min_value {
        config.histogram.min_value = v;
    }
    if let Some(v) = cli.max_value {
        config.histogram.max_value = v;
    }
    if let Some(n) = cli.buckets {
        config.histogram.num_buckets = n;
    }
    if let Some(c) = &cli.column {
        config.input.value_column = c.clone();
    }
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    // stdout carries records and reports
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = effective_config(&cli)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Commands::Map { job, input, combine } => {
            map_stream(open_input(input.as_ref())?, &mut out, job.into(), &config, combine)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        Commands::Reduce { job, input, format, chart } => {
            let (report, stats) = reduce_stream(open_input(input.as_ref())?, job.into(), &config)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            if stats.format_errors > 0 {
                info!(format_errors = stats.format_errors, "malformed merge input skipped");
            }
            render(&mut out, &report, format, chart.then_some(config.report.chart_buckets))?;
        }
        Commands::Normalize { global_min, global_max, input } => {
            let normalizer = Normalizer::new(global_min, global_max, &config.input)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            normalizer.run(open_input(input.as_ref())?, &mut out).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        Commands::Run { job, path, merge, format, output, chart } => {
            let run = run_path(&path, job.into(), &config, merge.into())
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            write_run_summary(&mut io::stderr().lock(), &run).map_err(|e| anyhow::anyhow!("{e}"))?;
            match output {
                Some(o) => {
                    if let Some(parent) = o.parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent)?;
                        }
                    }
                    export_json(&o, &run).map_err(|e| anyhow::anyhow!("{e}"))?;
                    eprintln!("Exported to {}", o.display());
                }
                None => render(&mut out, &run.report, format, chart.then_some(config.report.chart_buckets))?,
            }
        }
        Commands::Config { save } => {
            if save {
                let path = config.save().map_err(|e| anyhow::anyhow!("{e}"))?;
                eprintln!("Saved to {}", path.display());
            }
            let text = config.to_toml().map_err(|e| anyhow::anyhow!("{e}"))?;
            write!(out, "{text}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn render<W: Write>(out: &mut W, report: &JobReport, format: Format, chart_rows: Option<usize>) -> anyhow::Result<()> {
    match format {
        Format::Json => write_json(out, report),
        Format::Text => write_report(out, report),
    }
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    if let (Some(rows), JobReport::Quantile { histogram: Some(h), target, .. }) = (chart_rows, report) {
        writeln!(out)?;
        write_chart(out, h, Some(target.bucket_index), rows).map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    Ok(())
}
