use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use wordlist_sort::{Config, FrequencyMode, SortError, Sorter, Summary};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let config = build_config(&arg_parser);
    let inputs = expand_inputs(
        arg_parser
            .values_of("input")
            .expect("value is required")
            .map(PathBuf::from),
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupted.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed)) {
        log::warn!("interrupt handler not installed: {}", err);
    }

    let started = Instant::now();
    // the sorter returns before exiting so scratch runs are always cleaned up
    let result = Sorter::new(config).with_interrupt(interrupted).sort(&inputs);

    match result {
        Ok(summary) => report(&summary, started.elapsed()),
        Err(SortError::Interrupted) => {
            log::warn!("interrupted, exiting");
            process::exit(130);
        }
        Err(SortError::NoInput) => {
            log::error!("no input records found, exiting");
            process::exit(1);
        }
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }
}

fn build_config(arg_parser: &clap::ArgMatches) -> Config {
    let output = arg_parser.value_of("output").expect("value has default");
    let split_size = arg_parser.value_of("split_size").expect("value has default");
    let chunk_size = arg_parser.value_of("chunk_size").expect("value has default");

    let frequency = if arg_parser.is_present("freq_count") {
        FrequencyMode::CountShown
    } else if arg_parser.is_present("freq") {
        FrequencyMode::CountOnly
    } else {
        FrequencyMode::Off
    };
    let frequency_minimum: u64 = arg_parser.value_of_t_or_exit("freq_min");

    if frequency.is_enabled() && arg_parser.is_present("keep_duplicates") {
        log::warn!("duplicate removal setting is ignored in frequency mode");
    }

    let mut config = Config::new(output)
        .with_duplicate_removal(!arg_parser.is_present("keep_duplicates"))
        .with_split_size(split_size.parse::<ByteSize>().expect("value is pre-validated").as_u64())
        .with_chunk_size(chunk_size.parse::<ByteSize>().expect("value is pre-validated").as_u64())
        .with_strip_whitespace(!arg_parser.is_present("no_strip"))
        .with_frequency(frequency, frequency_minimum)
        .with_delete_input_after_read(arg_parser.is_present("delete_input"));

    if let Some(tmp_dir) = arg_parser.value_of("tmp_dir") {
        config = config.with_tmp_dir(Path::new(tmp_dir));
    }

    log::debug!("{:?}", config);

    return config;
}

/// Replaces every directory with the entries it contains, sorted by name. Nested directories are
/// passed on as they are and skipped by the sorter.
fn expand_inputs(paths: impl Iterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut inputs = Vec::new();

    for path in paths {
        if !path.is_dir() {
            inputs.push(path);
            continue;
        }

        match fs::read_dir(&path) {
            Ok(entries) => {
                let mut entries: Vec<PathBuf> = entries.filter_map(|entry| entry.ok()).map(|e| e.path()).collect();
                entries.sort();
                log::debug!("{}: {} entries", path.display(), entries.len());
                inputs.extend(entries);
            }
            Err(err) => {
                log::warn!("directory {} not listed: {}", path.display(), err);
                inputs.push(path);
            }
        }
    }

    return inputs;
}

fn report(summary: &Summary, elapsed: Duration) {
    log::info!("finished in {:.2?}", elapsed);
    log::info!(
        "{} files loaded, {} skipped, {} records read in {} runs",
        summary.files_loaded,
        summary.files_skipped,
        summary.records_read,
        summary.runs
    );
    log::info!(
        "{} records written to {} files",
        summary.records_written,
        summary.segments.len()
    );
    if summary.duplicates_removed > 0 {
        log::info!("duplicates removed: {}", summary.duplicates_removed);
    }
    if summary.frequency_evicted > 0 {
        log::warn!(
            "{} low frequency entries evicted to stay within the chunk size",
            summary.frequency_evicted
        );
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn validate_size(v: &str) -> Result<(), String> {
    match v.parse::<ByteSize>() {
        Ok(size) if size.as_u64() > 0 => Ok(()),
        Ok(_) => Err(String::from("size must be greater than zero")),
        Err(err) => Err(format!("size format incorrect: {}", err)),
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("wordlist-sort")
        .about("sorts and deduplicates large line-oriented text files using bounded memory")
        .arg(
            clap::Arg::new("input")
                .help("files to be sorted, directories are expanded to the files they contain")
                .required(true)
                .takes_value(true)
                .multiple_values(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file, split parts get a numeric suffix")
                .takes_value(true)
                .default_value("sorted.dat"),
        )
        .arg(
            clap::Arg::new("keep_duplicates")
                .short('d')
                .long("keep-duplicates")
                .help("do not remove duplicate lines"),
        )
        .arg(
            clap::Arg::new("split_size")
                .short('s')
                .long("split")
                .help("maximum size of a single result file, e.g. 100MiB")
                .takes_value(true)
                .default_value("1GiB")
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk")
                .help("amount of line data sorted in memory at once")
                .takes_value(true)
                .default_value("75MiB")
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("no_strip")
                .short('w')
                .long("no-strip")
                .help("keep leading and trailing whitespace of each line"),
        )
        .arg(
            clap::Arg::new("freq")
                .long("freq")
                .help("sort lines by how often they appear, most frequent first")
                .conflicts_with("freq_count"),
        )
        .arg(
            clap::Arg::new("freq_count")
                .long("freq-count")
                .help("same as --freq, each line is prefixed with its count"),
        )
        .arg(
            clap::Arg::new("freq_min")
                .long("freq-min")
                .help("minimum number of times a line must appear to be kept in frequency mode")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            clap::Arg::new("delete_input")
                .long("delete-input")
                .help("delete each input file once it has been read (irreversible)"),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('t')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
