use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use takeout_organizer::config::{AlbumBehavior, Configuration, DateDivision, ExtensionFixing};
use takeout_organizer::display;
use takeout_organizer::model::ProcessingResult;
use takeout_organizer::pipeline;

#[derive(Parser)]
#[command(name = "takeout-organizer", version, about = "Organizes a Google Photos Takeout export into a dated, deduplicated output tree")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full 8-stage pipeline against a Takeout export
    Run {
        /// Directory containing the extracted Takeout export
        input: PathBuf,
        /// Directory the organized output tree is written into
        output: PathBuf,
        /// How album membership is expressed in the output tree
        #[arg(long, value_enum, default_value_t = AlbumBehavior::Shortcut)]
        album_behavior: AlbumBehavior,
        /// Date-based subdirectory nesting under ALL_PHOTOS / PARTNER_SHARED
        #[arg(long, value_enum, default_value_t = DateDivision::Year)]
        date_division: DateDivision,
        /// How aggressively mismatched file extensions are corrected
        #[arg(long, value_enum, default_value_t = ExtensionFixing::Standard)]
        extension_fixing: ExtensionFixing,
        /// Don't write EXIF date/GPS tags back into output files
        #[arg(long)]
        no_exif: bool,
        /// Set filesystem creation time on placed files (Windows only)
        #[arg(long)]
        update_creation_time: bool,
        /// Skip non-media "extra" files (e.g. print-size, edited variants) entirely
        #[arg(long)]
        skip_extras: bool,
        /// Hash only the first 2MiB of each file when deduping, instead of the whole file
        #[arg(long)]
        fast_hash: bool,
        /// Reject files above this many bytes instead of processing them
        #[arg(long)]
        max_file_size: Option<u64>,
        /// Rewrite Pixel motion-photo containers' extensions during stage 1
        #[arg(long)]
        transform_pixel_motion_photos: bool,
        /// Scan and report what would happen, without touching the output tree
        #[arg(long)]
        dry_run: bool,
        /// Print per-file progress instead of a summary
        #[arg(long)]
        verbose: bool,
        /// Print the run summary as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },
    /// Scan a Takeout export and report what a run would do, without writing anything
    Check {
        /// Directory containing the extracted Takeout export
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            display::print_header("takeout-organizer");
            display::print_info(&format!("v{}", env!("CARGO_PKG_VERSION")));
            display::print_info("Organizes a Google Photos Takeout export into a dated, deduplicated output tree");
            println!();
            display::print_info("Run 'takeout-organizer --help' for usage");
        }
        Some(Commands::Run {
            input,
            output,
            album_behavior,
            date_division,
            extension_fixing,
            no_exif,
            update_creation_time,
            skip_extras,
            fast_hash,
            max_file_size,
            transform_pixel_motion_photos,
            dry_run,
            verbose,
            json,
        }) => {
            let config = Configuration {
                album_behavior,
                date_division,
                extension_fixing,
                write_exif: !no_exif,
                update_creation_time,
                skip_extras,
                verbose,
                enforce_max_file_size: max_file_size.is_some(),
                max_file_size: max_file_size.unwrap_or(Configuration::default().max_file_size),
                limit_file_size: max_file_size.is_some(),
                transform_pixel_motion_photos,
                fast_hash,
                dry_run,
                ..Configuration::default()
            };
            cmd_run(&input, &output, &config, json)?;
        }
        Some(Commands::Check { input }) => cmd_check(&input)?,
    }

    Ok(())
}

fn cmd_run(input: &PathBuf, output: &PathBuf, config: &Configuration, json: bool) -> Result<()> {
    if !input.is_dir() {
        bail!("input directory does not exist: {}", input.display());
    }

    if config.dry_run {
        display::print_header(&format!("Dry run — scanning {}", input.display()));
    } else {
        display::print_header(&format!("Processing {} -> {}", input.display(), output.display()));
    }

    let pb = if config.verbose || json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message("running pipeline...");
        pb
    };

    let started = Instant::now();
    let generated_at = chrono::Utc::now().to_rfc3339();
    let result = pipeline::run(input, output, config, &generated_at).context("pipeline run failed")?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_result(&result, config.verbose);
    display::print_info(&format!("Elapsed: {:.1}s", started.elapsed().as_secs_f64()));

    Ok(())
}

fn cmd_check(input: &PathBuf) -> Result<()> {
    if !input.is_dir() {
        bail!("input directory does not exist: {}", input.display());
    }

    display::print_header(&format!("Checking {}", input.display()));

    let mut config = Configuration::default();
    config.dry_run = true;
    let result = pipeline::run(input, &PathBuf::from("."), &config, &chrono::Utc::now().to_rfc3339())
        .context("scan failed")?;

    print_result(&result, false);
    display::print_info("No files were moved, copied, or modified.");

    Ok(())
}

fn print_result(result: &ProcessingResult, verbose: bool) {
    for stage in &result.stage_summaries {
        if stage.skipped {
            if verbose {
                display::print_info(&format!("{}: skipped", stage.name));
            }
            continue;
        }
        if stage.success {
            display::print_success(&format!("{} ({}ms): {}", stage.name, stage.duration_ms, stage.message));
        } else {
            display::print_error(&format!("{}: {}", stage.name, stage.message));
        }
    }

    println!();
    display::print_info(&format!("Duplicates removed: {}", result.duplicates_removed));
    display::print_info(&format!("Extras skipped: {}", result.extras_skipped));
    display::print_info(&format!("Extensions fixed: {}", result.extensions_fixed));
    display::print_info(&format!(
        "Files moved: {} | copied: {} | shortcut: {}",
        result.files_moved, result.files_copied, result.files_shortcut
    ));
    display::print_info(&format!(
        "EXIF written: {} datetimes, {} coordinates",
        result.datetimes_written, result.coordinates_written
    ));
    if result.creation_times_updated > 0 {
        display::print_info(&format!("Creation times updated: {}", result.creation_times_updated));
    }
    if !result.extraction_histogram.is_empty() {
        let mut methods: Vec<_> = result.extraction_histogram.iter().collect();
        methods.sort_by_key(|(name, _)| (*name).clone());
        let breakdown = methods.iter().map(|(name, count)| format!("{name}={count}")).collect::<Vec<_>>().join(", ");
        display::print_info(&format!("Date extraction: {breakdown}"));
    }

    if result.stage_summaries.iter().any(|s| !s.success) {
        display::print_warning("One or more stages reported failures; see messages above");
    } else {
        display::print_success("Run complete");
    }
}
