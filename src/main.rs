mod alert;
mod artifacts;
mod browser;
mod config;
mod detail;
mod history;
mod listing;
mod models;
mod notify;
mod pacing;
mod poller;
mod proxy;
mod selectors;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alert::{AlertFormatter, truncate};
use browser::ChromeFetcher;
use config::{Config, WatchArgs};
use detail::DetailExtractor;
use history::JobHistory;
use listing::ListingExtractor;
use models::JobRecord;
use notify::TelegramNotifier;
use poller::Poller;

#[derive(Parser)]
#[command(name = "jobwatch")]
#[command(about = "Watch job search pages and send an alert for every new posting")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    watch: WatchArgs,

    /// Defaults to `run`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Poll the search pages until interrupted
    Run,

    /// Run a single round and exit
    Once,

    /// Run the extractors over a saved HTML page
    Parse {
        /// Saved HTML file
        file: PathBuf,

        /// Treat the file as a job posting page instead of search results
        #[arg(long)]
        detail: bool,
    },

    /// Show the seen-job store
    History {
        /// Print every tracked job uid
        #[arg(short, long)]
        list: bool,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "jobwatch=debug" } else { "jobwatch=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut poller = build_poller(Config::from_args(cli.watch)?)?;
            poller.run();
        }

        Commands::Once => {
            let mut poller = build_poller(Config::from_args(cli.watch)?)?;
            let report = poller.run_round();
            println!(
                "Checked {} search pages ({} failed): {} listed, {} new, {} already seen",
                report.targets, report.failed_targets, report.listed, report.new_jobs, report.already_seen
            );
            if report.delivery_failures > 0 {
                println!("{} alerts could not be delivered", report.delivery_failures);
            }
            println!("Now tracking {} jobs", poller.history().len());
        }

        Commands::Parse { file, detail } => {
            let html = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if detail {
                print_detail(&html)?;
            } else {
                print_listing(&html, &cli.watch.site_base_url)?;
            }
        }

        Commands::History { list } => {
            let path = cli.watch.history_file.unwrap_or_else(config::default_history_file);
            let history = JobHistory::load(&path);
            if history.is_empty() {
                println!("No jobs tracked yet in {}", history.path().display());
                return Ok(());
            }
            println!("{} jobs tracked in {}", history.len(), history.path().display());
            if list {
                for uid in history.uids() {
                    println!("  {}", uid);
                }
            }
        }
    }

    Ok(())
}

fn build_poller(config: Config) -> Result<Poller<ChromeFetcher, TelegramNotifier>> {
    info!(
        "Watching {} search pages, {} proxies configured",
        config.search_urls.len(),
        config.proxies.len()
    );

    let history = JobHistory::load(&config.history_file);
    let fetcher = ChromeFetcher::new(config.browser_settings(), config.pacing());
    let notifier = TelegramNotifier::new(config.bot_token.clone(), config.chat_id.clone())
        .context("Failed to create Telegram client")?;

    Poller::new(&config, fetcher, notifier, history, config.pacing())
}

fn print_listing(html: &str, base_url: &str) -> Result<()> {
    let jobs = ListingExtractor::new(base_url)?.extract(html);
    if jobs.is_empty() {
        println!("No job tiles found.");
        return Ok(());
    }

    println!("{:<22} {:<40} {:<26} {}", "UID", "TITLE", "BUDGET", "POSTED");
    println!("{}", "-".repeat(100));
    for job in jobs {
        println!(
            "{:<22} {:<40} {:<26} {}",
            truncate(&job.job_uid, 19),
            truncate(&job.title, 37),
            truncate(&job.budget.to_string(), 23),
            job.posted_time
        );
    }
    Ok(())
}

fn print_detail(html: &str) -> Result<()> {
    let mut job = JobRecord::default();
    DetailExtractor::new()?.merge(html, &mut job);
    if !job.full_details_fetched {
        println!("Page is empty.");
        return Ok(());
    }
    println!("{}", AlertFormatter::default().format(&job));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_runs_the_loop() {
        let cli = Cli::try_parse_from(["jobwatch"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.command.unwrap_or(Commands::Run), Commands::Run);
    }

    #[test]
    fn test_watch_flags_reach_subcommands() {
        let cli = Cli::try_parse_from([
            "jobwatch",
            "once",
            "--search-urls",
            r#"["https://www.upwork.com/nx/search/jobs/?q=rust"]"#,
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Once));
        assert!(cli.verbose);
        assert_eq!(cli.watch.search_urls.map(|urls| urls.0.len()), Some(1));
    }

    #[test]
    fn test_history_reads_store_path_flag() {
        let cli = Cli::try_parse_from(["jobwatch", "history", "--list", "--history-file", "/tmp/seen.json"]).unwrap();
        assert_eq!(cli.command, Some(Commands::History { list: true }));
        assert_eq!(cli.watch.history_file, Some(PathBuf::from("/tmp/seen.json")));
    }
}
