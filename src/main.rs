mod browser;
mod config;
mod detector;
mod error;
mod harvest;
mod parser;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::Settings;
use crate::detector::Outcome;

#[derive(Parser)]
#[command(name = "school_harvester", about = "Harvest school listings from a map search feed")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the search feed to its end, extract listings, merge into the store
    Run {
        /// Free-text search, e.g. "primary and secondary schools in nigeria"
        query: String,
        /// Store file (default: schools.json)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Stop polling after this many scroll cycles
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Stop polling after this many seconds
        #[arg(long)]
        max_duration: Option<u64>,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },
    /// Extract listings from a saved page and merge them into the store
    Extract {
        /// Saved HTML of a fully loaded results page
        html: PathBuf,
        #[arg(long)]
        store: Option<PathBuf>,
        /// Print what would be extracted without touching the store
        #[arg(long)]
        dry_run: bool,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Stored schools table, best rated first
    Overview {
        /// Filter by category substring (e.g. "primary")
        #[arg(short, long)]
        category: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let result = execute(cli).await;

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load()?;

    match cli.command {
        Commands::Run {
            query,
            store,
            max_cycles,
            max_duration,
            headful,
        } => {
            if let Some(p) = store {
                settings.store_path = p;
            }
            if max_cycles.is_some() {
                settings.max_cycles = max_cycles;
            }
            if max_duration.is_some() {
                settings.max_duration_secs = max_duration;
            }
            if headful {
                settings.headless = false;
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping");
                    on_signal.cancel();
                }
            });

            harvest::run(&query, &settings, &cancel).await.map(|summary| {
                match summary.outcome {
                    Outcome::NoFeed => println!("No feed container on the page."),
                    Outcome::Settled(r) => println!(
                        "Feed loaded: {} cycles, {} quiet waits, {} growths, extent {}px",
                        r.cycles, r.quiet_waits, r.growths, r.extent
                    ),
                    Outcome::CapReached(r) => println!(
                        "Feed still growing after {} cycles (cap reached), extent {}px",
                        r.cycles, r.extent
                    ),
                    Outcome::Cancelled(_) => {}
                }
                print_merge(summary.candidates, summary.merge.as_ref());
            })
        }
        Commands::Extract {
            html,
            store,
            dry_run,
        } => {
            let store = store.unwrap_or(settings.store_path);
            std::fs::read_to_string(&html)
                .with_context(|| format!("Failed to read {}", html.display()))
                .and_then(|content| harvest::from_snapshot(&content, &store, dry_run))
                .map(|(schools, merge)| {
                    if dry_run {
                        for s in &schools {
                            println!(
                                "{:<20} | {:<32} | {}",
                                truncate(s.identity.as_str(), 20),
                                truncate(&s.display_name, 32),
                                s.category.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    print_merge(schools.len(), merge.as_ref());
                })
        }
        Commands::Stats { store } => {
            let store = store.unwrap_or(settings.store_path);
            store::load(&store).map_err(anyhow::Error::from).map(|schools| {
                let s = store::get_stats(&schools);
                println!("Total:     {}", s.total);
                println!("Resolved:  {}", s.resolved);
                println!("Unresolved: {}", s.total - s.resolved);
                println!("Rated:     {}", s.rated);
                println!("Phone:     {}", s.with_phone);
                println!("Website:   {}", s.with_website);
                match s.average_stars {
                    Some(avg) => println!("Avg stars: {:.2}", avg),
                    None => println!("Avg stars: -"),
                }
            })
        }
        Commands::Overview {
            category,
            limit,
            store,
        } => {
            let store = store.unwrap_or(settings.store_path);
            store::load(&store).map_err(anyhow::Error::from).map(|schools| {
                let rows = store::overview(&schools, category.as_deref(), limit);
                if rows.is_empty() {
                    println!("No schools found.");
                    return;
                }

                println!(
                    "{:>3} | {:<32} | {:<20} | {:>5} | {:>7} | {:<16}",
                    "#", "School", "Category", "Stars", "Reviews", "Phone"
                );
                println!("{}", "-".repeat(97));

                for (i, r) in rows.iter().enumerate() {
                    let stars = r.star_rating.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".into());
                    let reviews = r.review_count.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
                    println!(
                        "{:>3} | {:<32} | {:<20} | {:>5} | {:>7} | {:<16}",
                        i + 1,
                        truncate(&r.display_name, 32),
                        truncate(r.category.as_deref().unwrap_or("-"), 20),
                        stars,
                        reviews,
                        truncate(r.phone.as_deref().unwrap_or("-"), 16),
                    );
                }

                println!("\n{} of {} schools", rows.len(), schools.len());
            })
        }
    }
}

fn print_merge(candidates: usize, merge: Option<&store::MergeOutcome>) {
    match merge {
        Some(m) => println!(
            "{} listings: {} added, {} already stored, {} total.",
            candidates,
            m.added,
            m.skipped,
            m.schools.len()
        ),
        None => println!("{} listings, store not written.", candidates),
    }
}

/// Fit `s` into a table column of `width` chars, marking cuts with `…`.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Runs are bounded by the polling cap, so minutes are the largest unit.
fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn truncated_cells_keep_column_width() {
        assert_eq!(truncate("Greenfield College", 32), "Greenfield College");
        let cell = truncate("Greenfield International Secondary School", 20);
        assert_eq!(cell.chars().count(), 20);
        assert!(cell.ends_with('…'));
        assert_eq!(truncate("abc", 0), "…");
    }

    #[test]
    fn durations_read_as_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_millis(4500)), "4.5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(4000)), "66m 40s");
    }
}
