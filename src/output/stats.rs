//! Progress reports for the command line
//!
//! Every function here prints one projection produced by the crawl service
//! to stdout in a formatted manner.

use crate::crawler::{CrawlProjection, HealthReport, RecoveryReport, ResultsPage};
use crate::resolver::Address;
use crate::storage::WorkerRecord;

/// Single-line rendering of an address, most specific part first
pub fn format_address(address: &Address) -> String {
    let city = match (&address.city, &address.state) {
        (Some(city), Some(state)) => Some(format!("{}/{}", city, state)),
        (Some(city), None) => Some(city.clone()),
        (None, Some(state)) => Some(state.clone()),
        (None, None) => None,
    };

    [
        address.street.clone(),
        address.complement.clone(),
        address.neighborhood.clone(),
        city,
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Prints the progress of one crawl
pub fn print_crawl(crawl: &CrawlProjection) {
    println!("=== Crawl {} ===\n", crawl.id);

    println!("Range: {} - {}", crawl.range_start, crawl.range_end);
    println!("Status: {}", crawl.status);
    println!();

    println!("Progress:");
    println!("  Total units: {}", crawl.total_units);
    println!(
        "  Processed: {} ({:.1}%)",
        crawl.processed_units,
        crawl.percent_complete()
    );
    println!("  Found: {}", crawl.success_units);
    println!("  Not found: {}", crawl.failed_units);

    let pending = crawl.total_units.saturating_sub(crawl.processed_units);
    if pending > 0 {
        println!("  Pending: {}", pending);
    }
}

/// Prints one page of results
pub fn print_results(page: &ResultsPage) {
    let pages = if page.total == 0 {
        1
    } else {
        page.total.div_ceil(u64::from(page.page_size))
    };
    println!(
        "=== Results (page {} of {}, {} total) ===\n",
        page.page, pages, page.total
    );

    if page.items.is_empty() {
        println!("  No results match");
        return;
    }

    for item in &page.items {
        let detail = match (&item.payload, &item.error_message) {
            (Some(address), _) => format_address(address),
            (None, Some(message)) => message.clone(),
            (None, None) => String::new(),
        };
        println!("  {}  {:<7}  {}", item.postal_code, item.status, detail);
    }
}

/// Prints the processes seen within the liveness window
pub fn print_workers(workers: &[WorkerRecord]) {
    println!("Active Workers ({}):", workers.len());
    for worker in workers {
        println!(
            "  - {} on {} [{}] config {} last seen {}",
            worker.id,
            worker.hostname,
            worker.role,
            &worker.config_hash[..worker.config_hash.len().min(12)],
            worker.last_seen
        );
    }
}

/// Prints the liveness snapshot
pub fn print_health(health: &HealthReport) {
    println!("Status: {} ({})", health.status, health.timestamp);
    println!("Queue:");
    println!("  Visible: {}", health.queue.visible);
    println!("  In flight: {}", health.queue.in_flight);
    println!("  Dead-lettered: {}", health.queue.dead_lettered);
    println!("Active workers: {}", health.active_workers);
}

/// Prints the outcome of a recovery sweep
pub fn print_recovery(report: &RecoveryReport) {
    println!("=== Recovery Sweep ===\n");
    println!("  Crawls examined: {}", report.examined);
    println!("  Skipped (cooldown): {}", report.skipped);
    println!("  Units re-enqueued: {}", report.requeued);
    println!("  Crawls settled: {}", report.settled);
    if report.failed > 0 {
        println!("  Crawls failed to recover: {}", report.failed);
    }
}
