mod pse;
mod risk;
mod server;

use anyhow::Result;
use chrono::Local;

use crate::pse::{PseClient, PseConfig};
use crate::risk::RiskScorer;
use crate::risk::telemetry::{build_day_telemetry, score_day};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = PseConfig::default();

    if std::env::args().any(|arg| arg == "serve") {
        return server::start_server(config).await;
    }

    let client = PseClient::new(config);
    let scorer = RiskScorer::new();
    let today = Local::now().date_naive();

    println!("=== Redispatch Risk Report for {} ===\n", today.format("%Y-%m-%d"));

    let (load, generation, reserves) = tokio::join!(
        client.system_load(None, false),
        client.pv_generation(None, false),
        client.reserve_margins(1, false),
    );

    println!(
        "Data origins: load={:?} generation={:?} reserves={:?}\n",
        load.origin, generation.origin, reserves.origin
    );

    let telemetry = build_day_telemetry(today, &load.data, &generation.data, &reserves.data);
    let risks = score_day(&scorer, today, &telemetry);

    println!("Hour | Load (MW) |   PV (MW) | Score | Level");
    println!("-----+-----------+-----------+-------+---------");
    for (t, risk) in telemetry.iter().zip(&risks) {
        println!(
            "  {:02} | {:9.0} | {:9.0} |   {:3} | {:?}",
            t.hour,
            t.system_load,
            t.pv_generation,
            risk.assessment.total_score,
            risk.assessment.risk_level
        );
    }

    // Surface the worst hour with its advisories.
    if let Some(worst) = risks.iter().max_by_key(|r| r.assessment.total_score) {
        println!(
            "\nHighest risk at {:02}:00 (score {}, {:?})",
            worst.hour, worst.assessment.total_score, worst.assessment.risk_level
        );
        for recommendation in &worst.assessment.recommendations {
            println!("  - {recommendation}");
        }
    }

    let events = client.redispatch_events(30, false).await;
    println!("\n=== Redispatch Events (last 30 days) ===");
    println!("Total: {} (origin: {:?})", events.data.len(), events.origin);
    for event in events.data.iter().take(5) {
        println!(
            "  {} | {} | {:.1} MW curtailed | {} min | {:?}",
            event.from_time.format("%Y-%m-%d %H:%M"),
            event.resource_name,
            event.power_reduction,
            event.duration_min,
            event.severity
        );
    }

    let stats = client.stats().await;
    println!(
        "\nClient stats: {} requests, {} cached entries, online={}",
        stats.request_count, stats.cache_size, stats.online
    );

    Ok(())
}
