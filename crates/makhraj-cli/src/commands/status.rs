use anyhow::Result;
use colored::Colorize;
use makhraj_cache::TieredCache;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::output::{print_pairs, print_success, print_value, print_warning};

pub async fn stats(cache: &TieredCache, format: OutputFormat) -> Result<()> {
    let stats = cache.stats();
    let secondary = cache.secondary_info().await;

    if matches!(format, OutputFormat::Table) {
        let entries = secondary
            .entries
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        print_pairs(&[
            ("Mode", stats.mode.clone()),
            ("Namespace", stats.namespace.clone()),
            ("Local entries", stats.local_entries.to_string()),
            ("Hits", stats.hits.to_string()),
            ("Misses", stats.misses.to_string()),
            ("Hit rate", format!("{:.1}%", stats.hit_rate())),
            ("Secondary tier", secondary.kind.unwrap_or("none").to_string()),
            ("Connected", secondary.connected.to_string()),
            ("Secondary entries", entries),
        ]);
    } else {
        let hit_rate = stats.hit_rate();
        print_value(
            &json!({
                "stats": stats,
                "hitRate": hit_rate,
                "secondary": secondary,
            }),
            format,
        );
    }
    Ok(())
}

pub async fn ping(cache: &TieredCache) -> Result<()> {
    let info = cache.secondary_info().await;
    match info.kind {
        None => {
            print_warning(&format!(
                "No secondary tier configured ({} mode)",
                cache.stats().mode
            ));
            Ok(())
        }
        Some(kind) if info.connected => {
            print_success(&format!("{} tier is {}", kind.cyan(), "reachable".green()));
            Ok(())
        }
        Some(kind) => anyhow::bail!("{kind} tier is not reachable"),
    }
}
