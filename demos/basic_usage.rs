// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic config-sync usage example.
//!
//! Demonstrates:
//! 1. Wiring an engine over the in-memory store
//! 2. Reading defaults for a fresh device
//! 3. Partial updates, including a rejected overflow
//! 4. The optimistic-lock asymmetry
//! 5. The deprecation shim and version-aware flag interpretation
//! 6. Reset-to-defaults
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use config_sync::{EngineOptions, InMemoryConfigStore, SyncEngine, ROTATION_ADJUSTMENT_FLAG};
use serde_json::{json, Map, Value};

fn obj(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             config-sync: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire an engine over the in-memory store
    // ─────────────────────────────────────────────────────────────────────────
    let store = Arc::new(InMemoryConfigStore::with_devices([42]));
    let engine = SyncEngine::new(store, EngineOptions::default());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. First read materializes schema defaults
    // ─────────────────────────────────────────────────────────────────────────
    let record = engine.read(42).await?;
    println!("defaults: {}", serde_json::to_string_pretty(&record)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Partial updates
    // ─────────────────────────────────────────────────────────────────────────
    let updated = engine
        .update(42, &obj(json!({"network_not_found_timer": 20})), None)
        .await?;
    println!(
        "timer now: {:?}",
        updated.integer("network_not_found_timer")
    );

    // Overflow is rejected with a typed error, never truncated.
    let err = engine
        .update(42, &obj(json!({"network_not_found_timer": 9e18})), None)
        .await
        .unwrap_err();
    println!("overflow rejected: {err}");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Lock asymmetry
    // ─────────────────────────────────────────────────────────────────────────
    let live = engine.read(42).await?;
    let stale = config_sync::VersionToken(live.updated_at.as_millis() - 1000);

    // Single-field write with a stale token: allowed.
    engine
        .update(42, &obj(json!({"os_auto_update": false})), Some(stale))
        .await?;
    println!("single-field write with stale token: ok");

    // Multi-field write with the same stale token: conflict.
    let err = engine
        .update(
            42,
            &obj(json!({"os_auto_update": true, "firmware_hardware": "arduino"})),
            Some(stale),
        )
        .await
        .unwrap_err();
    println!("multi-field write with stale token: {err}");

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Deprecation shim + version-aware interpretation
    // ─────────────────────────────────────────────────────────────────────────
    let shimmed = engine
        .update(42, &obj(json!({"disable_factory_reset": false})), None)
        .await?;
    println!(
        "wrote disable_factory_reset=false, stored auto_factory_reset={:?}, legacy view={:?}",
        shimmed.flag("auto_factory_reset"),
        shimmed.flag("disable_factory_reset"),
    );

    let adapter = engine.version_adapter();
    for version in ["1.0.13", "1.0.15", ""] {
        println!(
            "rotation flag raw=true on firmware {version:?} -> effective {}",
            adapter.interpret(ROTATION_ADJUSTMENT_FLAG, version, true)
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Reset (delete-is-reset)
    // ─────────────────────────────────────────────────────────────────────────
    let fresh = engine.reset(42).await?;
    println!(
        "after reset: timer={:?}, os_auto_update={:?}",
        fresh.integer("network_not_found_timer"),
        fresh.flag("os_auto_update"),
    );

    Ok(())
}
