//! Routing scenarios using Cucumber.
//!
//! Chains are built through the configurer against an in-memory broker and
//! failures are resolved directly, without consuming any records.
//!
//! ```bash
//! cargo test --test routing
//! ```

mod steps;

use cucumber::World;
use steps::RoutingWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Topology Scenarios ===\n");
    RoutingWorld::cucumber()
        .fail_on_skipped()
        .run("tests/routing/features/topology.feature")
        .await;

    println!("\n=== Running Resolution Scenarios ===\n");
    RoutingWorld::cucumber()
        .fail_on_skipped()
        .run("tests/routing/features/resolution.feature")
        .await;
}
