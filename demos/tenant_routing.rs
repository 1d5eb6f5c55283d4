//! Tenant Routing Example
//!
//! Resolves a few requests to their tenant stores and exercises the cache,
//! entirely in process. No Redis required.
//!
//! Run with: RUST_LOG=storefront_tenancy=debug cargo run --example tenant_routing

use std::time::Duration;
use storefront_tenancy::store::{MemoryConnector, MemoryTenantDirectory};
use storefront_tenancy::{
    CacheConfig, Keyspace, StoreConfig, TenancyError, TenancySystemBuilder, TenantRecord,
    TenantStatus,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Storefront Tenancy: Tenant Routing ===\n");

    // 1. Seed the default store's tenant directory
    let connector = MemoryConnector::new().with_latency(Duration::from_millis(20));
    let directory = connector.database("mem://default");
    directory.upsert_tenant(TenantRecord::new("acme", "mem://acme").with_display_name("Acme Ltd"));
    directory.upsert_tenant(
        TenantRecord::new("beta", "mem://beta").with_status(TenantStatus::Inactive),
    );

    let system = TenancySystemBuilder::new(connector, MemoryTenantDirectory)
        .with_store(StoreConfig {
            default_store_uri: "mem://default".to_string(),
            ..StoreConfig::default()
        })
        .with_cache_config(CacheConfig::disabled())
        .in_process_cache()
        .build();

    // 2. Route requests
    let requests: [&[(&str, &str)]; 4] = [
        &[("host", "acme.shop.example.com")],
        &[("x-tenant", "beta"), ("host", "acme.shop.example.com")],
        &[("host", "localhost:3000")],
        &[("host", "nobody.shop.example.com")],
    ];

    for headers in requests {
        let tenant = system.resolve_tenant(headers);
        match system.connection_for(headers).await {
            Ok(conn) => println!(
                "{headers:?} -> tenant {tenant:?} -> {} (connection #{})",
                conn.address(),
                conn.id()
            ),
            Err(TenancyError::TenantNotFound { tenant_key }) => {
                println!("{headers:?} -> unknown tenant '{tenant_key}'");
            }
            Err(err) => return Err(err.into()),
        }
    }
    println!("\nRegistry: {:?}\n", system.registry().stats());

    // 3. Cache an OTP and consume it
    let cache = system.cache();
    cache.put(Keyspace::Otp, "+15550100", "493021").await?;
    println!("OTP TTL: {}s", cache.ttl(&Keyspace::Otp.key("+15550100")).await?);
    println!("OTP consumed: {:?}", cache.take(Keyspace::Otp, "+15550100").await?);
    println!("OTP again:    {:?}", cache.take(Keyspace::Otp, "+15550100").await?);

    println!("\nCache status: {}", serde_json::to_string_pretty(&system.cache_status())?);

    system.shutdown().await;
    Ok(())
}
