//! Development seed tool.
//!
//! Provisions the settlement ("World Bank") account, a demo merchant, and
//! one API key for the merchant. The raw key is printed once and never
//! persisted; keys cannot be issued over the API.
//!
//! Usage: `cargo run --bin seed [-- --env dev]`

use atompay::auth::{ApiKeyRepository, generate_api_key, hash_api_key};
use atompay::config::AppConfig;
use atompay::db::Database;
use atompay::ledger::AccountStore;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(&get_env());
    let db = Database::connect(&config.database_url(), &config.database).await?;
    db.ensure_schema().await?;
    let pool = db.pool();

    // Settlement account: the single account allowed to go negative.
    match AccountStore::find_settlement(pool).await? {
        Some(account) => {
            println!(
                "Settlement account already exists: {} ({})",
                account.name, account.id
            );
        }
        None => {
            let account = AccountStore::create(pool, "World Bank", "USD", true).await?;
            println!("Created settlement account: {}", account.id);
        }
    }

    let merchant = AccountStore::create(pool, "Demo Merchant", "USD", false).await?;
    println!("Created merchant account: {}", merchant.id);

    let (raw_key, prefix) = generate_api_key();
    ApiKeyRepository::create(pool, merchant.id, &hash_api_key(&raw_key), &prefix).await?;

    println!();
    println!("API key for {} (shown once, store it now):", merchant.name);
    println!("  {}", raw_key);
    println!();
    println!("Try it:");
    println!(
        "  curl -X POST http://{}:{}/api/v1/payments \\",
        config.gateway.host, config.gateway.port
    );
    println!("    -H 'Authorization: Bearer {}' \\", raw_key);
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -H 'Idempotency-Key: demo-1' \\");
    println!(r#"    -d '{{"amount": 1000, "currency": "USD", "source": "tok_visa"}}'"#);

    Ok(())
}
