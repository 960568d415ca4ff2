//! Smoke test against a running Whiskey instance
//!
//! Usage: `PROXY_URL=http://localhost:3000 whiskey-smoke`

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

struct Smoke {
    client: reqwest::Client,
    base_url: String,
}

impl Smoke {
    fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("{} did not return JSON", url))?;

        if status.is_server_error() {
            bail!(
                "{} returned {}: {}",
                url,
                status,
                body["message"].as_str().unwrap_or("no message")
            );
        }
        Ok(body)
    }
}

fn field<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value> {
    value
        .pointer(pointer)
        .with_context(|| format!("response is missing {}", pointer))
}

fn join_strings(value: &Value, take: usize) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(take)
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

async fn run(smoke: &Smoke) -> Result<()> {
    println!("1. Forwarding a request...");
    let forwarded = smoke.get("/api/proxy?url=https://httpbin.org/ip").await?;
    println!("   Response time: {}ms", field(&forwarded, "/responseTime")?);
    match forwarded.get("proxy").filter(|p| !p.is_null()) {
        Some(proxy) => println!(
            "   Proxy used: {}:{} ({})",
            field(proxy, "/host")?.as_str().unwrap_or("?"),
            field(proxy, "/port")?,
            field(proxy, "/type")?.as_str().unwrap_or("?")
        ),
        None => println!("   Proxy used: direct"),
    }
    println!("   Target saw: {}\n", forwarded.pointer("/data/origin").unwrap_or(&Value::Null));

    println!("2. Pool statistics...");
    let stats = smoke.get("/api/proxy-stats").await?;
    println!("   Total proxies: {}", field(&stats, "/overview/total")?);
    println!("   Healthy proxies: {}", field(&stats, "/overview/healthy")?);
    println!(
        "   Health rate: {:.0}%\n",
        field(&stats, "/overview/healthPercentage")?.as_f64().unwrap_or(0.0)
    );

    println!("3. Proxy information...");
    let info = smoke.get("/api/proxy-info?limit=5").await?;
    println!(
        "   Countries: {}",
        join_strings(field(&info, "/filters/countries")?, 5)
    );
    println!(
        "   Types: {}\n",
        join_strings(field(&info, "/filters/types")?, usize::MAX)
    );

    println!("4. Proxy performance...");
    let test = smoke.get("/api/proxy-test?count=3").await?;
    println!("   Tests run: {}", field(&test, "/summary/total")?);
    println!("   Success rate: {}%", field(&test, "/summary/successRate")?);
    println!(
        "   Average response time: {}ms\n",
        field(&test, "/summary/avgResponseTime")?
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let base_url = std::env::var("PROXY_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    println!("Testing Whiskey at {}\n", base_url);

    let smoke = Smoke::new(base_url)?;
    if let Err(e) = run(&smoke).await {
        eprintln!("Smoke test failed: {:#}", e);
        eprintln!("\nCheck that the service is running and PROXY_URL is correct.");
        std::process::exit(1);
    }

    println!("All checks passed.");
    Ok(())
}
