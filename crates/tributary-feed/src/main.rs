use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tributary_core::Category;
use tributary_feed::{
    collect_feed, default_adapters, FeedConfig, FeedOrchestrator, FeedRequest,
};

/// Aggregate posts from federated and social networks into one feed.
#[derive(Parser, Debug)]
#[command(name = "tributary", version, about)]
struct Args {
    /// Topic to search for (hashtag, subreddit, community, query).
    topic: Option<String>,

    /// Feed category: text, media, or all.
    #[arg(long, default_value = "text")]
    category: Category,

    /// Fetch from a single source (e.g. "nostr", "reddit").
    #[arg(long)]
    source: Option<String>,

    /// Maximum number of posts to print.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Print the merged feed as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// List available sources and exit.
    #[arg(long)]
    list_sources: bool,

    /// Bypass caches and refetch everything.
    #[arg(long)]
    force_refresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tributary=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = FeedConfig::from_env()?;
    let adapters = default_adapters(&config).context("building adapters")?;
    let orchestrator = FeedOrchestrator::with_timeout(adapters, config.adapter_timeout);

    if args.list_sources {
        for (name, description) in orchestrator.sources() {
            println!("{name:<14} {description}");
        }
        return Ok(());
    }

    let request = FeedRequest {
        topic: args.topic,
        category: args.category,
        source: args.source,
        force_refresh: args.force_refresh,
    };

    let mut posts = collect_feed(&orchestrator, request)
        .await
        .context("feed aggregation failed")?;
    posts.truncate(args.limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    for post in &posts {
        let when = chrono::DateTime::from_timestamp_millis(post.timestamp)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "[{}] {} ({}) {when}",
            post.source.as_str(),
            post.author.name,
            post.author.handle
        );
        if !post.content.is_empty() {
            println!("  {}", post.content.replace('\n', "\n  "));
        }
        for item in &post.media {
            println!("  [{:?}] {}", item.kind, item.url);
        }
        println!("  {}\n", post.external_url);
    }

    Ok(())
}
