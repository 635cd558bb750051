//! Push-feed watcher
//!
//! Subscribes to the order book and price channels of one market and logs
//! every update until Ctrl-C.

use anyhow::Context;
use rust_decimal::Decimal;
use terminal_core::{ClientMessage, OrderBookView, Outcome, PricePoint, TopicDescriptor};
use terminal_feed::{ChannelHandle, ChannelOptions, FeedClient, FeedConfig};
use terminal_proto::{MarketBook, WsParamsPayload};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_SCHEMA_ROOT: &str = "/proto/proto_defs";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,terminal_feed=debug,terminal_watch=debug")
            }),
        )
        .init();

    let config = FeedConfig::from_env().context("Failed to load push-feed configuration")?;
    let market_id = std::env::var("FEED_MARKET_ID").context("FEED_MARKET_ID is not set")?;
    let schema_root =
        std::env::var("FEED_SCHEMA_ROOT").unwrap_or_else(|_| DEFAULT_SCHEMA_ROOT.to_string());

    info!(
        "Watching market {} on {} (schemas under {})",
        market_id, config.ws_url, schema_root
    );

    let client = FeedClient::new(&config);
    let options = ChannelOptions::from_config(&config).on_exhausted(|topic| {
        warn!("[Watch] Gave up on {}; restart to resume", topic.channel);
    });

    let book_topic = TopicDescriptor::order_book(&market_id, &schema_root);
    let price_topic = TopicDescriptor::market_price(&market_id, &schema_root);
    let mut books: ChannelHandle<MarketBook> = client.open(
        book_topic.clone(),
        ClientMessage::subscribe(book_topic.channel.clone()),
        options.clone(),
    );
    let mut prices: ChannelHandle<WsParamsPayload> = client.open(
        price_topic.clone(),
        ClientMessage::subscribe(price_topic.channel.clone()),
        options,
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("[Watch] Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
            changed = books.changed() => {
                if !changed {
                    break;
                }
                if let Some(book) = books.latest() {
                    info!("{}", describe_book(&book.to_view()));
                }
            }
            changed = prices.changed() => {
                if !changed {
                    break;
                }
                match prices.latest().and_then(|p| p.to_price_point()) {
                    Some(point) => info!("{}", describe_price(&point)),
                    None => warn!("[Watch] Price update with unrepresentable values"),
                }
            }
        }
    }

    books.close().await;
    prices.close().await;
    Ok(())
}

fn describe_book(view: &OrderBookView) -> String {
    format!(
        "[Watch] {} YES {} / {} (spread {}) | NO {} / {}",
        view.market_id,
        price_label(view.best_bid(Outcome::Yes)),
        price_label(view.best_ask(Outcome::Yes)),
        price_label(view.spread(Outcome::Yes)),
        price_label(view.best_bid(Outcome::No)),
        price_label(view.best_ask(Outcome::No)),
    )
}

fn describe_price(point: &PricePoint) -> String {
    format!(
        "[Watch] YES {}% NO {}% at {}",
        point.yes_percent().round_dp(1),
        point.no_percent().round_dp(1),
        point.time.format("%H:%M:%S"),
    )
}

fn price_label(price: Option<Decimal>) -> String {
    price.map_or_else(|| "-".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use terminal_core::{BookSide, OrderBookLevel};

    #[test]
    fn test_describe_empty_book() {
        let view = OrderBookView::new("mkt_1");
        assert_eq!(
            describe_book(&view),
            "[Watch] mkt_1 YES - / - (spread -) | NO - / -"
        );
    }

    #[test]
    fn test_describe_book_levels() {
        let mut view = OrderBookView::new("mkt_1");
        view.yes_bids
            .push(OrderBookLevel::new(Decimal::new(45, 2), Decimal::TEN, 1, BookSide::Buy));
        view.yes_asks
            .push(OrderBookLevel::new(Decimal::new(48, 2), Decimal::TEN, 1, BookSide::Sell));

        let line = describe_book(&view);
        assert!(line.contains("YES 0.45 / 0.48 (spread 0.03)"));
    }
}
