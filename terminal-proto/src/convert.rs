//! Conversions from decoded feed messages into market views

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use terminal_core::{BookSide, OrderBookLevel, OrderBookView, PricePoint};

use crate::schema::order_book::{MarketBook, OrderLevel};
use crate::schema::ws_market_price::WsParamsPayload;

impl MarketBook {
    /// Build a sorted order book view. Levels whose price or size cannot be
    /// represented as a decimal are skipped.
    pub fn to_view(&self) -> OrderBookView {
        let mut view = OrderBookView::new(self.market_id.clone());

        if let Some(book) = &self.yes_book {
            view.yes_bids = levels(&book.bids, BookSide::Buy);
            view.yes_asks = levels(&book.asks, BookSide::Sell);
        }
        if let Some(book) = &self.no_book {
            view.no_bids = levels(&book.bids, BookSide::Buy);
            view.no_asks = levels(&book.asks, BookSide::Sell);
        }

        view.sort_levels();
        view
    }

    /// Highest YES bid, if any
    pub fn best_yes_bid(&self) -> Option<f64> {
        self.yes_book
            .as_ref()?
            .bids
            .iter()
            .map(|l| l.price)
            .fold(None, |best, p| Some(best.map_or(p, |b: f64| b.max(p))))
    }
}

fn levels(levels: &[OrderLevel], side: BookSide) -> Vec<OrderBookLevel> {
    levels
        .iter()
        .filter_map(|level| {
            let price = Decimal::from_f64(level.price)?;
            let shares = Decimal::from_f64(level.shares)?;
            Some(OrderBookLevel::new(price, shares, level.users, side))
        })
        .collect()
}

impl WsParamsPayload {
    /// Chart point for this update; a missing timestamp means "now"
    pub fn to_price_point(&self) -> Option<PricePoint> {
        let time = if self.timestamp > 0 {
            DateTime::from_timestamp(self.timestamp, 0)?
        } else {
            Utc::now()
        };

        Some(PricePoint {
            yes: Decimal::from_f64(self.yes_price)?,
            no: Decimal::from_f64(self.no_price)?,
            time,
        })
    }
}
