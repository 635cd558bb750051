//! Market views rendered from live feed updates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Binary market outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

/// Which side of the book a level rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Buy,
    Sell,
}

/// A single price level in an order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Price (0.00 - 1.00 representing probability)
    pub price: Decimal,
    /// Total shares resting at this level
    pub shares: Decimal,
    /// Number of distinct users at this level
    pub users: u32,
    pub side: BookSide,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, shares: Decimal, users: u32, side: BookSide) -> Self {
        Self {
            price,
            shares,
            users,
            side,
        }
    }
}

/// Order book snapshot for both outcomes of a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookView {
    pub market_id: String,
    /// When this view was built (feed snapshots carry no timestamp)
    pub timestamp: DateTime<Utc>,
    /// YES bids (sorted by price descending - best bid first)
    pub yes_bids: Vec<OrderBookLevel>,
    /// YES asks (sorted by price ascending - best ask first)
    pub yes_asks: Vec<OrderBookLevel>,
    pub no_bids: Vec<OrderBookLevel>,
    pub no_asks: Vec<OrderBookLevel>,
}

impl OrderBookView {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            timestamp: Utc::now(),
            yes_bids: Vec::new(),
            yes_asks: Vec::new(),
            no_bids: Vec::new(),
            no_asks: Vec::new(),
        }
    }

    /// Restore best-first ordering on every side
    pub fn sort_levels(&mut self) {
        for bids in [&mut self.yes_bids, &mut self.no_bids] {
            bids.sort_by(|a, b| b.price.cmp(&a.price));
        }
        for asks in [&mut self.yes_asks, &mut self.no_asks] {
            asks.sort_by(|a, b| a.price.cmp(&b.price));
        }
    }

    pub fn bids(&self, outcome: Outcome) -> &[OrderBookLevel] {
        match outcome {
            Outcome::Yes => &self.yes_bids,
            Outcome::No => &self.no_bids,
        }
    }

    pub fn asks(&self, outcome: Outcome) -> &[OrderBookLevel] {
        match outcome {
            Outcome::Yes => &self.yes_asks,
            Outcome::No => &self.no_asks,
        }
    }

    pub fn best_bid(&self, outcome: Outcome) -> Option<Decimal> {
        self.bids(outcome).first().map(|l| l.price)
    }

    pub fn best_ask(&self, outcome: Outcome) -> Option<Decimal> {
        self.asks(outcome).first().map(|l| l.price)
    }

    /// Best ask minus best bid
    pub fn spread(&self, outcome: Outcome) -> Option<Decimal> {
        Some(self.best_ask(outcome)? - self.best_bid(outcome)?)
    }

    /// Buy levels best-first followed by sell levels best-first
    pub fn ladder(&self, outcome: Outcome) -> Vec<&OrderBookLevel> {
        self.bids(outcome).iter().chain(self.asks(outcome)).collect()
    }

    pub fn total_users(&self, outcome: Outcome, side: BookSide) -> u32 {
        let levels = match side {
            BookSide::Buy => self.bids(outcome),
            BookSide::Sell => self.asks(outcome),
        };
        levels.iter().map(|l| l.users).sum()
    }
}

/// One point on the live price chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub yes: Decimal,
    pub no: Decimal,
    pub time: DateTime<Utc>,
}

impl PricePoint {
    /// YES price as a percentage label
    pub fn yes_percent(&self) -> Decimal {
        self.yes * Decimal::ONE_HUNDRED
    }

    pub fn no_percent(&self) -> Decimal {
        self.no * Decimal::ONE_HUNDRED
    }
}
