//! Market Tick Types
//!
//! A `Tick` is one decoded market update for an instrument. Which fields
//! are present depends on the tick `Mode`:
//!
//! - **LTP**: last traded price only
//! - **Quote**: price + volumes + OHLC
//! - **Full**: Quote + market depth + open interest + exchange timestamps
//!
//! The exchange segment is embedded in the low byte of the instrument
//! token and determines both price scaling and tradability.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Tick detail level.
///
/// The mode is fully determined by the byte length of the decoded wire
/// packet; it is never set independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Last traded price only (8-byte packet).
    Ltp,
    /// Price, volumes and OHLC without depth (28/44-byte packets).
    Quote,
    /// Everything including market depth (32/184-byte packets).
    Full,
}

impl Mode {
    /// Get the wire name used in `mode` control requests.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

/// Exchange segment, embedded in the low byte of the instrument token.
///
/// The segment determines the price divisor (currency derivatives carry
/// four extra decimal places) and whether the instrument is tradable
/// (indices are not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Segment {
    /// NSE cash market.
    NseCm,
    /// NSE futures and options.
    NseFo,
    /// NSE currency derivatives.
    NseCd,
    /// BSE cash market.
    BseCm,
    /// BSE futures and options.
    BseFo,
    /// BSE currency derivatives.
    BseCd,
    /// MCX futures and options.
    McxFo,
    /// MCX stock exchange.
    McxSx,
    /// Index values (not tradable).
    Indices,
    /// Segment code outside the known 1-9 range.
    Unknown(u8),
}

impl Segment {
    /// Extract the segment from an instrument token (low byte).
    #[must_use]
    pub const fn from_token(token: u32) -> Self {
        match (token & 0xFF) as u8 {
            1 => Self::NseCm,
            2 => Self::NseFo,
            3 => Self::NseCd,
            4 => Self::BseCm,
            5 => Self::BseFo,
            6 => Self::BseCd,
            7 => Self::McxFo,
            8 => Self::McxSx,
            9 => Self::Indices,
            other => Self::Unknown(other),
        }
    }

    /// Get the numeric segment code.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::NseCm => 1,
            Self::NseFo => 2,
            Self::NseCd => 3,
            Self::BseCm => 4,
            Self::BseFo => 5,
            Self::BseCd => 6,
            Self::McxFo => 7,
            Self::McxSx => 8,
            Self::Indices => 9,
            Self::Unknown(code) => *code,
        }
    }

    /// Decimal scale applied to raw on-wire prices.
    ///
    /// Currency derivatives (`NseCd`) quote with a 1e7 divisor, everything
    /// else with 1e2.
    #[must_use]
    pub const fn price_scale(&self) -> u32 {
        match self {
            Self::NseCd => 7,
            _ => 2,
        }
    }

    /// Whether instruments in this segment are tradable.
    ///
    /// Index values are informational only.
    #[must_use]
    pub const fn is_tradable(&self) -> bool {
        !matches!(self, Self::Indices)
    }

    /// Convert a raw on-wire price integer into a scaled decimal price.
    #[must_use]
    pub fn scale_price(&self, raw: u32) -> Decimal {
        Decimal::new(i64::from(raw), self.price_scale())
    }
}

/// Open, high, low and close prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ohlc {
    /// Opening price.
    pub open: Decimal,
    /// Day high.
    pub high: Decimal,
    /// Day low.
    pub low: Decimal,
    /// Previous close.
    pub close: Decimal,
}

/// One order-book level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthLevel {
    /// Quantity available at this level.
    pub quantity: u32,
    /// Price at this level.
    pub price: Decimal,
    /// Number of resting orders at this level.
    pub orders: u32,
}

/// Top-5 buy and sell order-book levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketDepth {
    /// Best five bid levels.
    pub buy: [DepthLevel; 5],
    /// Best five offer levels.
    pub sell: [DepthLevel; 5],
}

/// One decoded market update.
///
/// LTP ticks carry only the always-present fields; Quote and Full ticks
/// progressively fill in the optional ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    /// Instrument token (segment embedded in the low byte).
    pub instrument_token: u32,
    /// Exchange segment, derived from the token.
    pub segment: Segment,
    /// False only for index values.
    pub tradable: bool,
    /// Detail level, determined by packet length.
    pub mode: Mode,
    /// Last traded price.
    pub last_price: Decimal,
    /// Capture time (not on-wire).
    pub observed_at: DateTime<Utc>,

    /// Last traded quantity (Quote/Full).
    pub last_quantity: Option<u32>,
    /// Volume-weighted average price (Quote/Full).
    pub average_price: Option<Decimal>,
    /// Day volume (Quote/Full).
    pub volume: Option<u32>,
    /// Total buy quantity (Quote/Full).
    pub buy_quantity: Option<u32>,
    /// Total sell quantity (Quote/Full).
    pub sell_quantity: Option<u32>,
    /// Day OHLC (Quote/Full).
    pub ohlc: Option<Ohlc>,
    /// Percent change from close, recomputed whenever close is non-zero.
    pub change: Option<Decimal>,

    /// Last trade time (Full with depth).
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Exchange-side timestamp (Full).
    pub exchange_timestamp: Option<DateTime<Utc>>,
    /// Open interest (Full with depth).
    pub open_interest: Option<u32>,
    /// Day-high open interest (Full with depth).
    pub open_interest_day_high: Option<u32>,
    /// Day-low open interest (Full with depth).
    pub open_interest_day_low: Option<u32>,
    /// Top-5 order-book depth (Full with depth).
    pub depth: Option<MarketDepth>,
}

impl Tick {
    /// Create a minimal LTP tick; Quote/Full decoding fills in the rest.
    #[must_use]
    pub fn ltp(instrument_token: u32, last_price: Decimal, observed_at: DateTime<Utc>) -> Self {
        let segment = Segment::from_token(instrument_token);
        Self {
            instrument_token,
            segment,
            tradable: segment.is_tradable(),
            mode: Mode::Ltp,
            last_price,
            observed_at,
            last_quantity: None,
            average_price: None,
            volume: None,
            buy_quantity: None,
            sell_quantity: None,
            ohlc: None,
            change: None,
            last_trade_time: None,
            exchange_timestamp: None,
            open_interest: None,
            open_interest_day_high: None,
            open_interest_day_low: None,
            depth: None,
        }
    }

    /// Percent change of `last_price` against a non-zero close.
    ///
    /// Returns `None` when close is zero, in which case any raw on-wire
    /// change value stands.
    #[must_use]
    pub fn percent_change(last_price: Decimal, close: Decimal) -> Option<Decimal> {
        if close.is_zero() {
            None
        } else {
            Some((last_price - close) * Decimal::ONE_HUNDRED / close)
        }
    }
}
