//! Binary Frame Decoder
//!
//! Decodes the Kite feed's length-prefixed binary tick protocol.
//!
//! # Wire Format
//!
//! Every frame is big-endian:
//!
//! ```text
//! [u16 packet count][u16 len][len-byte payload][u16 len][payload]...
//! ```
//!
//! The payload byte length alone selects the tick layout:
//!
//! | Length | Layout                                   | Mode  |
//! |--------|------------------------------------------|-------|
//! | 8      | token, last price                        | LTP   |
//! | 28     | index quote (OHLC order: h,l,o,c)        | Quote |
//! | 32     | index full (+ epoch-millis timestamp)    | Full  |
//! | 44     | quote (OHLC order: o,h,l,c)              | Quote |
//! | 184    | full (+ OI, timestamps, 10 depth levels) | Full  |
//!
//! Any other length is dropped without error; the feed is allowed to add
//! packet types without breaking existing clients.
//!
//! All integers are decoded by byte-wise accumulation. The wire gives no
//! alignment guarantee, so platform-native loads are never used.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::tick::{DepthLevel, MarketDepth, Mode, Ohlc, Segment, Tick};

/// Number of order-book levels per side in a full packet.
const DEPTH_LEVELS_PER_SIDE: usize = 5;

/// Byte stride of one depth level. Only 10 of the 12 bytes carry data;
/// the last 2 are reserved on the wire.
const DEPTH_LEVEL_STRIDE: usize = 12;

/// Big-endian byte-wise accumulation, works for any span up to 8 bytes.
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Read a big-endian u32 from `payload[offset..offset + 4]`.
fn read_u32(payload: &[u8], offset: usize) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    {
        read_be(&payload[offset..offset + 4]) as u32
    }
}

/// Split a raw frame into sub-packet payloads.
///
/// Reads the u16 packet count, then `count` length-prefixed payloads.
/// Stops silently if the buffer is exhausted early, returning the packets
/// recovered so far.
#[must_use]
pub fn split_packets(frame: &[u8]) -> Vec<&[u8]> {
    let Some(count_bytes) = frame.get(0..2) else {
        return Vec::new();
    };
    let count = read_be(count_bytes) as usize;

    let mut packets = Vec::with_capacity(count);
    let mut cursor = 2usize;

    for _ in 0..count {
        let Some(len_bytes) = frame.get(cursor..cursor + 2) else {
            break;
        };
        let len = read_be(len_bytes) as usize;
        let Some(payload) = frame.get(cursor + 2..cursor + 2 + len) else {
            break;
        };
        packets.push(payload);
        cursor += 2 + len;
    }

    packets
}

/// Decode a raw binary frame into ticks.
///
/// Pure: `observed_at` is the caller's capture time, stamped onto every
/// tick. Packets with unrecognized lengths produce no tick and no error.
#[must_use]
pub fn decode(frame: &[u8], observed_at: DateTime<Utc>) -> Vec<Tick> {
    split_packets(frame)
        .into_iter()
        .filter_map(|payload| decode_packet(payload, observed_at))
        .collect()
}

/// Decode a single sub-packet payload, dispatching purely on byte length.
#[must_use]
pub fn decode_packet(payload: &[u8], observed_at: DateTime<Utc>) -> Option<Tick> {
    match payload.len() {
        8 => Some(decode_ltp(payload, observed_at)),
        28 | 32 => Some(decode_index(payload, observed_at)),
        44 | 184 => Some(decode_quote(payload, observed_at)),
        _ => None,
    }
}

fn decode_ltp(payload: &[u8], observed_at: DateTime<Utc>) -> Tick {
    let token = read_u32(payload, 0);
    let segment = Segment::from_token(token);
    Tick::ltp(token, segment.scale_price(read_u32(payload, 4)), observed_at)
}

/// 28/32-byte index layout. Note the OHLC order is high, low, open, close,
/// unlike the 44/184 layout.
fn decode_index(payload: &[u8], observed_at: DateTime<Utc>) -> Tick {
    let token = read_u32(payload, 0);
    let segment = Segment::from_token(token);

    let mut tick = Tick::ltp(token, segment.scale_price(read_u32(payload, 4)), observed_at);
    tick.mode = if payload.len() == 32 {
        Mode::Full
    } else {
        Mode::Quote
    };

    let ohlc = Ohlc {
        high: segment.scale_price(read_u32(payload, 8)),
        low: segment.scale_price(read_u32(payload, 12)),
        open: segment.scale_price(read_u32(payload, 16)),
        close: segment.scale_price(read_u32(payload, 20)),
    };

    // Recomputed from close when possible; the raw on-wire value stands
    // only for a zero close.
    tick.change = Tick::percent_change(tick.last_price, ohlc.close)
        .or_else(|| Some(Decimal::from(read_u32(payload, 24))));
    tick.ohlc = Some(ohlc);

    if payload.len() == 32 {
        // Epoch milliseconds; zero means unset.
        let millis = read_u32(payload, 28);
        if millis != 0 {
            tick.exchange_timestamp = DateTime::from_timestamp_millis(i64::from(millis));
        }
    }

    tick
}

/// 44/184-byte instrument layout. OHLC order is open, high, low, close.
fn decode_quote(payload: &[u8], observed_at: DateTime<Utc>) -> Tick {
    let token = read_u32(payload, 0);
    let segment = Segment::from_token(token);

    let mut tick = Tick::ltp(token, segment.scale_price(read_u32(payload, 4)), observed_at);
    tick.mode = if payload.len() == 184 {
        Mode::Full
    } else {
        Mode::Quote
    };

    tick.last_quantity = Some(read_u32(payload, 8));
    tick.average_price = Some(segment.scale_price(read_u32(payload, 12)));
    tick.volume = Some(read_u32(payload, 16));
    tick.buy_quantity = Some(read_u32(payload, 20));
    tick.sell_quantity = Some(read_u32(payload, 24));

    let ohlc = Ohlc {
        open: segment.scale_price(read_u32(payload, 28)),
        high: segment.scale_price(read_u32(payload, 32)),
        low: segment.scale_price(read_u32(payload, 36)),
        close: segment.scale_price(read_u32(payload, 40)),
    };

    // This layout carries no raw change field; left unset for a zero close.
    tick.change = Tick::percent_change(tick.last_price, ohlc.close);
    tick.ohlc = Some(ohlc);

    if payload.len() == 184 {
        let last_trade_time = read_u32(payload, 44);
        if last_trade_time != 0 {
            tick.last_trade_time = DateTime::from_timestamp(i64::from(last_trade_time), 0);
        }

        tick.open_interest = Some(read_u32(payload, 48));
        tick.open_interest_day_high = Some(read_u32(payload, 52));
        tick.open_interest_day_low = Some(read_u32(payload, 56));

        let timestamp = read_u32(payload, 60);
        if timestamp != 0 {
            tick.exchange_timestamp = DateTime::from_timestamp(i64::from(timestamp), 0);
        }

        tick.depth = decode_depth(&payload[64..184], segment);
    }

    tick
}

/// Decode the 120-byte depth block: 10 levels of 12 bytes, first 5 buy,
/// last 5 sell. The `orders` count occupies only 2 of the last 4 bytes of
/// each level; the remaining 2 are reserved and intentionally skipped,
/// matching the feed's published layout.
fn decode_depth(block: &[u8], segment: Segment) -> Option<MarketDepth> {
    let mut levels = Vec::with_capacity(2 * DEPTH_LEVELS_PER_SIDE);

    for i in 0..2 * DEPTH_LEVELS_PER_SIDE {
        let s = i * DEPTH_LEVEL_STRIDE;
        #[allow(clippy::cast_possible_truncation)]
        let orders = read_be(&block[s + 8..s + 10]) as u32;
        levels.push(DepthLevel {
            quantity: read_u32(block, s),
            price: segment.scale_price(read_u32(block, s + 4)),
            orders,
        });
    }

    let sell = levels.split_off(DEPTH_LEVELS_PER_SIDE);
    Some(MarketDepth {
        buy: levels.try_into().ok()?,
        sell: sell.try_into().ok()?,
    })
}
