//! Deterministic FIFO lot matching over an append-only fill ledger.
//!
//! FIFO is chosen for deterministic realized attribution at the fill level,
//! and it handles long and short inventory when fills cross through zero.
//!
//! Fee handling: `fees + slippage` are allocated pro-rata by quantity.
//! Opening fees travel with the opened lot as `fees_per_unit`; closing fees
//! are charged per unit on the closing fill. Realized net for a matched
//! quantity is `gross - (open_fees_per_unit + close_fees_per_unit) * matched`.

use crate::domain::errors::LedgerError;
use crate::domain::ledger::occ::infer_multiplier;
use crate::domain::ledger::trade::{LedgerTrade, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Grouping key for independent FIFO books.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub tenant_id: String,
    pub uid: String,
    pub strategy_id: String,
    pub symbol: String,
}

/// An open inventory lot. `effective_price` folds the per-unit fee/slippage
/// allocation into the quoted price (added for buys, subtracted for sells).
#[derive(Debug, Clone, Serialize)]
pub struct Lot {
    pub qty: Decimal,
    pub effective_price: Decimal,
    pub fees_per_unit: Decimal,
    pub ts: DateTime<Utc>,
    pub trade_id: String,
}

/// Per-fill realized attribution.
#[derive(Debug, Clone, Serialize)]
pub struct FillAttribution {
    pub trade_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub ts: DateTime<Utc>,
    pub fees: Decimal,
    pub realized_gross: Decimal,
    pub realized_fees: Decimal,
    pub realized_net: Decimal,
    pub position_qty_after: Decimal,
}

/// One event per fill that produced non-zero realized attribution.
/// Analytics uses these for win rate and daily realized aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedPosition {
    pub trade_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty_closed: Decimal,
    pub realized_gross: Decimal,
    pub realized_fees: Decimal,
    pub realized_net: Decimal,
    pub ts: DateTime<Utc>,
}

/// Aggregate P&L for one group. `net` = realized net + unrealized.
#[derive(Debug, Clone, Serialize)]
pub struct GroupPnl {
    pub key: GroupKey,
    pub position_qty: Decimal,
    pub realized_gross: Decimal,
    pub realized_fees: Decimal,
    pub realized_net: Decimal,
    pub unrealized: Decimal,
    pub net: Decimal,
    pub open_long_lots: Vec<Lot>,
    pub open_short_lots: Vec<Lot>,
}

/// Full engine output: per-fill rows, closed-position events, per-group
/// aggregates (sorted by key for deterministic downstream consumption) and
/// ledger-wide realized totals.
#[derive(Debug, Clone, Serialize)]
pub struct PnlReport {
    pub fills: Vec<FillAttribution>,
    pub closed_positions: Vec<ClosedPosition>,
    pub groups: Vec<GroupPnl>,
    pub realized_gross: Decimal,
    pub realized_fees: Decimal,
    pub realized_net: Decimal,
}

/// Ledger cutoff. `inclusive` keeps `ts <= cutoff`; otherwise `ts < cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct AsOf {
    pub cutoff: DateTime<Utc>,
    pub inclusive: bool,
}

impl AsOf {
    pub fn inclusive(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            inclusive: true,
        }
    }

    pub fn exclusive(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            inclusive: false,
        }
    }

    fn keeps(&self, ts: DateTime<Utc>) -> bool {
        if self.inclusive {
            ts <= self.cutoff
        } else {
            ts < self.cutoff
        }
    }
}

struct BookLot {
    qty: Decimal,
    price: Decimal,
    fees_per_unit: Decimal,
    ts: DateTime<Utc>,
    trade_id: String,
}

impl BookLot {
    fn to_lot(&self, side: Side) -> Lot {
        let effective_price = match side {
            Side::Buy => self.price + self.fees_per_unit,
            Side::Sell => self.price - self.fees_per_unit,
        };
        Lot {
            qty: self.qty,
            effective_price,
            fees_per_unit: self.fees_per_unit,
            ts: self.ts,
            trade_id: self.trade_id.clone(),
        }
    }
}

struct Book {
    longs: VecDeque<BookLot>,
    shorts: VecDeque<BookLot>,
    position_qty: Decimal,
    realized_gross: Decimal,
    realized_fees: Decimal,
    multiplier: Decimal,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            longs: VecDeque::new(),
            shorts: VecDeque::new(),
            position_qty: Decimal::ZERO,
            realized_gross: Decimal::ZERO,
            realized_fees: Decimal::ZERO,
            multiplier: Decimal::ONE,
        }
    }
}

/// Compute realized and unrealized P&L using FIFO lots per
/// `(tenant_id, uid, strategy_id, symbol)`.
///
/// Fills are ordered by `(ts, broker_fill_id, order_id, input index)` so that
/// timestamp collisions at millisecond resolution still produce a stable
/// book. Symbols absent from `mark_prices` report zero unrealized.
pub fn compute_fifo_pnl(
    trades: &[LedgerTrade],
    mark_prices: &HashMap<String, Decimal>,
    as_of: Option<AsOf>,
) -> Result<PnlReport, LedgerError> {
    for t in trades {
        t.validate()?;
    }

    let mut ordered: Vec<(usize, &LedgerTrade)> = trades
        .iter()
        .enumerate()
        .filter(|(_, t)| as_of.map(|a| a.keeps(t.ts)).unwrap_or(true))
        .collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        let ka = (
            a.ts,
            a.broker_fill_id.as_deref().unwrap_or(""),
            a.order_id.as_deref().unwrap_or(""),
            *ia,
        );
        let kb = (
            b.ts,
            b.broker_fill_id.as_deref().unwrap_or(""),
            b.order_id.as_deref().unwrap_or(""),
            *ib,
        );
        ka.cmp(&kb)
    });

    let mut books: BTreeMap<GroupKey, Book> = BTreeMap::new();
    let mut fills: Vec<FillAttribution> = Vec::with_capacity(ordered.len());

    for (index, t) in ordered {
        let symbol = t.normalized_symbol();
        let key = GroupKey {
            tenant_id: t.tenant_id.clone(),
            uid: t.uid.clone(),
            strategy_id: t.strategy_id.clone(),
            symbol: symbol.clone(),
        };
        let book = books.entry(key).or_default();

        let multiplier = t.multiplier.unwrap_or_else(|| infer_multiplier(&symbol));
        book.multiplier = multiplier;
        // Per-unit fee allocation in premium (per-share) terms.
        let fees_total = t.fees + t.slippage;
        let fees_per_unit = fees_total / (t.qty * multiplier);

        let trade_id = t
            .broker_fill_id
            .clone()
            .or_else(|| t.order_id.clone())
            .unwrap_or_else(|| format!("t_{index}"));

        let mut realized_gross = Decimal::ZERO;
        let mut realized_fees = Decimal::ZERO;
        let mut remaining = t.qty;

        match t.side {
            Side::Buy => {
                // Cover shorts first (FIFO), then open/extend long inventory.
                while remaining > Decimal::ZERO {
                    let Some(lot) = book.shorts.front_mut() else {
                        break;
                    };
                    let matched = remaining.min(lot.qty);
                    realized_gross += (lot.price - t.price) * matched * multiplier;
                    realized_fees += (lot.fees_per_unit + fees_per_unit) * matched * multiplier;
                    lot.qty -= matched;
                    remaining -= matched;
                    if lot.qty <= Decimal::ZERO {
                        book.shorts.pop_front();
                    }
                }
                if remaining > Decimal::ZERO {
                    book.longs.push_back(BookLot {
                        qty: remaining,
                        price: t.price,
                        fees_per_unit,
                        ts: t.ts,
                        trade_id: trade_id.clone(),
                    });
                }
                book.position_qty += t.qty;
            }
            Side::Sell => {
                // Close longs first (FIFO), then open/extend short inventory.
                while remaining > Decimal::ZERO {
                    let Some(lot) = book.longs.front_mut() else {
                        break;
                    };
                    let matched = remaining.min(lot.qty);
                    realized_gross += (t.price - lot.price) * matched * multiplier;
                    realized_fees += (lot.fees_per_unit + fees_per_unit) * matched * multiplier;
                    lot.qty -= matched;
                    remaining -= matched;
                    if lot.qty <= Decimal::ZERO {
                        book.longs.pop_front();
                    }
                }
                if remaining > Decimal::ZERO {
                    book.shorts.push_back(BookLot {
                        qty: remaining,
                        price: t.price,
                        fees_per_unit,
                        ts: t.ts,
                        trade_id: trade_id.clone(),
                    });
                }
                book.position_qty -= t.qty;
            }
        }

        book.realized_gross += realized_gross;
        book.realized_fees += realized_fees;

        fills.push(FillAttribution {
            trade_id,
            symbol,
            side: t.side,
            qty: t.qty,
            price: t.price,
            ts: t.ts,
            fees: fees_total,
            realized_gross,
            realized_fees,
            realized_net: realized_gross - realized_fees,
            position_qty_after: book.position_qty,
        });
    }

    let closed_positions = fills
        .iter()
        .filter(|f| !f.realized_gross.is_zero() || !f.realized_fees.is_zero())
        .map(|f| ClosedPosition {
            trade_id: f.trade_id.clone(),
            symbol: f.symbol.clone(),
            side: f.side,
            qty_closed: f.qty,
            realized_gross: f.realized_gross,
            realized_fees: f.realized_fees,
            realized_net: f.realized_net,
            ts: f.ts,
        })
        .collect();

    let mut groups = Vec::with_capacity(books.len());
    let mut total_gross = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;
    for (key, book) in books {
        let multiplier = book.multiplier;
        let mark = mark_prices.get(&key.symbol).copied();
        let mut unrealized = Decimal::ZERO;
        if let Some(m) = mark {
            for lot in &book.longs {
                let l = lot.to_lot(Side::Buy);
                unrealized += (m - l.effective_price) * l.qty * multiplier;
            }
            for lot in &book.shorts {
                let l = lot.to_lot(Side::Sell);
                unrealized += (l.effective_price - m) * l.qty * multiplier;
            }
        }

        let realized_net = book.realized_gross - book.realized_fees;
        total_gross += book.realized_gross;
        total_fees += book.realized_fees;

        groups.push(GroupPnl {
            position_qty: book.position_qty,
            realized_gross: book.realized_gross,
            realized_fees: book.realized_fees,
            realized_net,
            unrealized,
            net: realized_net + unrealized,
            open_long_lots: book.longs.iter().map(|l| l.to_lot(Side::Buy)).collect(),
            open_short_lots: book.shorts.iter().map(|l| l.to_lot(Side::Sell)).collect(),
            key,
        });
    }

    Ok(PnlReport {
        fills,
        closed_positions,
        groups,
        realized_gross: total_gross,
        realized_fees: total_fees,
        realized_net: total_gross - total_fees,
    })
}

/// Per-strategy rollup used by the daily-loss breaker and period snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StrategyKey {
    pub tenant_id: String,
    pub uid: String,
    pub strategy_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyPnl {
    pub realized_gross: Decimal,
    pub realized_fees: Decimal,
    pub realized_net: Decimal,
    pub unrealized: Decimal,
    pub net: Decimal,
}

/// Aggregate per-symbol groups into `(tenant, uid, strategy)` totals.
pub fn aggregate_by_strategy(groups: &[GroupPnl]) -> BTreeMap<StrategyKey, StrategyPnl> {
    let mut out: BTreeMap<StrategyKey, StrategyPnl> = BTreeMap::new();
    for g in groups {
        let entry = out
            .entry(StrategyKey {
                tenant_id: g.key.tenant_id.clone(),
                uid: g.key.uid.clone(),
                strategy_id: g.key.strategy_id.clone(),
            })
            .or_default();
        entry.realized_gross += g.realized_gross;
        entry.realized_fees += g.realized_fees;
        entry.realized_net += g.realized_net;
        entry.unrealized += g.unrealized;
        entry.net = entry.realized_net + entry.unrealized;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn fill(
        side: Side,
        qty: Decimal,
        price: Decimal,
        fees: Decimal,
        minute: u32,
    ) -> LedgerTrade {
        LedgerTrade {
            tenant_id: "t1".into(),
            uid: "u1".into(),
            strategy_id: "s1".into(),
            run_id: "r1".into(),
            symbol: "SPY".into(),
            side,
            qty,
            price,
            ts: Utc.with_ymd_and_hms(2024, 1, 2, 15, minute, 0).unwrap(),
            order_id: None,
            broker_fill_id: None,
            fees,
            slippage: Decimal::ZERO,
            multiplier: None,
        }
    }

    #[test]
    fn test_cross_through_zero_attribution() {
        // buy 10@100 fee 1, buy 10@110 fee 1, sell 15@120 fee 1.5,
        // sell 10@90 fee 1, buy 5@80 fee 1.
        let trades = vec![
            fill(Side::Buy, dec!(10), dec!(100), dec!(1), 0),
            fill(Side::Buy, dec!(10), dec!(110), dec!(1), 1),
            fill(Side::Sell, dec!(15), dec!(120), dec!(1.5), 2),
            fill(Side::Sell, dec!(10), dec!(90), dec!(1), 3),
            fill(Side::Buy, dec!(5), dec!(80), dec!(1), 4),
        ];
        let report = compute_fifo_pnl(&trades, &HashMap::new(), None).unwrap();

        assert_eq!(report.realized_gross, dec!(200.0));
        assert_eq!(report.realized_fees, dec!(5.5));
        assert_eq!(report.realized_net, dec!(194.5));

        let group = &report.groups[0];
        assert_eq!(group.position_qty, Decimal::ZERO);
        assert!(group.open_long_lots.is_empty());
        assert!(group.open_short_lots.is_empty());

        // Per-fill nets sum to the total.
        let fill_net: Decimal = report.fills.iter().map(|f| f.realized_net).sum();
        assert_eq!(fill_net, report.realized_net);

        // Fully closed symbol: all fees paid were allocated.
        let fees_paid: Decimal = trades.iter().map(|t| t.fees + t.slippage).sum();
        assert_eq!(report.realized_fees, fees_paid);
    }

    #[test]
    fn test_position_qty_is_buys_minus_sells() {
        let trades = vec![
            fill(Side::Buy, dec!(7), dec!(100), dec!(0), 0),
            fill(Side::Sell, dec!(3), dec!(101), dec!(0), 1),
            fill(Side::Buy, dec!(2), dec!(99), dec!(0), 2),
        ];
        let report = compute_fifo_pnl(&trades, &HashMap::new(), None).unwrap();
        assert_eq!(report.groups[0].position_qty, dec!(6));
        assert_eq!(report.fills.last().unwrap().position_qty_after, dec!(6));
    }

    #[test]
    fn test_occ_symbol_applies_contract_multiplier() {
        let sym = "SPY251230C00500000";
        let mut buy = fill(Side::Buy, dec!(1), dec!(1.00), dec!(1.00), 0);
        buy.symbol = sym.into();
        let mut sell = fill(Side::Sell, dec!(1), dec!(1.50), dec!(1.00), 10);
        sell.symbol = sym.into();

        let report = compute_fifo_pnl(&[buy, sell], &HashMap::new(), None).unwrap();
        // (1.50 - 1.00) * 1 * 100 - 2.00 in fees.
        assert_eq!(report.realized_gross, dec!(50.00));
        assert_eq!(report.realized_fees, dec!(2.00));
        assert_eq!(report.realized_net, dec!(48.00));
    }

    #[test]
    fn test_explicit_multiplier_overrides_inference() {
        let mut buy = fill(Side::Buy, dec!(1), dec!(10), dec!(0), 0);
        buy.multiplier = Some(dec!(50));
        let mut sell = fill(Side::Sell, dec!(1), dec!(12), dec!(0), 1);
        sell.multiplier = Some(dec!(50));
        let report = compute_fifo_pnl(&[buy, sell], &HashMap::new(), None).unwrap();
        assert_eq!(report.realized_gross, dec!(100));
    }

    #[test]
    fn test_unrealized_uses_effective_price_and_marks() {
        let trades = vec![fill(Side::Buy, dec!(10), dec!(100), dec!(1), 0)];
        let marks = HashMap::from([("SPY".to_string(), dec!(105))]);
        let report = compute_fifo_pnl(&trades, &marks, None).unwrap();
        // Effective entry 100.1; (105 - 100.1) * 10 = 49.
        assert_eq!(report.groups[0].unrealized, dec!(49.0));
        assert_eq!(report.groups[0].net, dec!(49.0));
    }

    #[test]
    fn test_as_of_inclusive_vs_exclusive() {
        let trades = vec![
            fill(Side::Buy, dec!(1), dec!(100), dec!(0), 0),
            fill(Side::Sell, dec!(1), dec!(110), dec!(0), 5),
        ];
        let cutoff = trades[1].ts;

        let incl = compute_fifo_pnl(&trades, &HashMap::new(), Some(AsOf::inclusive(cutoff)))
            .unwrap();
        assert_eq!(incl.realized_net, dec!(10));

        let excl = compute_fifo_pnl(&trades, &HashMap::new(), Some(AsOf::exclusive(cutoff)))
            .unwrap();
        assert_eq!(excl.realized_net, dec!(0));
        assert_eq!(excl.groups[0].position_qty, dec!(1));
    }

    #[test]
    fn test_sort_is_stable_across_timestamp_collisions() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let mut a = fill(Side::Buy, dec!(1), dec!(100), dec!(0), 0);
        a.ts = ts;
        a.broker_fill_id = Some("b".into());
        let mut b = fill(Side::Buy, dec!(1), dec!(101), dec!(0), 0);
        b.ts = ts;
        b.broker_fill_id = Some("a".into());
        let mut c = fill(Side::Sell, dec!(2), dec!(105), dec!(0), 0);
        c.ts = ts + chrono::Duration::seconds(1);

        // "a" sorts before "b" regardless of input order, so FIFO matches
        // lot 101 first.
        let report = compute_fifo_pnl(&[a, b, c], &HashMap::new(), None).unwrap();
        let first_close = &report.fills[2];
        assert_eq!(first_close.realized_gross, dec!(4) + dec!(5));
    }

    #[test]
    fn test_rejects_invalid_fill() {
        let bad = fill(Side::Buy, dec!(0), dec!(100), dec!(0), 0);
        assert!(compute_fifo_pnl(&[bad], &HashMap::new(), None).is_err());
    }

    #[test]
    fn test_aggregate_by_strategy() {
        let mut other = fill(Side::Buy, dec!(1), dec!(10), dec!(0), 0);
        other.symbol = "QQQ".into();
        let trades = vec![
            fill(Side::Buy, dec!(1), dec!(100), dec!(0), 0),
            fill(Side::Sell, dec!(1), dec!(110), dec!(0), 1),
            other,
        ];
        let report = compute_fifo_pnl(&trades, &HashMap::new(), None).unwrap();
        let rollup = aggregate_by_strategy(&report.groups);
        assert_eq!(rollup.len(), 1);
        let pnl = rollup.values().next().unwrap();
        assert_eq!(pnl.realized_net, dec!(10));
    }
}
