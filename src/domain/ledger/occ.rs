use chrono::NaiveDate;
use rust_decimal::Decimal;

/// US equity option contract parsed from an OCC symbol
/// (e.g. `SPY251230C00500000`).
#[derive(Debug, Clone, PartialEq)]
pub struct OccContract {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionRight {
    Call,
    Put,
}

/// Parse an OCC option symbol: root (1-6 alphanumerics), YYMMDD, C|P,
/// 8-digit strike in thousandths. Returns `None` for anything else.
pub fn parse_occ_symbol(symbol: &str) -> Option<OccContract> {
    let s = symbol.trim().to_uppercase();
    // root + 6 date digits + right + 8 strike digits
    if s.len() < 16 || s.len() > 21 {
        return None;
    }
    let (root, tail) = s.split_at(s.len() - 15);
    if root.is_empty() || root.len() > 6 {
        return None;
    }
    if !root.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    // A plausible root starts with a letter; pure digits are never tickers.
    if !root.chars().next()?.is_ascii_alphabetic() {
        return None;
    }

    let (date_part, rest) = tail.split_at(6);
    if !date_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (right_part, strike_part) = rest.split_at(1);
    if !strike_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let yy: i32 = date_part[0..2].parse().ok()?;
    let mm: u32 = date_part[2..4].parse().ok()?;
    let dd: u32 = date_part[4..6].parse().ok()?;
    let expiration = NaiveDate::from_ymd_opt(2000 + yy, mm, dd)?;

    let right = match right_part {
        "C" => OptionRight::Call,
        "P" => OptionRight::Put,
        _ => return None,
    };

    let strike_thousandths: i64 = strike_part.parse().ok()?;
    let strike = Decimal::new(strike_thousandths, 3);
    if strike <= Decimal::ZERO {
        return None;
    }

    Some(OccContract {
        underlying: root.to_string(),
        expiration,
        right,
        strike,
    })
}

/// Contract multiplier for P&L math: 100 for OCC option symbols, 1 otherwise.
/// Non-standard contracts must carry an explicit per-trade multiplier.
pub fn infer_multiplier(symbol: &str) -> Decimal {
    if parse_occ_symbol(symbol).is_some() {
        Decimal::ONE_HUNDRED
    } else {
        Decimal::ONE
    }
}
