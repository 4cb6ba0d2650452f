use std::str::FromStr;

use log::debug;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::dataset::{Dataset, Record};

use super::{value_to_string, COUPONS_BLOCK, SECURITIES_BLOCK};

/// Return of holding a bond to maturity, bought at the last legal close.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct BondProfit {
    pub secid: String,
    pub secname: String,
    pub facevalue: Decimal,
    pub couponvalue: Decimal,
    pub coupons: usize,
    pub matdate: String,
    pub profit: Decimal,
}

/// Compute profit for `secids` and sort the result, most profitable first.
///
/// Uses the first `securities` row for each SECID and counts its rows in the
/// `coupons` block. Bonds missing a price or nominal field are skipped.
pub fn rank_by_profit<S: AsRef<str>>(dataset: &Dataset, secids: &[S]) -> Vec<BondProfit> {
    let securities = dataset.block(SECURITIES_BLOCK);
    let coupons = dataset.block(COUPONS_BLOCK);

    let mut ranked: Vec<BondProfit> = secids
        .iter()
        .filter_map(|secid| {
            let secid = secid.as_ref();
            let Some(security) = securities.iter().find(|row| has_secid(row, secid)) else {
                debug!("no securities row for {secid}; skipping profit");
                return None;
            };
            let coupon_count = coupons.iter().filter(|row| has_secid(row, secid)).count();
            let profit = bond_profit(secid, security, coupon_count);
            if profit.is_none() {
                debug!("incomplete pricing fields for {secid}; skipping profit");
            }
            profit
        })
        .collect();

    ranked.sort_by(|a, b| b.profit.cmp(&a.profit));
    ranked
}

fn bond_profit(secid: &str, security: &Record, coupons: usize) -> Option<BondProfit> {
    let accruedint = decimal_field(security, "ACCRUEDINT")?;
    let couponvalue = decimal_field(security, "COUPONVALUE")?;
    let facevalue = decimal_field(security, "FACEVALUE")?;
    let price = decimal_field(security, "PREVLEGALCLOSEPRICE")?;

    // Price is quoted in percent of nominal.
    let cost = facevalue * price * Decimal::new(1, 2) + accruedint;
    let income = facevalue + couponvalue * Decimal::from(coupons);
    let profit = (income - cost).round_dp(2);

    Some(BondProfit {
        secid: secid.to_string(),
        secname: text_field(security, "SECNAME"),
        facevalue: facevalue.round_dp(2),
        couponvalue: couponvalue.round_dp(2),
        coupons,
        matdate: text_field(security, "MATDATE"),
        profit,
    })
}

fn has_secid(record: &Record, secid: &str) -> bool {
    record
        .get("SECID")
        .and_then(Value::as_str)
        .map(|value| value == secid)
        .unwrap_or(false)
}

fn text_field(record: &Record, key: &str) -> String {
    record.get(key).map(value_to_string).unwrap_or_default()
}

fn decimal_field(record: &Record, key: &str) -> Option<Decimal> {
    match record.get(key)? {
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .or_else(|| number.as_f64().and_then(Decimal::from_f64_retain))
        }
        // `iss.dp=comma` renders decimals with a comma separator.
        Value::String(raw) => Decimal::from_str(raw.trim().replace(',', ".").as_str()).ok(),
        _ => None,
    }
}
