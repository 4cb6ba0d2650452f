use log::info;

use crate::config::{IssConfig, QueryParams};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::fetch::IssClient;
use crate::sink::{
    boards_with_secids, rank_by_profit, secids, BondProfit, DatasetSink, HISTORY_BLOCK,
    SECURITIES_BLOCK,
};
use crate::utils::{history_start_date, iss_date, today};

/// Board groups screened when none are given on the command line.
pub const DEFAULT_BOARDGROUPS: &[u32] = &[7, 58, 193];
pub const HISTORY_DAYS: u64 = 14;

const SECURITIES_COLUMNS: &str =
    "SECID,BOARDID,SECNAME,FACEUNIT,FACEVALUE,MATDATE,PREVLEGALCLOSEPRICE,ACCRUEDINT,COUPONVALUE";

/// Inputs of one screening run.
#[derive(Debug, Clone)]
pub struct ScreenRequest {
    pub boardgroups: Vec<u32>,
    pub history_from: String,
    pub coupons_from: String,
}

impl ScreenRequest {
    pub fn for_today(boardgroups: Vec<u32>) -> Self {
        let today = today();
        Self {
            boardgroups,
            history_from: history_start_date(today, HISTORY_DAYS),
            coupons_from: iss_date(today),
        }
    }
}

/// Listing, recent history and coupon schedules merged into one dataset.
pub async fn screen_bonds(client: &IssClient, request: &ScreenRequest) -> Result<Dataset> {
    let listing_params = QueryParams::new()
        .with("iss.meta", "off")?
        .with("iss.only", "securities,marketdata")?
        .with("securities.columns", SECURITIES_COLUMNS)?
        .with("marketdata.columns", "SECID,DURATION")?;

    let mut dataset = client
        .get_available_bonds(&request.boardgroups, &listing_params)
        .await?;
    info!(
        "{} bonds listed in board groups {:?}",
        dataset.block(SECURITIES_BLOCK).len(),
        request.boardgroups
    );

    let history_params = QueryParams::new()
        .with("iss.only", "history")?
        .with("history.columns", "SECID,NUMTRADES")?
        .with("from", request.history_from.as_str())?;
    let boards = boards_with_secids(&dataset);
    let history = client
        .get_history_for_boards("stock", "bonds", &boards, &history_params)
        .await?;
    info!(
        "{} history rows across {} boards",
        history.block(HISTORY_BLOCK).len(),
        boards.len()
    );
    dataset.add_data(history)?;

    let coupon_params = QueryParams::unlimited()
        .with("iss.meta", "off")?
        .with("iss.only", "coupons")?
        .with("coupons.columns", "coupondate,secid")?
        .with("lang", "ru")?
        .with("from", request.coupons_from.as_str())?;
    let ids = secids(&dataset);
    let coupons = client.get_bonds_bondization(&ids, &coupon_params).await?;
    dataset.add_data(coupons)?;

    Ok(dataset)
}

/// Entry point used by `main`: screen the board groups and print the ranking.
pub async fn run(boardgroups: Vec<u32>) -> Result<()> {
    let boardgroups = if boardgroups.is_empty() {
        DEFAULT_BOARDGROUPS.to_vec()
    } else {
        boardgroups
    };

    let config = IssConfig::from_env()?;
    let client = IssClient::new(config)?;
    info!("screening board groups {:?} on {}", boardgroups, client.config().base_url);
    let request = ScreenRequest::for_today(boardgroups);

    let dataset = screen_bonds(&client, &request).await?;
    let ranked: Vec<BondProfit> = rank_by_profit(&dataset, &secids(&dataset));
    info!("ranked {} bonds by profit", ranked.len());

    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}
