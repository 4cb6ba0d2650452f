use futures::future::join_all;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Proxy};
use serde_json::Value;

use crate::config::{validator, FanOutPolicy, IssConfig, Limit, QueryParams, PASSPORT_COOKIE};
use crate::dataset::{Dataset, Record};
use crate::error::Context;

use super::block::parse_response;
use super::endpoint::{resolve, IssMethod, PathParams};
use super::{ensure_concurrency_limit, FetchResult, DEFAULT_BOARDGROUP};

/// Async ISS client over one shared HTTP session.
///
/// The session is read-only once built; every operation returns its own
/// [`Dataset`] for the caller to keep or hand to a sink.
pub struct IssClient {
    client: Client,
    config: IssConfig,
}

impl IssClient {
    /// Build the session from configuration: timeout, proxy and passport cookie.
    pub fn new(config: IssConfig) -> FetchResult<Self> {
        validator::validate(&config)?;

        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url.as_str())
                .with_context(|| format!("Invalid proxy URL {}", proxy_url))?;
            builder = builder.proxy(proxy);
        }

        if let Some(passport) = &config.passport {
            let mut headers = HeaderMap::new();
            let cookie = HeaderValue::from_str(&format!("{PASSPORT_COOKIE}={passport}"))
                .context("Passport cookie contains characters not allowed in a header")?;
            headers.insert(COOKIE, cookie);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .context("Failed to construct ISS HTTP client")?;
        Ok(Self { client, config })
    }

    /// Use an already authenticated session.
    pub fn with_client(client: Client, config: IssConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &IssConfig {
        &self.config
    }

    pub fn url(&self, method: IssMethod, params: &PathParams<'_>) -> FetchResult<String> {
        resolve(&self.config.base_url, method, params)
    }

    /// Fetch the full result set behind `url`.
    ///
    /// With `limit=unlimited` exactly one request is made. Otherwise pages are
    /// requested with an increasing `start` until a page in which every block is
    /// empty; the offset advances by the largest block of each page.
    pub async fn fetch_blocks(&self, url: &str, params: &QueryParams) -> FetchResult<Dataset> {
        let mut dataset = Dataset::new();

        if params.is_unlimited() {
            for (name, records) in self.fetch_page(url, params, None).await? {
                dataset.extend_block(&name, records);
            }
            return Ok(dataset);
        }

        let mut start = 0usize;
        loop {
            let page = self.fetch_page(url, params, Some(start)).await?;

            let mut page_count = 0;
            for (name, records) in page {
                page_count = page_count.max(dataset.extend_block(&name, records));
            }

            if page_count == 0 {
                break;
            }
            start += page_count;
        }

        debug!(
            "fetched {} records from {} in pages up to start={}",
            dataset.total_records(),
            url,
            start
        );
        Ok(dataset)
    }

    async fn fetch_page(
        &self,
        url: &str,
        params: &QueryParams,
        start: Option<usize>,
    ) -> FetchResult<Vec<(String, Vec<Record>)>> {
        let response = self
            .client
            .get(url)
            .query(&params.to_pairs(start))
            .send()
            .await?
            .error_for_status()?;

        debug!("{}", response.url());

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if !is_json {
            warn!("{} did not answer with JSON; treating page as empty", response.url());
            return Ok(Vec::new());
        }

        let body = response.text().await?;
        let root: Value = match serde_json::from_str(&body) {
            Ok(root) => root,
            Err(err) => {
                warn!("undecodable ISS body from {url} ({err}); treating page as empty");
                return Ok(Vec::new());
            }
        };

        parse_response(&root, &self.config.blocks)
    }

    /// Fetch every `(identifier, url)` branch concurrently and merge the
    /// results in branch order.
    pub async fn fan_out(
        &self,
        branches: Vec<(String, String)>,
        params: &QueryParams,
    ) -> FetchResult<Dataset> {
        if branches.is_empty() {
            debug!("fan-out requested with no identifiers; nothing to fetch");
            return Ok(Dataset::new());
        }

        let limit =
            ensure_concurrency_limit(self.config.concurrency_limit.unwrap_or(branches.len()));

        // `buffered` yields in input order, so the merge below is deterministic
        // whatever order the branches complete in.
        let results: Vec<(String, FetchResult<Dataset>)> = stream::iter(branches)
            .map(move |(id, url)| async move {
                let result = self.fetch_blocks(&url, params).await;
                (id, result)
            })
            .buffered(limit)
            .collect()
            .await;

        let mut merged = Dataset::new();
        for (id, result) in results {
            match result {
                Ok(data) => merged.merge(data),
                Err(err) => match self.config.fan_out {
                    FanOutPolicy::BestEffort => {
                        warn!("branch `{id}` failed and contributes no rows: {err}")
                    }
                    FanOutPolicy::FailFast => return Err(err),
                },
            }
        }
        Ok(merged)
    }

    /// Bonds listed in the given board groups, fetched unpaginated.
    pub async fn get_available_bonds(
        &self,
        boardgroups: &[u32],
        params: &QueryParams,
    ) -> FetchResult<Dataset> {
        let boardgroups: &[u32] = if boardgroups.is_empty() {
            &[DEFAULT_BOARDGROUP]
        } else {
            boardgroups
        };
        let params = params.clone().with_limit(Limit::Unlimited);

        let branches = boardgroups
            .iter()
            .map(|group| -> FetchResult<(String, String)> {
                let id = group.to_string();
                let url = self.url(IssMethod::Bonds, &PathParams::from([("boardgroup", id.clone())]))?;
                Ok((id, url))
            })
            .collect::<FetchResult<Vec<_>>>()?;

        self.fan_out(branches, &params).await
    }

    /// Trading history of `secids` on one board.
    pub async fn get_securities_history<S: AsRef<str>>(
        &self,
        engine: &str,
        market: &str,
        board: &str,
        secids: &[S],
        params: &QueryParams,
    ) -> FetchResult<Dataset> {
        if secids.is_empty() {
            debug!("[get_securities_history] no SECIDs for board {board}");
            return Ok(Dataset::new());
        }

        let branches = secids
            .iter()
            .map(|secid| -> FetchResult<(String, String)> {
                let secid = secid.as_ref().to_string();
                let path = PathParams::from([
                    ("engine", engine.to_string()),
                    ("market", market.to_string()),
                    ("board", board.to_string()),
                    ("security", secid.clone()),
                ]);
                Ok((secid, self.url(IssMethod::SecHistory, &path)?))
            })
            .collect::<FetchResult<Vec<_>>>()?;

        self.fan_out(branches, params).await
    }

    /// History for several boards at once, merged in board order.
    pub async fn get_history_for_boards(
        &self,
        engine: &str,
        market: &str,
        boards: &[(String, Vec<String>)],
        params: &QueryParams,
    ) -> FetchResult<Dataset> {
        let requests = boards.iter().map(|(board, secids)| {
            self.get_securities_history(engine, market, board, secids.as_slice(), params)
        });

        let mut merged = Dataset::new();
        for result in join_all(requests).await {
            merged.merge(result?);
        }
        Ok(merged)
    }

    /// Coupon and amortization schedules of `secids`.
    pub async fn get_bonds_bondization<S: AsRef<str>>(
        &self,
        secids: &[S],
        params: &QueryParams,
    ) -> FetchResult<Dataset> {
        if secids.is_empty() {
            debug!("[get_bonds_bondization] no SECIDs requested");
            return Ok(Dataset::new());
        }

        let branches = secids
            .iter()
            .map(|secid| -> FetchResult<(String, String)> {
                let secid = secid.as_ref().to_string();
                let path = PathParams::from([("secid", secid.clone())]);
                Ok((secid, self.url(IssMethod::SecBondization, &path)?))
            })
            .collect::<FetchResult<Vec<_>>>()?;

        self.fan_out(branches, params).await
    }
}
