use std::time::{Duration, Instant};

use iss_bonds::app::{screen_bonds, ScreenRequest};
use iss_bonds::config::{FanOutPolicy, IssConfig, QueryParams};
use iss_bonds::fetch::{IssClient, IssMethod, PathParams};
use iss_bonds::sink::{rank_by_profit, secids};
use iss_bonds::AppError;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path, path_regex, query_param},
    Mock, MockServer, ResponseTemplate,
};

/// Helper: start a mock server and a client whose base URL points at it.
async fn setup(policy: FanOutPolicy) -> (MockServer, IssClient) {
    let mock_server = MockServer::start().await;
    let config = IssConfig::builtin()
        .with_base_url(mock_server.uri())
        .with_fan_out(policy);
    let client = IssClient::new(config).expect("client");
    (mock_server, client)
}

fn history_page(rows: &[(&str, i64)]) -> Value {
    let data: Vec<Value> = rows.iter().map(|(id, n)| json!([id, n])).collect();
    json!({
        "history": {"columns": ["secid", "numtrades"], "data": data},
        "history.cursor": {"columns": ["INDEX", "TOTAL", "PAGESIZE"], "data": [[0, 3, 2]]}
    })
}

fn numtrades(records: &[iss_bonds::Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r["NUMTRADES"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn unlimited_fetch_issues_a_single_request() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;

    Mock::given(method("GET"))
        .and(path("/securities/SU26227RMFS7/bondization.json"))
        .and(query_param("limit", "unlimited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coupons": {
                "columns": ["coupondate", "secid"],
                "data": [["2025-01-01", "SU26227RMFS7"], ["2025-07-01", "SU26227RMFS7"]]
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = client
        .url(
            IssMethod::SecBondization,
            &PathParams::from([("secid", "SU26227RMFS7".to_string())]),
        )
        .unwrap();
    let data = client
        .fetch_blocks(&url, &QueryParams::unlimited())
        .await
        .unwrap();

    assert_eq!(data.block("coupons").len(), 2);
    assert_eq!(data.block("coupons")[1]["COUPONDATE"], json!("2025-07-01"));
}

#[tokio::test]
async fn paginates_until_an_empty_page() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;
    let url = format!("{}/history/page.json", mock_server.uri());

    for (start, body) in [
        ("0", history_page(&[("A", 1), ("A", 2)])),
        ("2", history_page(&[("A", 3)])),
        ("3", history_page(&[])),
    ] {
        Mock::given(method("GET"))
            .and(path("/history/page.json"))
            .and(query_param("start", start))
            .and(query_param("from", "2024-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let params = QueryParams::new().with("from", "2024-01-01").unwrap();
    let data = client.fetch_blocks(&url, &params).await.unwrap();

    assert_eq!(numtrades(data.block("history")), vec![1, 2, 3]);
    // `history.cursor` is not a recognised block.
    assert!(!data.contains_block("history.cursor"));
}

#[tokio::test]
async fn keeps_paging_while_any_block_has_rows() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;
    let url = format!("{}/mixed.json", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/mixed.json"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "securities": {"columns": ["SECID"], "data": [["A"], ["B"]]},
            "marketdata": {"columns": ["SECID"], "data": []}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mixed.json"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "securities": {"columns": ["SECID"], "data": []},
            "marketdata": {"columns": ["SECID"], "data": []}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let data = client
        .fetch_blocks(&url, &QueryParams::new())
        .await
        .unwrap();

    assert_eq!(data.block("securities").len(), 2);
    assert!(data.block("marketdata").is_empty());
}

#[tokio::test]
async fn non_json_page_is_treated_as_empty() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;
    let url = format!("{}/broken.json", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/broken.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let data = client
        .fetch_blocks(&url, &QueryParams::new())
        .await
        .unwrap();

    assert!(data.is_empty());
}

#[tokio::test]
async fn fan_out_merges_in_identifier_order() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;

    // A answers last, but must still be merged first.
    Mock::given(method("GET"))
        .and(path("/securities/A/bondization.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"coupons": [{"k": 1}]}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/securities/B/bondization.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"coupons": [{"k": 2}]})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let data = client
        .get_bonds_bondization(&["A", "B"], &QueryParams::unlimited())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&data).unwrap(),
        json!({"coupons": [{"k": 1}, {"k": 2}]})
    );
}

#[tokio::test]
async fn fan_out_over_no_identifiers_sends_nothing() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;

    let none: [&str; 0] = [];
    let history = client
        .get_securities_history("stock", "bonds", "TQCB", &none, &QueryParams::new())
        .await
        .unwrap();
    let coupons = client
        .get_bonds_bondization(&none, &QueryParams::unlimited())
        .await
        .unwrap();
    let direct = client
        .fan_out(Vec::new(), &QueryParams::new())
        .await
        .unwrap();

    assert!(history.is_empty() && coupons.is_empty() && direct.is_empty());
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

async fn mount_one_good_one_failing(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/securities/GOOD/bondization.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coupons": {"columns": ["secid"], "data": [["GOOD"]]}
        })))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/securities/BAD/bondization.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn best_effort_drops_failed_branch() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;
    mount_one_good_one_failing(&mock_server).await;

    let data = client
        .get_bonds_bondization(&["BAD", "GOOD"], &QueryParams::unlimited())
        .await
        .unwrap();

    assert_eq!(data.block("coupons").len(), 1);
    assert_eq!(data.block("coupons")[0]["SECID"], json!("GOOD"));
}

#[tokio::test]
async fn fail_fast_returns_transport_error() {
    let (mock_server, client) = setup(FanOutPolicy::FailFast).await;
    mount_one_good_one_failing(&mock_server).await;

    let err = client
        .get_bonds_bondization(&["GOOD", "BAD"], &QueryParams::unlimited())
        .await
        .expect_err("failing branch must abort");

    assert!(matches!(err, AppError::Transport(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn malformed_rows_fail_the_branch() {
    let (mock_server, client) = setup(FanOutPolicy::FailFast).await;

    Mock::given(method("GET"))
        .and(path("/securities/X/bondization.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coupons": {"columns": ["secid", "coupondate"], "data": [["X"]]}
        })))
        .mount(&mock_server)
        .await;

    let err = client
        .get_bonds_bondization(&["X"], &QueryParams::unlimited())
        .await
        .expect_err("short row must fail");

    assert!(matches!(err, AppError::MalformedBlock { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn available_bonds_default_to_board_group_58() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;

    Mock::given(method("GET"))
        .and(path("/engines/stock/markets/bonds/boardgroups/58/securities.json"))
        .and(query_param("limit", "unlimited"))
        .and(query_param("iss.meta", "off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "securities": {"columns": ["SECID", "BOARDID"], "data": [["B1", "TQCB"]]},
            "marketdata": {"columns": ["SECID", "DURATION"], "data": [["B1", 120]]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let params = QueryParams::new().with("iss.meta", "off").unwrap();
    let data = client.get_available_bonds(&[], &params).await.unwrap();

    assert_eq!(data.block("securities").len(), 1);
    assert_eq!(data.block("marketdata")[0]["DURATION"], json!(120));
}

#[tokio::test]
async fn history_for_boards_merges_in_board_order() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;

    for (board, secid, trades) in [("TQCB", "A", 10), ("TQOB", "B", 20)] {
        let route = format!("/history/engines/stock/markets/bonds/boards/{board}/securities/{secid}.json");
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_page(&[(secid, trades)])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_page(&[])))
            .mount(&mock_server)
            .await;
    }

    let boards = vec![
        ("TQCB".to_string(), vec!["A".to_string()]),
        ("TQOB".to_string(), vec!["B".to_string()]),
    ];
    let data = client
        .get_history_for_boards("stock", "bonds", &boards, &QueryParams::new())
        .await
        .unwrap();

    assert_eq!(numtrades(data.block("history")), vec![10, 20]);
}

async fn mount_delayed_coupons(mock_server: &MockServer, secid: &str, k: i64, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/securities/{secid}/bondization.json")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"coupons": [{"k": k}]}))
                .set_delay(delay),
        )
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn concurrency_limit_of_one_keeps_identifier_order() {
    let mock_server = MockServer::start().await;
    let config = IssConfig::builtin()
        .with_base_url(mock_server.uri())
        .with_concurrency_limit(1);
    let client = IssClient::new(config).expect("client");

    mount_delayed_coupons(&mock_server, "A", 1, Duration::from_millis(200)).await;
    mount_delayed_coupons(&mock_server, "B", 2, Duration::from_millis(200)).await;

    let started = Instant::now();
    let data = client
        .get_bonds_bondization(&["A", "B"], &QueryParams::unlimited())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&data).unwrap(),
        json!({"coupons": [{"k": 1}, {"k": 2}]})
    );
    // One request at a time.
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn unbounded_fan_out_keeps_every_branch_in_flight() {
    let (mock_server, client) = setup(FanOutPolicy::BestEffort).await;

    mount_delayed_coupons(&mock_server, "A", 1, Duration::from_millis(300)).await;
    mount_delayed_coupons(&mock_server, "B", 2, Duration::from_millis(300)).await;

    let started = Instant::now();
    let data = client
        .get_bonds_bondization(&["A", "B"], &QueryParams::unlimited())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(data.block("coupons").len(), 2);
    assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");
}

#[tokio::test]
async fn supplied_session_is_used_for_requests() {
    let mock_server = MockServer::start().await;

    let mut headers = HeaderMap::new();
    headers.insert(
        "cookie",
        HeaderValue::from_static("MicexPassportCert=session-token"),
    );
    let session = reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .unwrap();
    let config = IssConfig::builtin().with_base_url(mock_server.uri());
    let client = IssClient::with_client(session, config);

    Mock::given(method("GET"))
        .and(path("/securities/B1/bondization.json"))
        .and(header("cookie", "MicexPassportCert=session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coupons": {"columns": ["secid"], "data": [["B1"]]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    assert_eq!(client.config().base_url, mock_server.uri());
    let data = client
        .get_bonds_bondization(&["B1"], &QueryParams::unlimited())
        .await
        .unwrap();

    assert_eq!(data.block("coupons").len(), 1);
}

#[tokio::test]
async fn bond_on_two_boards_is_ranked_once() {
    let (mock_server, client) = setup(FanOutPolicy::FailFast).await;

    Mock::given(method("GET"))
        .and(path("/engines/stock/markets/bonds/boardgroups/58/securities.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "securities": {
                "columns": ["SECID", "BOARDID", "SECNAME", "FACEVALUE", "MATDATE",
                            "PREVLEGALCLOSEPRICE", "ACCRUEDINT", "COUPONVALUE"],
                "data": [
                    ["B1", "TQCB", "Bond 1", 1000, "2030-01-01", 100, 0, 10],
                    ["B1", "TQOB", "Bond 1", 1000, "2030-01-01", 100, 0, 10]
                ]
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(
            r"^/history/engines/stock/markets/bonds/boards/TQ(CB|OB)/securities/B1\.json$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_page(&[])))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/securities/B1/bondization.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coupons": {"columns": ["coupondate", "secid"], "data": [["2029-07-01", "B1"]]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = ScreenRequest {
        boardgroups: vec![58],
        history_from: "2024-01-01".to_string(),
        coupons_from: "2024-01-15".to_string(),
    };
    let dataset = screen_bonds(&client, &request).await.unwrap();
    let ranked = rank_by_profit(&dataset, &secids(&dataset));

    assert_eq!(dataset.block("coupons").len(), 1);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].secid, "B1");
    assert_eq!(ranked[0].coupons, 1);
    assert_eq!(ranked[0].profit, Decimal::new(10, 0));
}
