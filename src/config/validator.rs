use std::collections::HashSet;

use crate::error::{AppError, Result};

use super::IssConfig;

/// Validate the client configuration and surface every problem at once.
pub fn validate(config: &IssConfig) -> Result<()> {
    let mut issues = Vec::new();

    validate_base_url(&config.base_url, &mut issues);
    validate_proxy(config.proxy_url.as_deref(), &mut issues);
    validate_limits(config, &mut issues);
    validate_blocks(&config.blocks, &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::configuration(format!(
            "ISS client config invalid:\n  - {}",
            issues.join("\n  - ")
        )))
    }
}

fn validate_base_url(base_url: &str, issues: &mut Vec<String>) {
    if base_url.trim().is_empty() {
        issues.push("base_url must not be empty".to_string());
        return;
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        issues.push(format!("base_url `{base_url}` must use http or https"));
    }
    if base_url.contains('{') || base_url.contains('}') {
        issues.push(format!("base_url `{base_url}` must not contain placeholders"));
    }
}

fn validate_proxy(proxy_url: Option<&str>, issues: &mut Vec<String>) {
    if let Some(proxy) = proxy_url {
        if reqwest::Proxy::all(proxy).is_err() {
            issues.push(format!("proxy_url `{proxy}` is not a valid proxy URL"));
        }
    }
}

fn validate_limits(config: &IssConfig, issues: &mut Vec<String>) {
    if config.timeout.is_zero() {
        issues.push("timeout must be greater than zero".to_string());
    }
    if config.concurrency_limit == Some(0) {
        issues.push("concurrency_limit must be at least 1 when set".to_string());
    }
}

fn validate_blocks(blocks: &[String], issues: &mut Vec<String>) {
    if blocks.is_empty() {
        issues.push("blocks must name at least one response block".to_string());
    }

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for block in blocks {
        if block.trim().is_empty() {
            issues.push("blocks contains an empty name".to_string());
        } else if !seen.insert(block.as_str()) {
            duplicates.push(block.clone());
        }
    }

    if !duplicates.is_empty() {
        issues.push(format!(
            "blocks contains duplicate names: {}",
            duplicates.join(", ")
        ));
    }
}
