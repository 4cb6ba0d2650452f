use std::collections::HashMap;

use crate::error::{AppError, Result};

use super::FetchResult;

/// ISS methods the client knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssMethod {
    /// Daily trading history of one security on one board.
    SecHistory,
    /// Coupon, amortization and offer schedule of one bond.
    SecBondization,
    /// Bonds listed in one board group.
    Bonds,
}

impl IssMethod {
    pub fn template(&self) -> &'static str {
        match self {
            IssMethod::SecHistory => {
                "history/engines/{engine}/markets/{market}/boards/{board}/securities/{security}"
            }
            IssMethod::SecBondization => "securities/{secid}/bondization",
            IssMethod::Bonds => "engines/stock/markets/bonds/boardgroups/{boardgroup}/securities",
        }
    }
}

/// Path parameters substituted into a method template.
pub type PathParams<'a> = HashMap<&'a str, String>;

/// Build the full `.json` URL for `method` under `base_url`.
pub fn resolve(base_url: &str, method: IssMethod, params: &PathParams<'_>) -> FetchResult<String> {
    let path = render_path(method.template(), params)?;
    Ok(format!("{}/{}.json", base_url.trim_end_matches('/'), path))
}

/// Substitute every `{name}` segment of a `/`-separated template.
///
/// Placeholders occupy whole segments; a brace anywhere else is a template error.
fn render_path(template: &str, params: &PathParams<'_>) -> Result<String> {
    let segments = template
        .split('/')
        .map(|segment| -> Result<String> {
            let Some(rest) = segment.strip_prefix('{') else {
                if segment.contains(['{', '}']) {
                    return Err(AppError::configuration(format!(
                        "Stray brace in segment `{segment}` of template `{template}`"
                    )));
                }
                return Ok(segment.to_string());
            };

            let key = rest.strip_suffix('}').ok_or_else(|| {
                AppError::configuration(format!(
                    "Unterminated placeholder `{segment}` in template `{template}`"
                ))
            })?;
            if key.is_empty() || key.contains(['{', '}']) {
                return Err(AppError::configuration(format!(
                    "Malformed placeholder `{segment}` in template `{template}`"
                )));
            }

            let value = params.get(key).ok_or_else(|| {
                AppError::configuration(format!(
                    "No value provided for path parameter `{key}` in template `{template}`"
                ))
            })?;
            check_segment(key, value)?;
            Ok(value.clone())
        })
        .collect::<Result<Vec<String>>>()?;

    Ok(segments.join("/"))
}

/// A parameter value must stay one literal path segment once inserted.
fn check_segment(key: &str, value: &str) -> Result<()> {
    let reserved = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
    };
    if value.is_empty() || value == "." || value == ".." || value.contains(reserved) {
        return Err(AppError::configuration(format!(
            "Path parameter `{key}` has value `{value}` that is not a single URL path segment"
        )));
    }
    Ok(())
}
