//! Google backend
//!
//! Requests ask the SERP proxy for its parsed JSON rendering (`brd_json=1`),
//! which lists organic hits under `organic` with `link`/`description`/`rank`.

use chrono::NaiveDate;

use super::dates::google_tbs;
use super::extract::json_hits;
use super::{request_url, BackendDialect, BackendRequest, RawHit, ResponseFormat};
use crate::error::SearchResult;
use crate::types::TaskOptions;

pub struct GoogleDialect;

impl BackendDialect for GoogleDialect {
    fn name(&self) -> &str {
        "google"
    }

    fn format(&self) -> ResponseFormat {
        ResponseFormat::Json
    }

    fn build_request(
        &self,
        endpoint: &str,
        keyword: &str,
        options: &TaskOptions,
        _today: NaiveDate,
    ) -> SearchResult<BackendRequest> {
        let mut params = vec![
            ("q", keyword.to_string()),
            ("num", options.result_cap.to_string()),
            ("brd_json", "1".to_string()),
        ];
        if let Some(ref lang) = options.language {
            params.push(("hl", lang.to_lowercase()));
        }
        if let Some(ref country) = options.country {
            params.push(("gl", country.to_lowercase()));
        }
        if let Some(ref range) = options.date_range {
            params.push(("tbs", google_tbs(range)));
        }

        Ok(BackendRequest {
            backend: self.name().to_string(),
            url: request_url(self.name(), endpoint, &params)?,
            format: self.format(),
        })
    }

    fn parse_response(&self, body: &str) -> SearchResult<Vec<RawHit>> {
        json_hits(body)
    }
}
