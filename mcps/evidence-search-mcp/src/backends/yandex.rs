//! Yandex backend
//!
//! Yandex takes the query as `text` and has no URL parameter for an absolute
//! date window, so the range is appended to the query as a `date:` operator.

use chrono::NaiveDate;

use super::dates::yandex_operator;
use super::extract::json_hits;
use super::{request_url, BackendDialect, BackendRequest, RawHit, ResponseFormat};
use crate::error::SearchResult;
use crate::types::TaskOptions;

pub struct YandexDialect;

impl BackendDialect for YandexDialect {
    fn name(&self) -> &str {
        "yandex"
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
        let text = match options.date_range {
            Some(ref range) => format!("{} {}", keyword, yandex_operator(range)),
            None => keyword.to_string(),
        };
        let mut params = vec![
            ("text", text),
            ("numdoc", options.result_cap.to_string()),
            ("brd_json", "1".to_string()),
        ];
        if let Some(ref lang) = options.language {
            params.push(("lang", lang.to_lowercase()));
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
