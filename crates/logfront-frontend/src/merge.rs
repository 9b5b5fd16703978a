//! Merging of sub-query responses

use crate::error::{QueryError, Result};
use logfront_core::{
    Direction, Entry, Labels, Request, Response, ResponseStats, ResponseStatus, ResultData,
    ResultKind, Sample, Series, Stream,
};
use std::collections::BTreeMap;

/// Merge responses for the pieces of `req` into one response.
///
/// Series and streams with identical labels are combined. Metric samples
/// are ordered by time with duplicates for one timestamp dropped. Log
/// entries are ordered by the request direction and cut to its limit.
pub fn merge_responses(req: &Request, responses: Vec<Response>) -> Result<Response> {
    let sub_queries = responses.iter().map(|r| r.stats.sub_queries.max(1)).sum();
    let kind = responses
        .first()
        .map(|r| r.data.kind())
        .unwrap_or_else(|| req.result_kind());

    if responses.iter().any(|r| r.data.kind() != kind) {
        return Err(QueryError::Backend(
            "sub-queries returned mismatched result types".to_string(),
        ));
    }

    let data = match kind {
        ResultKind::Matrix => ResultData::Matrix(merge_matrix(responses)),
        ResultKind::Streams => {
            ResultData::Streams(merge_streams(responses, req.direction, req.limit))
        }
    };

    Ok(Response {
        status: ResponseStatus::Success,
        data,
        stats: ResponseStats { sub_queries },
    })
}

fn merge_matrix(responses: Vec<Response>) -> Vec<Series> {
    let mut by_labels: BTreeMap<Labels, Vec<Sample>> = BTreeMap::new();
    for resp in responses {
        if let ResultData::Matrix(series) = resp.data {
            for s in series {
                by_labels.entry(s.labels).or_default().extend(s.samples);
            }
        }
    }

    by_labels
        .into_iter()
        .map(|(labels, mut samples)| {
            samples.sort_by_key(|s| s.timestamp);
            samples.dedup_by_key(|s| s.timestamp);
            Series { labels, samples }
        })
        .collect()
}

fn merge_streams(responses: Vec<Response>, direction: Direction, limit: u32) -> Vec<Stream> {
    let mut entries: Vec<(Labels, Entry)> = Vec::new();
    for resp in responses {
        if let ResultData::Streams(streams) = resp.data {
            for s in streams {
                let labels = s.labels;
                entries.extend(s.entries.into_iter().map(|e| (labels.clone(), e)));
            }
        }
    }

    match direction {
        Direction::Forward => entries.sort_by_key(|(_, e)| e.timestamp),
        Direction::Backward => entries.sort_by_key(|(_, e)| std::cmp::Reverse(e.timestamp)),
    }
    if limit > 0 {
        entries.truncate(limit as usize);
    }

    let mut by_labels: BTreeMap<Labels, Vec<Entry>> = BTreeMap::new();
    for (labels, entry) in entries {
        by_labels.entry(labels).or_default().push(entry);
    }

    by_labels
        .into_iter()
        .map(|(labels, entries)| Stream { labels, entries })
        .collect()
}
