//! Query splitting
//!
//! Cuts a full-scan query into key ranges a caller can fan out over. The
//! ranges are equal-width over the engine-reported span of the split
//! column, half-open, with the first unbounded below and the last
//! unbounded above: their union is the whole key space and no key falls
//! in two of them, so the splits partition the original row set exactly.

use tablet_common::{BoundQuery, KeyRange, QuerySplit, Result};
use tablet_txpool::QueryEngine;

/// Split `query` into up to `split_count` parallelizable slices.
pub fn split(
    engine: &dyn QueryEngine,
    query: &BoundQuery,
    split_count: u32,
) -> Result<Vec<QuerySplit>> {
    let count = split_count.max(1) as i128;
    if count == 1 {
        return Ok(vec![QuerySplit {
            query: query.clone(),
            key_range: KeyRange::all(),
        }]);
    }

    let (min, max) = engine.column_range(query)?;
    let span = max as i128 - min as i128;

    // Interior boundaries; duplicates collapse on narrow spans.
    let mut boundaries: Vec<i64> = Vec::new();
    for i in 1..count {
        let boundary = (min as i128 + span * i / count) as i64;
        if boundary > min && boundaries.last() != Some(&boundary) {
            boundaries.push(boundary);
        }
    }

    let mut splits = Vec::with_capacity(boundaries.len() + 1);
    let mut start: Option<i64> = None;
    for boundary in boundaries {
        splits.push(QuerySplit {
            query: query.clone(),
            key_range: KeyRange {
                start,
                end: Some(boundary),
            },
        });
        start = Some(boundary);
    }
    splits.push(QuerySplit {
        query: query.clone(),
        key_range: KeyRange { start, end: None },
    });
    Ok(splits)
}
