//! Parallel scan segmentation.

use dynaflow_model::input::ScanInput;
use futures::future::join_all;
use tracing::debug;

use crate::error::DynaflowResult;
use crate::paginate::{AggregatedResult, Paging, paginate};
use crate::retry::RetryableExecutor;

/// Most segments a scan may be split into.
pub const MAX_TOTAL_SEGMENTS: u32 = 1_000_000;

/// Segment count and per-segment item limit of a parallel scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub total_segments: u32,
    pub segment_limit: Option<usize>,
}

/// Work out how to split a scan.
///
/// `requested` is clamped into `1..=MAX_TOTAL_SEGMENTS`. With a `limit`,
/// the count is further capped at `ceil(limit * 0.2)` so small limits do
/// not spray requests over many segments, and each segment is asked for
/// `ceil(limit / segments)` items.
#[must_use]
pub fn plan_segments(requested: u32, limit: Option<usize>) -> SegmentPlan {
    let mut total_segments = requested.clamp(1, MAX_TOTAL_SEGMENTS);
    let segment_limit = limit.map(|limit| {
        let by_limit = u32::try_from(limit.div_ceil(5)).unwrap_or(u32::MAX);
        total_segments = total_segments.min(by_limit).max(1);
        limit.div_ceil(total_segments as usize)
    });
    SegmentPlan {
        total_segments,
        segment_limit,
    }
}

/// Run a scan, splitting it into parallel segments when possible.
///
/// Segmentation applies only to a fresh multi-page scan: a supplied start
/// key, an explicit segment or single-page mode each fall back to one
/// paginated call. Segment outputs are concatenated in segment order and
/// the total is truncated to `paging.limit`.
pub async fn scan(
    executor: &RetryableExecutor,
    mut input: ScanInput,
    paging: Paging,
    segments: Option<u32>,
) -> DynaflowResult<AggregatedResult> {
    if !input.exclusive_start_key.is_empty() {
        input.segment = None;
        input.total_segments = None;
        return paginate(executor, input, paging).await;
    }
    if let Some(segment) = input.segment {
        let max_total = i32::try_from(MAX_TOTAL_SEGMENTS).unwrap_or(i32::MAX);
        let total = input.total_segments.unwrap_or(1).clamp(1, max_total);
        input.total_segments = Some(total);
        input.segment = Some(segment.clamp(0, total - 1));
        return paginate(executor, input, paging).await;
    }
    let Some(requested) = segments.filter(|_| !paging.single_page) else {
        input.total_segments = None;
        return paginate(executor, input, paging).await;
    };

    let plan = plan_segments(requested, paging.limit);
    debug!(
        table = %input.table_name,
        segments = plan.total_segments,
        segment_limit = ?plan.segment_limit,
        "scanning in parallel segments"
    );
    let total = i32::try_from(plan.total_segments).unwrap_or(i32::MAX);
    if let Some(segment_limit) = plan.segment_limit {
        input.limit = Some(i32::try_from(segment_limit).unwrap_or(i32::MAX));
    }
    let segment_paging = Paging {
        limit: plan.segment_limit,
        single_page: false,
    };

    let outcomes = join_all((0..total).map(|segment| {
        let request = ScanInput {
            segment: Some(segment),
            total_segments: Some(total),
            ..input.clone()
        };
        paginate(executor, request, segment_paging)
    }))
    .await;

    let mut result = AggregatedResult::default();
    for outcome in outcomes {
        result.merge(outcome?);
    }
    if let Some(limit) = paging.limit {
        result.truncate(limit);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dynaflow_model::DynamoDBOperation;

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::test_support::{MemoryClient, Reply, page};

    fn executor(client: Arc<MemoryClient>) -> RetryableExecutor {
        RetryableExecutor::new(client, ExecutorConfig::default())
    }

    /// Every segment holds `per_segment` items, returned one page at a time.
    fn segmented_table(client: &MemoryClient, per_segment: usize) {
        client.on(DynamoDBOperation::Scan, move |request| {
            let segment = request["Segment"].as_i64().unwrap_or(0);
            let ids: Vec<String> = (0..per_segment).map(|i| format!("{segment}-{i}")).collect();
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            Reply::Ok(page(&ids, None))
        });
    }

    #[test]
    fn test_should_cap_segments_by_limit() {
        assert_eq!(
            plan_segments(10, Some(50)),
            SegmentPlan {
                total_segments: 10,
                segment_limit: Some(5),
            }
        );
        assert_eq!(
            plan_segments(10, Some(12)),
            SegmentPlan {
                total_segments: 3,
                segment_limit: Some(4),
            }
        );
        assert_eq!(plan_segments(10, Some(3)).total_segments, 1);
        assert_eq!(plan_segments(10, None).segment_limit, None);
    }

    #[test]
    fn test_should_clamp_segment_count() {
        assert_eq!(plan_segments(0, None).total_segments, 1);
        assert_eq!(
            plan_segments(5_000_000, None).total_segments,
            MAX_TOTAL_SEGMENTS
        );
    }

    #[tokio::test]
    async fn test_should_fan_out_default_segments() {
        let client = MemoryClient::new();
        segmented_table(&client, 2);
        let result = scan(
            &executor(client.clone()),
            ScanInput::default(),
            Paging::default(),
            Some(10),
        )
        .await
        .expect("scan");
        assert_eq!(result.items.len(), 20);
        assert_eq!(result.count, 20);
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 10);
        assert!(calls.iter().all(|call| call["TotalSegments"] == 10));
    }

    #[tokio::test]
    async fn test_should_split_limit_across_segments() {
        let client = MemoryClient::new();
        segmented_table(&client, 7);
        let paging = Paging {
            limit: Some(50),
            single_page: false,
        };
        let result = scan(&executor(client.clone()), ScanInput::default(), paging, Some(10))
            .await
            .expect("scan");
        assert_eq!(result.items.len(), 50);
        assert_eq!(result.count, 50);
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 10);
        assert!(calls.iter().all(|call| call["Limit"] == 5));
    }

    #[tokio::test]
    async fn test_should_bypass_segments_when_resuming() {
        let client = MemoryClient::new();
        segmented_table(&client, 1);
        let mut input = ScanInput::default();
        input.exclusive_start_key = [("pk".to_owned(), "x".into())].into_iter().collect();
        scan(&executor(client.clone()), input, Paging::default(), Some(10))
            .await
            .expect("scan");
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].get("TotalSegments").is_none());
    }

    #[tokio::test]
    async fn test_should_clamp_explicit_segment() {
        let client = MemoryClient::new();
        segmented_table(&client, 1);
        let input = ScanInput {
            segment: Some(15),
            total_segments: Some(4),
            ..ScanInput::default()
        };
        scan(&executor(client.clone()), input, Paging::default(), Some(10))
            .await
            .expect("scan");
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["Segment"], 3);
        assert_eq!(calls[0]["TotalSegments"], 4);
    }

    #[tokio::test]
    async fn test_should_cap_explicit_total_segments() {
        let client = MemoryClient::new();
        segmented_table(&client, 1);
        let input = ScanInput {
            segment: Some(i32::MAX),
            total_segments: Some(i32::MAX),
            ..ScanInput::default()
        };
        scan(&executor(client.clone()), input, Paging::default(), Some(10))
            .await
            .expect("scan");
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["TotalSegments"], 1_000_000);
        assert_eq!(calls[0]["Segment"], 999_999);
    }

    #[tokio::test]
    async fn test_should_not_segment_single_page_scan() {
        let client = MemoryClient::new();
        segmented_table(&client, 3);
        let paging = Paging {
            limit: None,
            single_page: true,
        };
        let result = scan(&executor(client.clone()), ScanInput::default(), paging, Some(10))
            .await
            .expect("scan");
        assert_eq!(result.items.len(), 3);
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].get("Segment").is_none());
        assert!(calls[0].get("TotalSegments").is_none());
    }

    #[tokio::test]
    async fn test_should_not_segment_when_segments_disabled() {
        let client = MemoryClient::new();
        segmented_table(&client, 2);
        let result = scan(
            &executor(client.clone()),
            ScanInput::default(),
            Paging::default(),
            None,
        )
        .await
        .expect("scan");
        assert_eq!(result.items.len(), 2);
        let calls = client.calls(DynamoDBOperation::Scan);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].get("TotalSegments").is_none());
    }
}
