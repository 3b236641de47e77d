use crate::domain::BlockInfo;
use crate::foundation::ItestError;
use crate::infrastructure::poll::{poll_until, PollPolicy};
use crate::infrastructure::rpc::ConsumerController;
use log::info;

/// Waits until `count` consecutive finalized blocks have been seen, counting from the first
/// finalized block this call observes rather than from genesis. `0` is treated as `1`.
///
/// Returns the first observed and the latest finalized block.
pub async fn wait_for_finalized_span(
    consumer: &dyn ConsumerController,
    count: u64,
    policy: PollPolicy,
) -> Result<(BlockInfo, BlockInfo), ItestError> {
    let first = poll_until("first finalized block", policy, || async move { consumer.query_latest_finalized_block().await }).await?;
    let first_height = first.height;
    let span = count.max(1) - 1;
    let latest = poll_until(&format!("{count} finalized blocks since {first_height}"), policy, || async move {
        let latest = consumer.query_latest_finalized_block().await?;
        Ok(latest.filter(|block| block.height.saturating_sub(first_height) >= span))
    })
    .await?;
    info!("finalized blocks observed first={} latest={}", first.height, latest.height);
    Ok((first, latest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::{BlockHash, Height};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays a fixed sequence of "latest finalized" answers, repeating the last one forever.
    struct ScriptedConsumer {
        answers: Mutex<VecDeque<Option<Height>>>,
        queries: Mutex<usize>,
    }

    impl ScriptedConsumer {
        fn new(answers: &[Option<Height>]) -> Self {
            Self { answers: Mutex::new(answers.iter().copied().collect()), queries: Mutex::new(0) }
        }
    }

    fn block(height: Height) -> BlockInfo {
        BlockInfo { height, hash: BlockHash::new([height as u8; 32]), finalized: true }
    }

    #[async_trait]
    impl ConsumerController for ScriptedConsumer {
        async fn query_is_block_finalized(&self, _height: Height) -> Result<bool, ItestError> {
            Ok(true)
        }
        async fn query_latest_block_height(&self) -> Result<Height, ItestError> {
            Ok(0)
        }
        async fn query_latest_finalized_block(&self) -> Result<Option<BlockInfo>, ItestError> {
            *self.queries.lock() += 1;
            let mut answers = self.answers.lock();
            let answer = if answers.len() > 1 { answers.pop_front().flatten() } else { answers.front().copied().flatten() };
            Ok(answer.map(block))
        }
        async fn query_block(&self, height: Height) -> Result<BlockInfo, ItestError> {
            Ok(block(height))
        }
    }

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(2), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_span_is_measured_from_first_observed_finalized_block() {
        let consumer = ScriptedConsumer::new(&[None, None, Some(10), Some(10), Some(11), Some(12), Some(13)]);
        let (first, latest) = wait_for_finalized_span(&consumer, 3, fast()).await.expect("three finalized blocks");
        assert_eq!(first.height, 10);
        assert_eq!(latest.height, 12);
        assert_eq!(*consumer.queries.lock(), 6);
    }

    #[tokio::test]
    async fn test_chain_already_far_ahead_still_needs_a_full_span() {
        let consumer = ScriptedConsumer::new(&[Some(50), Some(50), Some(51), Some(52)]);
        let (first, latest) = wait_for_finalized_span(&consumer, 3, fast()).await.expect("span");
        assert_eq!(first.height, 50);
        assert_eq!(latest.height, 52);
    }

    #[tokio::test]
    async fn test_zero_and_one_return_the_first_finalized_block() {
        for count in [0, 1] {
            let consumer = ScriptedConsumer::new(&[None, Some(7), Some(8)]);
            let (first, latest) = wait_for_finalized_span(&consumer, count, fast()).await.expect("one block");
            assert_eq!(first.height, 7);
            assert_eq!(latest.height, 8);
        }
    }

    #[tokio::test]
    async fn test_stalled_finalization_times_out() {
        let consumer = ScriptedConsumer::new(&[Some(4)]);
        let policy = PollPolicy::new(Duration::from_millis(100), Duration::from_millis(10));
        let err = wait_for_finalized_span(&consumer, 2, policy).await.unwrap_err();
        assert!(matches!(err, ItestError::ConvergenceTimeout { .. }));
    }
}
