use homeflux_types::QueuedCommand;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 队列状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub size: usize,
    pub max_size: usize,
    /// 因队列满而被淘汰的指令总数
    pub dropped_total: u64,
}

struct QueueInner {
    entries: VecDeque<(u64, QueuedCommand)>,
    next_seq: u64,
    dropped_total: u64,
}

/// 离线指令队列
///
/// 有界 FIFO，超出上限时淘汰最旧的一条。不做去重。
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<RwLock<QueueInner>>,
    max_queue_size: usize,
}

impl CommandQueue {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(QueueInner {
                entries: VecDeque::new(),
                next_seq: 0,
                dropped_total: 0,
            })),
            max_queue_size: max_queue_size.max(1),
        }
    }

    /// 入队，返回被淘汰的指令（如有）
    pub async fn enqueue(&self, command: QueuedCommand) -> Option<QueuedCommand> {
        let mut inner = self.inner.write().await;

        let mut evicted = None;
        if inner.entries.len() >= self.max_queue_size {
            evicted = inner.entries.pop_front().map(|(_, cmd)| cmd);
            inner.dropped_total += 1;
            warn!(
                max_size = self.max_queue_size,
                evicted_device = ?evicted.as_ref().map(|c| c.device_id.as_str()),
                "Command queue is full, dropping oldest command"
            );
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        debug!(
            device_id = %command.device_id,
            action = command.command.action.as_str(),
            seq = seq,
            "Command enqueued"
        );

        inner.entries.push_back((seq, command));
        evicted
    }

    /// 查看队首（附带序号）
    pub async fn front(&self) -> Option<(u64, QueuedCommand)> {
        self.inner.read().await.entries.front().cloned()
    }

    /// 仅当队首仍是 `seq` 时将其移除
    pub async fn remove_front_if(&self, seq: u64) -> Option<QueuedCommand> {
        let mut inner = self.inner.write().await;
        match inner.entries.front() {
            Some((front_seq, _)) if *front_seq == seq => inner.entries.pop_front().map(|(_, c)| c),
            _ => None,
        }
    }

    /// 按插入顺序列出所有排队指令
    pub async fn snapshot(&self) -> Vec<QueuedCommand> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub async fn status(&self) -> QueueStatus {
        let inner = self.inner.read().await;
        QueueStatus {
            size: inner.entries.len(),
            max_size: self.max_queue_size,
            dropped_total: inner.dropped_total,
        }
    }

    /// 清空队列，返回被清除的数量
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.write().await;
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeflux_types::DeviceCommand;

    fn queued(device_id: &str) -> QueuedCommand {
        QueuedCommand::new(device_id, DeviceCommand::turn_off())
    }

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let queue = CommandQueue::new(10);
        queue.enqueue(queued("a")).await;
        queue.enqueue(queued("b")).await;

        let ids: Vec<_> = queue.snapshot().await.into_iter().map(|c| c.device_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let (_, head) = queue.front().await.unwrap();
        assert_eq!(head.device_id, "a");
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_queue_size_limit_drops_oldest() {
        let queue = CommandQueue::new(3);

        for i in 0..5 {
            let evicted = queue.enqueue(queued(&format!("dev_{}", i))).await;
            if i < 3 {
                assert!(evicted.is_none());
            } else {
                assert_eq!(evicted.unwrap().device_id, format!("dev_{}", i - 3));
            }
        }

        let ids: Vec<_> = queue.snapshot().await.into_iter().map(|c| c.device_id).collect();
        assert_eq!(ids, vec!["dev_2", "dev_3", "dev_4"]);

        let status = queue.status().await;
        assert_eq!(status.size, 3);
        assert_eq!(status.max_size, 3);
        assert_eq!(status.dropped_total, 2);
    }

    #[tokio::test]
    async fn test_identical_commands_are_not_deduplicated() {
        let queue = CommandQueue::new(10);
        queue.enqueue(queued("a")).await;
        queue.enqueue(queued("a")).await;
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_front_if_checks_sequence() {
        let queue = CommandQueue::new(1);
        queue.enqueue(queued("old")).await;
        let (seq, _) = queue.front().await.unwrap();

        // 队首被淘汰后，旧序号不能移除新队首
        queue.enqueue(queued("new")).await;
        assert!(queue.remove_front_if(seq).await.is_none());
        assert_eq!(queue.len().await, 1);

        let (seq, _) = queue.front().await.unwrap();
        assert_eq!(queue.remove_front_if(seq).await.unwrap().device_id, "new");
        assert!(queue.is_empty().await);
    }
}
