//! 执行输出数据流
//!
//! 单一生产者、任意数量读者的文本流。每个读者拥有独立的队列，
//! 只能看到自己加入之后推送的数据块（不做回放缓冲）。
//! 流关闭后，每个读者在读完已排队的数据后结束；
//! 所有曾加入的读者都结束（或被丢弃）后，`drained` 才会完成。

use futures::stream::{FusedStream, Stream};
use parking_lot::Mutex;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

struct StreamInner {
    readers: Vec<mpsc::UnboundedSender<String>>,
    closed: bool,
}

/// 多读者数据流
pub struct DataStream {
    inner: Mutex<StreamInner>,
    /// 每个读者持有一个 token，token 全部释放且流已关闭即视为排空
    tracker: TaskTracker,
}

impl DataStream {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StreamInner {
                readers: Vec::new(),
                closed: false,
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// 加入一个新读者
    ///
    /// 流已关闭时返回立即结束的空读者
    pub fn attach(&self) -> ExecutionOutput {
        let mut inner = self.inner.lock();
        if inner.closed {
            return ExecutionOutput::empty();
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        inner.readers.push(sender);
        debug!("数据流新增读者，当前读者数: {}", inner.readers.len());

        ExecutionOutput {
            receiver: Some(receiver),
            token: Some(self.tracker.token()),
        }
    }

    /// 向当前所有读者推送数据块，返回收到该数据块的读者数
    ///
    /// 已被丢弃的读者会被顺带清理
    pub fn push(&self, chunk: &str) -> usize {
        let mut inner = self.inner.lock();
        if inner.closed {
            return 0;
        }

        inner
            .readers
            .retain(|sender| sender.send(chunk.to_owned()).is_ok());
        inner.readers.len()
    }

    /// 关闭数据流，释放所有等待中的读者
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            // 丢弃发送端后，读者读完已排队的数据即结束
            inner.readers.clear();
        }
        self.tracker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// 尚未结束的读者数
    pub fn active_readers(&self) -> usize {
        self.tracker.len()
    }

    /// 排空信号：流关闭且所有读者都已结束后完成
    ///
    /// 信号不借用数据流，可在数据流销毁后继续等待
    pub fn drained(&self) -> DrainSignal {
        DrainSignal {
            tracker: self.tracker.clone(),
        }
    }
}

impl Default for DataStream {
    fn default() -> Self {
        Self::new()
    }
}

/// 数据流排空信号
#[derive(Clone)]
pub struct DrainSignal {
    tracker: TaskTracker,
}

impl DrainSignal {
    pub async fn wait(&self) {
        self.tracker.wait().await
    }

    pub fn is_drained(&self) -> bool {
        self.tracker.is_closed() && self.tracker.is_empty()
    }
}

/// 执行输出读者
///
/// 实现 `Stream<Item = String>`，在执行结束（或会话销毁）时终止
pub struct ExecutionOutput {
    receiver: Option<mpsc::UnboundedReceiver<String>>,
    token: Option<TaskTrackerToken>,
}

impl ExecutionOutput {
    /// 立即结束的空读者
    pub fn empty() -> Self {
        Self {
            receiver: None,
            token: None,
        }
    }
}

impl Stream for ExecutionOutput {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(None);
        };

        match receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk)),
            Poll::Ready(None) => {
                // 读者观察到结束后才释放 token
                this.receiver = None;
                this.token = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for DrainSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainSignal")
            .field("pending_readers", &self.tracker.len())
            .field("drained", &self.is_drained())
            .finish()
    }
}

impl std::fmt::Debug for ExecutionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOutput")
            .field("terminated", &self.receiver.is_none())
            .finish()
    }
}

impl FusedStream for ExecutionOutput {
    fn is_terminated(&self) -> bool {
        self.receiver.is_none()
    }
}
