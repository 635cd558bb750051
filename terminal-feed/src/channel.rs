//! Subscription channels over the shared push-feed connection
//!
//! A channel sends its topic's subscribe control message once the shared
//! connection is open, decodes every binary frame it receives with the
//! topic's schema and publishes the resulting decoded stream to its caller.
//!
//! ## State machine
//!
//! - `Idle`: constructed, nothing sent
//! - `Disabled`: never connects, subscribes or decodes
//! - `AwaitingOpen`: connection exists but is not open yet
//! - `Subscribed`: subscribe sent on this connection, frames are decoded
//! - `Reconnecting`: the connection closed; attempt `i` fires
//!   `reconnect_delay * (i + 1)` after the close
//! - `Stalled`: every reconnect attempt failed
//!
//! The subscribe message is sent at most once per connection generation.
//! Tearing a channel down detaches its listener but never closes the shared
//! connection.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use terminal_core::{ClientMessage, FeedError, ReadyState, RetentionMode, TopicDescriptor};
use terminal_proto::MessageCodec;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, trace, warn};

use crate::config::{FeedConfig, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_BASE};
use crate::connection::{Connection, FrameListener};
use crate::manager::ConnectionProvider;
use crate::stream::apply_batch;

/// Invoked once when a channel gives up reconnecting
pub type ExhaustedCallback = Arc<dyn Fn(&TopicDescriptor) + Send + Sync>;

/// Per-channel behavior
#[derive(Clone)]
pub struct ChannelOptions {
    /// Suppress all connecting, subscribing and decoding
    pub disabled: bool,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// Send the Unsubscribe control message on teardown
    pub unsubscribe_on_close: bool,
    pub on_exhausted: Option<ExhaustedCallback>,
}

impl ChannelOptions {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
            ..Self::default()
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn unsubscribe_on_close(mut self, enabled: bool) -> Self {
        self.unsubscribe_on_close = enabled;
        self
    }

    pub fn on_exhausted(mut self, callback: impl Fn(&TopicDescriptor) + Send + Sync + 'static) -> Self {
        self.on_exhausted = Some(Arc::new(callback));
        self
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            disabled: false,
            reconnect_delay: RECONNECT_DELAY_BASE,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            unsubscribe_on_close: false,
            on_exhausted: None,
        }
    }
}

impl fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("disabled", &self.disabled)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("unsubscribe_on_close", &self.unsubscribe_on_close)
            .field("on_exhausted", &self.on_exhausted.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Idle,
    Disabled,
    AwaitingOpen,
    Subscribed,
    Reconnecting { attempt: u32 },
    Stalled,
}

/// Counters for one channel
#[derive(Debug, Default)]
pub struct ChannelStats {
    subscribes_sent: AtomicU64,
    frames_decoded: AtomicU64,
    frames_dropped: AtomicU64,
}

impl ChannelStats {
    pub fn subscribes_sent(&self) -> u64 {
        self.subscribes_sent.load(Ordering::Relaxed)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    /// Frames that failed to decode, logged or not
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

/// Entry point for opening channels
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionChannel;

impl SubscriptionChannel {
    /// Open a channel for `topic`, subscribing with `request`
    ///
    /// Must be called from within a tokio runtime unless the channel is disabled.
    pub fn open<T>(
        provider: Arc<dyn ConnectionProvider>,
        codec: MessageCodec,
        topic: TopicDescriptor,
        request: ClientMessage,
        options: ChannelOptions,
    ) -> ChannelHandle<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let (messages_tx, messages_rx) = watch::channel(VecDeque::new());
        let (state_tx, state_rx) = watch::channel(ChannelState::Idle);
        let stats = Arc::new(ChannelStats::default());

        if options.disabled {
            debug!("[Channel {}] Disabled, not connecting", topic.channel);
            state_tx.send_replace(ChannelState::Disabled);
            return ChannelHandle {
                topic,
                messages: messages_rx,
                state: state_rx,
                stats,
                cancel: None,
                task: None,
            };
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = ChannelTask {
            provider,
            codec,
            topic: topic.clone(),
            request,
            options,
            messages_tx,
            state_tx,
            stats: Arc::clone(&stats),
            attached: None,
            sent_generation: None,
            rejected_generation: None,
            schema_failed: false,
        };
        let join = tokio::spawn(task.run(cancel_rx));

        ChannelHandle {
            topic,
            messages: messages_rx,
            state: state_rx,
            stats,
            cancel: Some(cancel_tx),
            task: Some(join),
        }
    }
}

// ============================================================================
// Supervisor Task
// ============================================================================

struct ChannelTask<T> {
    provider: Arc<dyn ConnectionProvider>,
    codec: MessageCodec,
    topic: TopicDescriptor,
    request: ClientMessage,
    options: ChannelOptions,
    messages_tx: watch::Sender<VecDeque<T>>,
    state_tx: watch::Sender<ChannelState>,
    stats: Arc<ChannelStats>,
    /// Connection our listener is registered on
    attached: Option<(Arc<Connection>, FrameListener)>,
    /// Generation the subscribe message was sent on
    sent_generation: Option<u64>,
    /// Generation on which the subscribe request failed validation
    rejected_generation: Option<u64>,
    schema_failed: bool,
}

impl<T> ChannelTask<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn run(mut self, mut cancel: oneshot::Receiver<()>) {
        let mut connection = self.provider.get_connection(false);

        loop {
            tokio::select! {
                _ = &mut cancel => break,
                _ = self.follow(&connection) => {}
            }

            let next = tokio::select! {
                _ = &mut cancel => break,
                next = self.reconnect(&connection) => next,
            };

            match next {
                Some(next) => connection = next,
                None => {
                    self.stall();
                    let _ = (&mut cancel).await;
                    break;
                }
            }
        }

        self.teardown();
    }

    /// Track one connection until it closes
    async fn follow(&mut self, connection: &Arc<Connection>) {
        let mut state_rx = connection.watch_state();

        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                ReadyState::Connecting => self.set_state(ChannelState::AwaitingOpen),
                ReadyState::Open => self.on_open(connection),
                ReadyState::Closing | ReadyState::Closed => return,
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                frame = next_frame(&mut self.attached) => match frame {
                    Some(frame) => self.handle_frame(&frame),
                    None => self.attached = None,
                },
            }
        }
    }

    fn on_open(&mut self, connection: &Arc<Connection>) {
        let generation = connection.generation();
        if self.sent_generation == Some(generation) {
            self.set_state(ChannelState::Subscribed);
            return;
        }
        if self.rejected_generation == Some(generation) {
            return;
        }

        let text = match self.request.to_text() {
            Ok(text) => text,
            Err(e) => {
                error!("[Channel {}] Subscribe request rejected: {}", self.topic.channel, e);
                self.rejected_generation = Some(generation);
                return;
            }
        };

        match connection.send_text(text) {
            Ok(()) => {
                self.sent_generation = Some(generation);
                self.stats.subscribes_sent.fetch_add(1, Ordering::Relaxed);
                self.attach(connection);
                info!(
                    "[Channel {}] Subscribed on connection #{}",
                    self.topic.channel, generation
                );
                self.set_state(ChannelState::Subscribed);
            }
            Err(e) => warn!("[Channel {}] Failed to subscribe: {}", self.topic.channel, e),
        }
    }

    fn attach(&mut self, connection: &Arc<Connection>) {
        if let Some((current, _)) = &self.attached {
            if current.generation() == connection.generation() {
                return;
            }
        }
        self.detach();
        let listener = connection.add_listener();
        self.attached = Some((Arc::clone(connection), listener));
    }

    fn detach(&mut self) {
        if let Some((connection, listener)) = self.attached.take() {
            connection.remove_listener(listener.id());
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        if self.schema_failed {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let topic = &self.topic;
        match self
            .codec
            .decode_as::<T>(&topic.schema_source, &topic.type_name, frame)
        {
            Ok(message) => {
                let retention = topic.retention;
                self.messages_tx
                    .send_modify(|items| apply_batch(retention, items, [message]));
                self.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_truncated_frame() => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_foreign_frame() => {
                trace!("[Channel {}] Skipping frame for another topic: {}", topic.channel, e);
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e @ FeedError::SchemaLoad { .. }) => {
                error!(
                    "[Channel {}] {}; no messages will be decoded for this topic",
                    topic.channel, e
                );
                self.schema_failed = true;
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("[Channel {}] Error decoding protobuf: {}", topic.channel, e);
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Bounded retry after `closed` went away. Returns the open connection to
    /// follow next, or `None` once every attempt is spent.
    async fn reconnect(&mut self, closed: &Arc<Connection>) -> Option<Arc<Connection>> {
        self.detach();
        self.sent_generation = None;
        self.rejected_generation = None;

        let closed_at = Instant::now();
        let base = self.options.reconnect_delay;
        let max_attempts = self.options.max_reconnect_attempts;
        let mut tracked = self.provider.get_connection(false);
        let mut last_checked = Some(closed.generation());

        info!(
            "[Channel {}] Connection #{} closed, reconnecting",
            self.topic.channel,
            closed.generation()
        );

        for attempt in 1..=max_attempts {
            self.set_state(ChannelState::Reconnecting { attempt });
            let deadline = closed_at + base * (attempt + 1);

            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = wait_until_open(&tracked) => {}
            }

            let current = self.provider.get_connection(false);
            match current.ready_state() {
                ReadyState::Open => {
                    info!(
                        "[Channel {}] Connection #{} is open, resubscribing",
                        self.topic.channel,
                        current.generation()
                    );
                    return Some(current);
                }
                // a connect someone else started gets one interval to finish
                ReadyState::Connecting if last_checked != Some(current.generation()) => {
                    debug!(
                        "[Channel {}] Connection #{} still connecting (attempt {}/{})",
                        self.topic.channel,
                        current.generation(),
                        attempt,
                        max_attempts
                    );
                    last_checked = Some(current.generation());
                    tracked = current;
                }
                _ => {
                    warn!(
                        "[Channel {}] Reconnect attempt {}/{}: forcing a new connection",
                        self.topic.channel, attempt, max_attempts
                    );
                    tracked = self.provider.get_connection(true);
                    last_checked = Some(tracked.generation());
                }
            }
        }

        None
    }

    fn stall(&mut self) {
        error!(
            "[Channel {}] Max reconnect attempts ({}) reached",
            self.topic.channel, self.options.max_reconnect_attempts
        );
        self.set_state(ChannelState::Stalled);
        if let Some(callback) = &self.options.on_exhausted {
            callback(&self.topic);
        }
    }

    fn teardown(&mut self) {
        if let Some((connection, listener)) = self.attached.take() {
            connection.remove_listener(listener.id());

            let subscribed_here = self.sent_generation == Some(connection.generation());
            if self.options.unsubscribe_on_close
                && subscribed_here
                && connection.ready_state().is_open()
            {
                let result = ClientMessage::unsubscribe(self.topic.channel.clone())
                    .to_text()
                    .and_then(|text| connection.send_text(text));
                if let Err(e) = result {
                    warn!("[Channel {}] Failed to unsubscribe: {}", self.topic.channel, e);
                }
            }
        }
        debug!("[Channel {}] Torn down", self.topic.channel);
    }

    fn set_state(&self, next: ChannelState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

async fn next_frame(attached: &mut Option<(Arc<Connection>, FrameListener)>) -> Option<Bytes> {
    match attached {
        Some((_, listener)) => listener.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until_open(connection: &Connection) {
    let mut state_rx = connection.watch_state();
    loop {
        if state_rx.borrow_and_update().is_open() {
            return;
        }
        if state_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Caller Handle
// ============================================================================

/// Caller side of a subscription channel
///
/// Dropping the handle tears the channel down.
pub struct ChannelHandle<T> {
    topic: TopicDescriptor,
    messages: watch::Receiver<VecDeque<T>>,
    state: watch::Receiver<ChannelState>,
    stats: Arc<ChannelStats>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<T> ChannelHandle<T> {
    pub fn topic(&self) -> &TopicDescriptor {
        &self.topic
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    /// Wait for the decoded stream to change. `false` once the channel is gone.
    pub async fn changed(&mut self) -> bool {
        self.messages.changed().await.is_ok()
    }

    /// Wait until the channel reaches a state matching `f`
    pub async fn wait_for_state(
        &mut self,
        f: impl FnMut(&ChannelState) -> bool,
    ) -> Option<ChannelState> {
        self.state.wait_for(f).await.ok().map(|state| *state)
    }

    /// Tear the channel down and wait until its listener is detached
    pub async fn close(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T: Clone> ChannelHandle<T> {
    /// Snapshot of the decoded stream
    pub fn messages(&self) -> Vec<T> {
        self.messages.borrow().iter().cloned().collect()
    }

    /// Most recently decoded message
    pub fn latest(&self) -> Option<T> {
        let items = self.messages.borrow();
        match self.topic.retention {
            RetentionMode::NewestFirst => items.front().cloned(),
            RetentionMode::ArrivalOrder | RetentionMode::KeepLatest => items.back().cloned(),
        }
    }

    /// Wait until the decoded stream satisfies `f`, returning a snapshot
    pub async fn wait_for_messages(
        &mut self,
        f: impl FnMut(&VecDeque<T>) -> bool,
    ) -> Option<Vec<T>> {
        self.messages
            .wait_for(f)
            .await
            .ok()
            .map(|items| items.iter().cloned().collect())
    }
}

impl<T> ChannelHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Stream of decoded-stream snapshots, one per change
    pub fn into_stream(self) -> ChannelStream<T> {
        let inner = WatchStream::from_changes(self.messages.clone());
        ChannelStream {
            _handle: self,
            inner,
        }
    }
}

impl<T> Drop for ChannelHandle<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl<T> fmt::Debug for ChannelHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("topic", &self.topic.channel)
            .field("state", &self.state())
            .field("messages", &self.len())
            .finish()
    }
}

/// Owns the channel while streaming its snapshots
pub struct ChannelStream<T> {
    _handle: ChannelHandle<T>,
    inner: WatchStream<VecDeque<T>>,
}

impl<T> Stream for ChannelStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = Vec<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|snapshot| snapshot.map(Vec::from))
    }
}
