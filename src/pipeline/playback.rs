//! Ordered playback of synthesized audio clips.
//!
//! [`PlaybackQueue`] owns a FIFO of encoded clips and a single drain worker
//! task.  The worker decodes one clip, starts it, and sleeps for the clip's
//! real duration before touching the next one, so clips play in arrival order
//! and never overlap:
//!
//! ```text
//! enqueue ─▶ pending ──▶ [decode A]▶ play A ─── dur A ───▶ [decode B]▶ play B ─ …
//!                                    ▲                                 ▲
//!                               start(A)                   start(B) ≥ start(A) + dur A
//! ```
//!
//! The worker parks on a [`Notify`] while idle; `enqueue` wakes it only when
//! no drain is running.  A clip that fails to decode or to start playing, or
//! a missing output context, empties the queue; the next `enqueue` starts a
//! fresh drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::audio::{OutputContext, OutputSlot, PlaybackError};

use super::sink::TextSink;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time copy of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStatsSnapshot {
    pub enqueued: u64,
    pub played: u64,
    /// Clips thrown away without playing (decode or play failure, or no
    /// output).
    pub discarded: u64,
    pub decode_failures: u64,
    /// Decoded clips the output device refused to start.
    pub play_failures: u64,
    /// Highest number of clips ever decoding/playing at the same time.
    pub max_in_flight: usize,
}

#[derive(Debug, Default)]
struct PlaybackStats {
    enqueued: AtomicU64,
    played: AtomicU64,
    discarded: AtomicU64,
    decode_failures: AtomicU64,
    play_failures: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

// ---------------------------------------------------------------------------
// Shared queue state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Vec<u8>>,
    /// True while the worker owns consumption of `pending`.
    draining: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    stats: PlaybackStats,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Empty the queue and end the drain.  Returns how many items were
    /// dropped.
    fn abandon(&self) -> usize {
        let mut st = self.state();
        let dropped = st.pending.len();
        st.pending.clear();
        st.draining = false;
        dropped
    }

    async fn drain(&self, output: &OutputSlot, sink: &dyn TextSink) {
        loop {
            let item = {
                let mut st = self.state();
                match st.pending.pop_front() {
                    Some(item) => item,
                    None => {
                        st.draining = false;
                        return;
                    }
                }
            };

            let Some(context) = output.current() else {
                let dropped = self.abandon() + 1;
                self.stats
                    .discarded
                    .fetch_add(dropped as u64, Ordering::Relaxed);
                log::warn!("playback: no output context, discarding {dropped} clip(s)");
                return;
            };

            let in_flight = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats
                .max_in_flight
                .fetch_max(in_flight, Ordering::SeqCst);
            let result = self.play_one(context.as_ref(), item).await;
            self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Err(e) = result {
                let dropped = self.abandon();
                let counter = match e {
                    PlaybackError::DecodeError(_) => &self.stats.decode_failures,
                    _ => &self.stats.play_failures,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .discarded
                    .fetch_add(dropped as u64 + 1, Ordering::Relaxed);
                log::error!("playback: {e}; cleared {dropped} pending clip(s)");
                sink.error(&format!("audio playback failed: {e}"));
                return;
            }
        }
    }

    async fn play_one(
        &self,
        context: &dyn OutputContext,
        item: Vec<u8>,
    ) -> Result<(), PlaybackError> {
        let clip = context.decode(item).await?;
        let duration = clip.duration();
        context.play(clip).await?;
        self.stats.played.fetch_add(1, Ordering::Relaxed);
        log::debug!("playback: clip started ({} ms)", duration.as_millis());
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PlaybackQueue
// ---------------------------------------------------------------------------

/// Strictly ordered, self-draining playback queue.
///
/// Dropping the queue aborts the worker; a clip already handed to the output
/// keeps playing.
pub struct PlaybackQueue {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl PlaybackQueue {
    /// Spawn the drain worker.  Must be called from inside a tokio runtime.
    ///
    /// `output` is read once per drain iteration; `sink` receives a line
    /// whenever a clip fails and the queue is cleared.
    pub fn spawn(output: OutputSlot, sink: Arc<dyn TextSink>) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                loop {
                    shared.wake.notified().await;
                    shared.drain(&output, sink.as_ref()).await;
                }
            }
        });
        Self { shared, worker }
    }

    /// Append an encoded clip; takes ownership of the bytes.
    pub fn enqueue(&self, bytes: Vec<u8>) {
        self.shared.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        let start = {
            let mut st = self.shared.state();
            st.pending.push_back(bytes);
            !std::mem::replace(&mut st.draining, true)
        };
        if start {
            self.shared.wake.notify_one();
        }
    }

    pub fn is_draining(&self) -> bool {
        self.shared.state().draining
    }

    /// Clips waiting behind the one currently playing.
    pub fn pending(&self) -> usize {
        self.shared.state().pending.len()
    }

    pub fn stats(&self) -> PlaybackStatsSnapshot {
        let s = &self.shared.stats;
        PlaybackStatsSnapshot {
            enqueued: s.enqueued.load(Ordering::Relaxed),
            played: s.played.load(Ordering::Relaxed),
            discarded: s.discarded.load(Ordering::Relaxed),
            decode_failures: s.decode_failures.load(Ordering::Relaxed),
            play_failures: s.play_failures.load(Ordering::Relaxed),
            max_in_flight: s.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::{sleep, Instant};

    use super::*;
    use crate::audio::DecodedClip;
    use crate::pipeline::sink::{RecordingSink, Severity};

    const BAD: u8 = 0xEE;
    /// Decodes fine; the output refuses to start it.
    const UNPLAYABLE: u8 = 0xEF;

    /// Output double: clip `id` decodes after a scripted latency into a clip
    /// of a scripted length; play start times are recorded.
    #[derive(Default)]
    struct ScriptedOutput {
        script: HashMap<u8, (u64, usize)>,
        starts: Mutex<Vec<(u8, Instant)>>,
    }

    impl ScriptedOutput {
        /// `(id, decode_ms, duration_ms)`
        fn new(entries: &[(u8, u64, usize)]) -> Arc<Self> {
            Arc::new(Self {
                script: entries.iter().map(|&(id, d, len)| (id, (d, len))).collect(),
                starts: Mutex::default(),
            })
        }

        fn starts(&self) -> Vec<(u8, Instant)> {
            self.starts.lock().unwrap().clone()
        }

        fn order(&self) -> Vec<u8> {
            self.starts().into_iter().map(|(id, _)| id).collect()
        }
    }

    #[async_trait]
    impl OutputContext for ScriptedOutput {
        async fn decode(&self, bytes: Vec<u8>) -> Result<DecodedClip, PlaybackError> {
            let id = bytes[0];
            if id == BAD {
                return Err(PlaybackError::DecodeError("bad header".into()));
            }
            let (decode_ms, duration_ms) = self.script[&id];
            sleep(Duration::from_millis(decode_ms)).await;
            // 1 kHz mono: one sample per millisecond; first sample carries the id.
            let mut samples = vec![0.0; duration_ms.max(1)];
            samples[0] = id as f32;
            Ok(DecodedClip {
                samples,
                sample_rate: 1_000,
                channels: 1,
            })
        }

        async fn play(&self, clip: DecodedClip) -> Result<(), PlaybackError> {
            if clip.samples[0] as u8 == UNPLAYABLE {
                return Err(PlaybackError::Stream("device unplugged".into()));
            }
            self.starts
                .lock()
                .unwrap()
                .push((clip.samples[0] as u8, Instant::now()));
            Ok(())
        }
    }

    fn queue_with(output: Option<Arc<ScriptedOutput>>) -> (PlaybackQueue, OutputSlot, Arc<RecordingSink>) {
        let slot = OutputSlot::new();
        if let Some(output) = output {
            slot.install(output);
        }
        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::spawn(slot.clone(), sink.clone());
        (queue, slot, sink)
    }

    async fn settle() {
        sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn plays_in_arrival_order_without_overlap() {
        // Decode latencies deliberately shrink so a parallel design would
        // reorder them.
        let output = ScriptedOutput::new(&[(1, 30, 100), (2, 5, 50), (3, 10, 20)]);
        let (queue, _slot, _sink) = queue_with(Some(output.clone()));

        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        queue.enqueue(vec![3]);
        settle().await;

        assert_eq!(output.order(), vec![1, 2, 3]);
        let starts = output.starts();
        assert!(starts[1].1 >= starts[0].1 + Duration::from_millis(100));
        assert!(starts[2].1 >= starts[1].1 + Duration::from_millis(50));
        // The gap is the duration plus the next clip's decode latency.
        assert!(starts[1].1 - starts[0].1 < Duration::from_millis(110));
        assert_eq!(queue.stats().played, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_during_drain_does_not_start_a_second_worker() {
        let output = ScriptedOutput::new(&[(1, 20, 200), (2, 0, 50), (3, 40, 10), (4, 1, 1)]);
        let (queue, _slot, _sink) = queue_with(Some(output.clone()));

        queue.enqueue(vec![1]);
        sleep(Duration::from_millis(50)).await;
        assert!(queue.is_draining());

        queue.enqueue(vec![2]);
        queue.enqueue(vec![3]);
        sleep(Duration::from_millis(5)).await;
        queue.enqueue(vec![4]);
        assert_eq!(queue.pending(), 3);

        settle().await;
        assert_eq!(output.order(), vec![1, 2, 3, 4]);
        assert_eq!(queue.stats().max_in_flight, 1);
        assert!(!queue.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn goes_idle_and_restarts_on_next_enqueue() {
        let output = ScriptedOutput::new(&[(1, 1, 10), (2, 1, 10)]);
        let (queue, _slot, _sink) = queue_with(Some(output.clone()));

        queue.enqueue(vec![1]);
        settle().await;
        assert!(!queue.is_draining());
        assert_eq!(queue.pending(), 0);

        queue.enqueue(vec![2]);
        settle().await;
        assert_eq!(output.order(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_error_clears_the_remaining_queue() {
        let output = ScriptedOutput::new(&[(1, 5, 100), (3, 1, 10), (4, 1, 10), (5, 1, 10)]);
        let (queue, _slot, sink) = queue_with(Some(output.clone()));

        queue.enqueue(vec![1]);
        queue.enqueue(vec![BAD]);
        queue.enqueue(vec![3]);
        queue.enqueue(vec![4]);
        settle().await;

        assert_eq!(output.order(), vec![1]);
        let stats = queue.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.discarded, 3);
        assert!(!queue.is_draining());

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Severity::Error);
        assert!(lines[0].1.contains("bad header"));

        // A fresh drain starts on the next enqueue.
        queue.enqueue(vec![5]);
        settle().await;
        assert_eq!(output.order(), vec![1, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn play_failure_is_reported_and_clears_the_queue() {
        let output = ScriptedOutput::new(&[
            (1, 1, 50),
            (UNPLAYABLE, 1, 50),
            (3, 1, 10),
            (4, 1, 10),
        ]);
        let (queue, _slot, sink) = queue_with(Some(output.clone()));

        queue.enqueue(vec![1]);
        queue.enqueue(vec![UNPLAYABLE]);
        queue.enqueue(vec![3]);
        settle().await;

        assert_eq!(output.order(), vec![1]);
        assert_eq!(queue.pending(), 0);
        assert!(!queue.is_draining());
        let stats = queue.stats();
        assert_eq!(stats.played, 1);
        assert_eq!(stats.play_failures, 1);
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(stats.discarded, 2);

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Severity::Error);
        assert_eq!(
            lines[0].1,
            "audio playback failed: audio output stream error: device unplugged"
        );

        queue.enqueue(vec![4]);
        settle().await;
        assert_eq!(output.order(), vec![1, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_output_discards_everything() {
        let (queue, slot, _sink) = queue_with(None);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        queue.enqueue(vec![3]);
        settle().await;

        let stats = queue.stats();
        assert_eq!(stats.played, 0);
        assert_eq!(stats.discarded, 3);
        assert!(!queue.is_draining());

        let output = ScriptedOutput::new(&[(4, 1, 10)]);
        slot.install(output.clone());
        queue.enqueue(vec![4]);
        settle().await;
        assert_eq!(output.order(), vec![4]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_mid_drain_truncates_after_current_clip() {
        let output = ScriptedOutput::new(&[(1, 1, 500), (2, 1, 10), (3, 1, 10)]);
        let (queue, slot, _sink) = queue_with(Some(output.clone()));

        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        queue.enqueue(vec![3]);
        sleep(Duration::from_millis(100)).await;
        slot.teardown();
        settle().await;

        assert_eq!(output.order(), vec![1]);
        let stats = queue.stats();
        assert_eq!(stats.played, 1);
        assert_eq!(stats.discarded, 2);
    }
}
