//! Inbound frame dispatch.

use std::sync::Arc;

use crate::protocol::{Frame, FrameKind};

use super::playback::PlaybackQueue;
use super::sink::TextSink;

/// Which handler a frame went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Text,
    Playback,
    Ignored,
}

/// Sends each decoded frame to exactly one handler based on its kind.
pub struct EventRouter {
    sink: Arc<dyn TextSink>,
    playback: Option<PlaybackQueue>,
}

impl EventRouter {
    /// `playback == None` disables audio output; synthesized clips are then
    /// ignored like unknown frames.
    pub fn new(sink: Arc<dyn TextSink>, playback: Option<PlaybackQueue>) -> Self {
        Self { sink, playback }
    }

    pub fn route(&self, frame: Frame) -> Routed {
        match frame.kind {
            FrameKind::AudioTranscribeResult => {
                let text = String::from_utf8_lossy(&frame.payload);
                self.sink.info(&format!("transcribe result: {text}"));
                Routed::Text
            }
            FrameKind::ModelGenerationResult => {
                let text = String::from_utf8_lossy(&frame.payload);
                self.sink.info(&format!("generation result: {text}"));
                Routed::Text
            }
            FrameKind::AudioSynthesizeResult => match &self.playback {
                Some(queue) => {
                    queue.enqueue(frame.payload);
                    Routed::Playback
                }
                None => Routed::Ignored,
            },
            // Client → server only; a server echoing it is ignored.
            FrameKind::AudioInput | FrameKind::Unknown(_) => {
                log::debug!("router: ignoring {:?} frame", frame.kind);
                Routed::Ignored
            }
        }
    }

    pub fn playback(&self) -> Option<&PlaybackQueue> {
        self.playback.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OutputSlot;
    use crate::pipeline::sink::{RecordingSink, Severity};

    fn text_router() -> (EventRouter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (EventRouter::new(sink.clone(), None), sink)
    }

    #[test]
    fn transcribe_result_goes_to_the_sink() {
        let (router, sink) = text_router();
        let routed = router.route(Frame::new(
            FrameKind::AudioTranscribeResult,
            b"hello".to_vec(),
        ));
        assert_eq!(routed, Routed::Text);
        assert_eq!(
            sink.lines(),
            vec![(Severity::Info, "transcribe result: hello".to_string())]
        );
    }

    #[test]
    fn generation_result_goes_to_the_sink() {
        let (router, sink) = text_router();
        router.route(Frame::new(
            FrameKind::ModelGenerationResult,
            "สวัสดี".as_bytes().to_vec(),
        ));
        assert_eq!(sink.messages(), vec!["generation result: สวัสดี"]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let (router, sink) = text_router();
        router.route(Frame::new(
            FrameKind::AudioTranscribeResult,
            vec![b'o', 0xFF, b'k'],
        ));
        assert_eq!(sink.messages(), vec!["transcribe result: o\u{FFFD}k"]);
    }

    #[test]
    fn unknown_kinds_are_a_silent_noop() {
        let (router, sink) = text_router();
        let routed = router.route(Frame::new(FrameKind::Unknown(0xFF), vec![1, 2, 3]));
        assert_eq!(routed, Routed::Ignored);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn echoed_audio_input_is_ignored() {
        let (router, sink) = text_router();
        assert_eq!(
            router.route(Frame::new(FrameKind::AudioInput, vec![0, 0])),
            Routed::Ignored
        );
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn synthesized_audio_without_playback_is_ignored() {
        let (router, _sink) = text_router();
        assert_eq!(
            router.route(Frame::new(FrameKind::AudioSynthesizeResult, vec![1])),
            Routed::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn synthesized_audio_is_enqueued() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::spawn(OutputSlot::new(), sink.clone());
        let router = EventRouter::new(sink, Some(queue));

        let routed = router.route(Frame::new(FrameKind::AudioSynthesizeResult, vec![1, 2]));
        assert_eq!(routed, Routed::Playback);
        assert_eq!(router.playback().unwrap().stats().enqueued, 1);
    }
}
