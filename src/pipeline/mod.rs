//! Client pipeline — everything between the connection and the user.
//!
//! # Architecture
//!
//! ```text
//! Microphone ─▶ CaptureChannel ─AudioInput─▶ ConnectionManager ─▶ server
//!
//! server ─▶ ConnectionManager ─LinkEvent─▶ Session::pump
//!                                           │
//!                                           ▼
//!                                      EventRouter
//!                        ┌──────────────────┼───────────────────┐
//!                  0x02 transcribe    0x03 synthesize     0x04 generation
//!                        │                  │                   │
//!                        ▼                  ▼                   ▼
//!                     TextSink        PlaybackQueue          TextSink
//!                                    (one clip at a time)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cameron_client::audio::{CpalBackend, OutputSlot};
//! use cameron_client::config::AppConfig;
//! use cameron_client::connection::WsConnector;
//! use cameron_client::pipeline::{LogSink, Session};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let mut session = Session::new(
//!         &config,
//!         Arc::new(WsConnector),
//!         Some(OutputSlot::new()),
//!         Arc::new(LogSink),
//!     );
//!     session.connect();
//!     let _capture = session.start_capture(&CpalBackend::new(None));
//!
//!     session
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     println!("{}", session.close().await.summary());
//! }
//! ```

pub mod capture;
pub mod playback;
pub mod router;
pub mod runner;
pub mod sink;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use capture::{CaptureChannel, CaptureStatsSnapshot, CaptureStream, Delivery};
pub use playback::{PlaybackQueue, PlaybackStatsSnapshot};
pub use router::{EventRouter, Routed};
pub use runner::Session;
pub use sink::{LogSink, Severity, TextSink};
pub use state::SessionStats;
