//! Application layer: the connection lifecycle, independent of any websocket
//! library.
//!
//! - **`signal`** – one-shot completion / stop signals.
//! - **`transport`** – the `FrameReader` / `FrameControl` traits the lifecycle
//!   runs over. The infrastructure layer implements them.
//! - **`keepalive`** – ping responder and liveness watchdog.
//! - **`session`** – read loop and shutdown coordination.

pub mod keepalive;
pub mod session;
pub mod signal;
pub mod transport;

pub use session::run_connection;
pub use signal::{DoneSignal, StopHandle};
pub use transport::{Connection, Frame, FrameControl, FrameReader};
