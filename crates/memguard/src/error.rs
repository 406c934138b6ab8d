use thiserror::Error;

/// Misuse of the frame capture window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// `begin_frame` was called while a frame was already open.
    #[error("a frame is already open; nested frames are not supported")]
    AlreadyOpen,

    /// `end_frame` was called without a matching `begin_frame`.
    #[error("end_frame called without an open frame")]
    NotOpen,
}
