//! UART-Style Frame Parser
//!
//! Decodes the `[SYNC] [LEN] [LEN payload bytes] [CRC8]` wire format.
//! Bytes before a sync are discarded; an oversized length or a bad CRC
//! resyncs the state machine without halting the stream.

use std::collections::VecDeque;
use tracing::debug;

use crate::crc::crc8_update;
use crate::measurement::Measurement;
use crate::wire::{MAX_PAYLOAD_LEN, SYNC};
use crate::FrameParser;

/// Parsing phase of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    WaitSync,
    ReadLen,
    ReadPayload,
    ReadCrc,
}

/// Stateful decoder for the sync/length/payload/CRC protocol
pub struct UartFrameParser {
    state: ParseState,
    /// Declared payload length of the frame in progress
    payload_len: usize,
    /// Payload accumulator for the frame in progress
    payload: Vec<u8>,
    /// Running CRC register, reset on each sync
    crc_acc: u8,
    /// Completed frames awaiting extraction
    frames: VecDeque<Measurement>,
    error_count: usize,
    dropped_frames: usize,
}

impl UartFrameParser {
    /// Completed frames the parser will hold before dropping new ones
    pub const FRAME_FIFO_CAPACITY: usize = 4;

    /// Create a parser waiting for its first sync byte
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitSync,
            payload_len: 0,
            payload: Vec::new(),
            crc_acc: 0,
            frames: VecDeque::new(),
            error_count: 0,
            dropped_frames: 0,
        }
    }

    /// Queue the completed payload, or drop it if the FIFO is full.
    fn publish_frame(&mut self) {
        if self.frames.len() < Self::FRAME_FIFO_CAPACITY {
            let payload = std::mem::take(&mut self.payload);
            self.frames.push_back(Measurement::from_payload(payload));
        } else {
            self.dropped_frames += 1;
            debug!(dropped = self.dropped_frames, "frame FIFO full, dropping valid frame");
        }
    }
}

impl Default for UartFrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser for UartFrameParser {
    fn feed_bytes(&mut self, chunk: &[u8]) {
        let mut index = 0;
        while index < chunk.len() {
            let byte = chunk[index];
            index += 1;

            match self.state {
                ParseState::WaitSync => {
                    if byte == SYNC {
                        self.crc_acc = 0;
                        self.state = ParseState::ReadLen;
                    }
                }

                ParseState::ReadLen => {
                    let len = byte as usize;
                    if len > MAX_PAYLOAD_LEN {
                        debug!(len, "oversized payload length, resyncing");
                        self.state = ParseState::WaitSync;
                        continue;
                    }
                    self.payload_len = len;
                    self.payload.clear();
                    self.payload.reserve(len);
                    // A zero-length frame has no payload bytes; the next
                    // byte is already the CRC.
                    self.state = if len == 0 {
                        ParseState::ReadCrc
                    } else {
                        ParseState::ReadPayload
                    };
                }

                ParseState::ReadPayload => {
                    self.crc_acc = crc8_update(self.crc_acc, byte);
                    self.payload.push(byte);
                    if self.payload.len() == self.payload_len {
                        self.state = ParseState::ReadCrc;
                    }
                }

                ParseState::ReadCrc => {
                    if byte == self.crc_acc {
                        self.publish_frame();
                    } else {
                        self.error_count += 1;
                        debug!(
                            expected = self.crc_acc,
                            received = byte,
                            "CRC mismatch, discarding frame"
                        );
                    }
                    self.crc_acc = 0;
                    self.state = ParseState::WaitSync;
                }
            }
        }
    }

    fn has_frame(&self) -> bool {
        !self.frames.is_empty()
    }

    fn extract_frame(&mut self) -> Measurement {
        self.frames
            .pop_front()
            .expect("extract_frame called with no completed frame")
    }

    fn error_count(&self) -> usize {
        self.error_count
    }

    fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }
}
