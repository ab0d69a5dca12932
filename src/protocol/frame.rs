use std::collections::VecDeque;

/// Uplink frame shape: `preamble | can_id (u16 LE) | payload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub preamble: Vec<u8>,
    pub payload_len: usize,
}

impl FrameLayout {
    pub fn body_len(&self) -> usize {
        2 + self.payload_len
    }

    /// Encode a frame with this layout (used by tests and simulators).
    pub fn encode(&self, can_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.preamble.len() + self.body_len());
        bytes.extend_from_slice(&self.preamble);
        bytes.extend_from_slice(&can_id.to_le_bytes());
        let mut body = payload.to_vec();
        body.resize(self.payload_len, 0);
        bytes.extend_from_slice(&body);
        bytes
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            preamble: b"GT".to_vec(),
            payload_len: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub can_id: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    ScanningPreamble,
    InFrame,
}

/// Byte-at-a-time frame parser. One instance per stream.
#[derive(Debug)]
pub struct FrameDecoder {
    layout: FrameLayout,
    state: DecoderState,
    window: VecDeque<u8>,
    body: Vec<u8>,
    ready: Option<Frame>,
}

impl FrameDecoder {
    pub fn new(layout: FrameLayout) -> Self {
        let window = VecDeque::with_capacity(layout.preamble.len());
        let body = Vec::with_capacity(layout.body_len());
        Self {
            layout,
            state: DecoderState::ScanningPreamble,
            window,
            body,
            ready: None,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Advance the state machine by one byte.
    ///
    /// Returns true when `byte` completed a frame; the frame is then
    /// available through `take_frame` until the next completion.
    pub fn push(&mut self, byte: u8) -> bool {
        match self.state {
            DecoderState::ScanningPreamble => {
                self.window.push_back(byte);
                if self.window.len() == self.layout.preamble.len() {
                    if self.window.iter().eq(self.layout.preamble.iter()) {
                        self.window.clear();
                        self.body.clear();
                        self.state = DecoderState::InFrame;
                    } else {
                        self.window.pop_front();
                    }
                }
                false
            }
            DecoderState::InFrame => {
                self.body.push(byte);
                if self.body.len() < self.layout.body_len() {
                    return false;
                }
                self.ready = Some(Frame {
                    can_id: u16::from_le_bytes([self.body[0], self.body[1]]),
                    payload: self.body[2..].to_vec(),
                });
                self.body.clear();
                self.state = DecoderState::ScanningPreamble;
                true
            }
        }
    }

    pub fn take_frame(&mut self) -> Option<Frame> {
        self.ready.take()
    }

    /// Feed a buffer and collect every frame it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.push(byte) {
                frames.extend(self.take_frame());
            }
        }
        frames
    }

    pub fn reset(&mut self) {
        self.state = DecoderState::ScanningPreamble;
        self.window.clear();
        self.body.clear();
        self.ready = None;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameLayout::default())
    }
}
