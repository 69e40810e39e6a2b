// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io::Write;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::lighting::types::LightFrame;

/// Receives the composed frame once per tick. Mapping colours onto DMX channels or any
/// other transport happens behind this boundary.
pub trait OutputSink: Send + Sync {
    fn publish(&self, frame: &LightFrame);
}

/// Traces every frame.
#[derive(Debug, Default)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn publish(&self, frame: &LightFrame) {
        for (light, color) in frame {
            trace!(
                light,
                red = color.red,
                green = color.green,
                blue = color.blue,
                intensity = color.intensity,
                "Light output"
            );
        }
    }
}

/// Forwards frames over a channel so another thread can consume them.
pub struct ChannelSink {
    sender: Sender<LightFrame>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    pub fn new() -> (ChannelSink, Receiver<LightFrame>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelSink { sender }, receiver)
    }
}

impl OutputSink for ChannelSink {
    fn publish(&self, frame: &LightFrame) {
        if self.sender.send(frame.clone()).is_err() {
            debug!("Frame receiver is gone, dropping frame");
        }
    }
}

/// Writes each frame as one line of JSON.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> JsonLinesSink<W> {
        JsonLinesSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> OutputSink for JsonLinesSink<W> {
    fn publish(&self, frame: &LightFrame) {
        let mut writer = self.writer.lock();
        let result = serde_json::to_writer(&mut *writer, frame)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = result {
            error!(err = e.to_string(), "Error writing frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::types::Rgbio;

    fn frame() -> LightFrame {
        LightFrame::from([("front-1".to_string(), Rgbio::new(255, 0, 0))])
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, receiver) = ChannelSink::new();
        sink.publish(&frame());
        assert_eq!(receiver.try_recv().unwrap(), frame());

        drop(receiver);
        // Publishing without a receiver is not an error.
        sink.publish(&frame());
    }

    #[test]
    fn test_json_lines() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.publish(&frame());
        sink.publish(&frame());

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["front-1"]["red"], 255);
        assert_eq!(parsed["front-1"]["blend_mode"], "replace");
    }
}
