// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sandbox transport codec.
//!
//! Frames are newline-terminated JSON objects. A malformed line is dropped
//! (logged, never surfaced as a stream error) so one bad frame cannot
//! disturb other pending calls. Oversized frames are a hard error.

use crate::core::constants::limits;
use crate::core::models::WireRequest;
use anyhow::{anyhow, Result};
use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                if src.len() as u64 > limits::MAX_FRAME_SIZE_BYTES {
                    return Err(anyhow!(
                        "frame exceeds size limit of {} bytes",
                        limits::MAX_FRAME_SIZE_BYTES
                    ));
                }
                return Ok(None);
            };

            let line = src.split_to(newline + 1);
            let trimmed: &[u8] = line[..newline].strip_suffix(b"\r").unwrap_or(&line[..newline]);
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_slice::<Value>(trimmed) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    warn!(error = %e, "dropping malformed sandbox frame");
                    continue;
                }
            }
        }
    }
}

impl<'a> Encoder<&'a WireRequest> for FrameCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: &'a WireRequest, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(item)?;
        dst.extend_from_slice(&body);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_one_frame_per_line() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"id\":\"a\",\"ok\":true}\n{\"id\":\"b\",\"ok\":false}\n"[..]);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first["id"], "a");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second["id"], "b");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn incomplete_line_yields_none() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"id\":\"a\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"not json at all\n{\"id\":\"ok\"}\n"[..]);
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value["id"], "ok");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"\n\r\n{\"id\":1}\n"[..]);
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn encoder_terminates_with_newline() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let req = WireRequest {
            id: serde_json::Value::String("x".into()),
            method: "healthcheck".into(),
            params: None,
        };
        codec.encode(&req, &mut buf).unwrap();
        assert!(buf.ends_with(b"\n"));
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
    }
}
