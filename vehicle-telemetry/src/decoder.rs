//! Frame decoder
//!
//! Turns raw field-bus frames into typed measurement events. Only the speed
//! (0x100) and gear (0x102) frames are recognized; everything else on the shared
//! bus is routine traffic and is skipped without error.

use crate::types::{
    DecodedEvent, GearMeasurement, RawFrame, Result, SpeedMeasurement, GEAR_FRAME_ID,
    SPEED_FRAME_ID,
};
use byteorder::{BigEndian, ByteOrder};

/// Stateless decoder for the frames this vehicle cares about
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a single frame
    ///
    /// # Returns
    /// * `Some(DecodedEvent::Speed)` for ID 0x100 with at least 2 bytes
    /// * `Some(DecodedEvent::Gear)` for ID 0x102 with at least 1 byte
    /// * `None` for any other ID or a payload that is too short
    ///
    /// # Example
    /// ```
    /// use vehicle_telemetry::{DecodedEvent, FrameDecoder, RawFrame};
    /// use std::time::Instant;
    ///
    /// let frame = RawFrame::new(0x100, vec![0x04, 0xD2], Instant::now()).unwrap();
    /// match FrameDecoder::new().decode(&frame) {
    ///     Some(DecodedEvent::Speed(m)) => assert_eq!(m.value, 1234.0),
    ///     other => panic!("unexpected {:?}", other),
    /// }
    /// ```
    pub fn decode(&self, frame: &RawFrame) -> Option<DecodedEvent> {
        match frame.can_id {
            SPEED_FRAME_ID => Self::decode_speed(frame),
            GEAR_FRAME_ID => Self::decode_gear(frame),
            other => {
                log::trace!("Ignoring CAN ID 0x{:X} ({} bytes)", other, frame.dlc());
                None
            }
        }
    }

    /// Decode a lazy stream of frames, skipping unrecognized ones
    pub fn decode_frames<I>(&self, frames: I) -> DecodingIterator<I>
    where
        I: Iterator<Item = Result<RawFrame>>,
    {
        DecodingIterator::new(frames, *self)
    }

    fn decode_speed(frame: &RawFrame) -> Option<DecodedEvent> {
        if frame.data.len() < 2 {
            log::debug!(
                "Speed frame too short: {} bytes (need 2)",
                frame.data.len()
            );
            return None;
        }

        // Unsigned 16-bit, MSB first
        let raw = BigEndian::read_u16(&frame.data[..2]);
        Some(DecodedEvent::Speed(SpeedMeasurement {
            value: f64::from(raw),
            timestamp: frame.timestamp,
        }))
    }

    fn decode_gear(frame: &RawFrame) -> Option<DecodedEvent> {
        let byte = *frame.data.first()?;
        // A zeroed payload means the selector has not reported yet
        let code = if byte == 0 { 'P' } else { char::from(byte) };
        Some(DecodedEvent::Gear(GearMeasurement { code }))
    }
}

/// Iterator that decodes raw frames into events
///
/// Wraps a frame iterator and yields one event per recognized frame. Upstream
/// read errors are passed through so the caller can decide whether to stop.
pub struct DecodingIterator<I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    frame_iter: I,
    decoder: FrameDecoder,
}

impl<I> DecodingIterator<I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    fn new(frame_iter: I, decoder: FrameDecoder) -> Self {
        Self {
            frame_iter,
            decoder,
        }
    }
}

impl<I> Iterator for DecodingIterator<I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    type Item = Result<DecodedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.frame_iter.next()? {
                Ok(frame) => {
                    if let Some(event) = self.decoder.decode(&frame) {
                        return Some(Ok(event));
                    }
                    // No event generated, get next frame
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelemetryError;
    use std::time::Instant;

    fn frame(can_id: u32, data: &[u8]) -> RawFrame {
        RawFrame::new(can_id, data.to_vec(), Instant::now()).unwrap()
    }

    #[test]
    fn test_decode_speed_big_endian() {
        let decoder = FrameDecoder::new();
        match decoder.decode(&frame(0x100, &[0x04, 0xD2])) {
            Some(DecodedEvent::Speed(m)) => assert_eq!(m.value, 1234.0),
            other => panic!("expected speed, got {:?}", other),
        }

        // Extra bytes are ignored
        match decoder.decode(&frame(0x100, &[0xFF, 0xFF, 0x12, 0x34])) {
            Some(DecodedEvent::Speed(m)) => assert_eq!(m.value, 65535.0),
            other => panic!("expected speed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_gear() {
        let decoder = FrameDecoder::new();
        assert_eq!(
            decoder.decode(&frame(0x102, &[0x44])),
            Some(DecodedEvent::Gear(GearMeasurement { code: 'D' }))
        );
        assert_eq!(
            decoder.decode(&frame(0x102, &[0x00])),
            Some(DecodedEvent::Gear(GearMeasurement { code: 'P' }))
        );
        // Values are taken as-is; validation happens in the state machine
        assert_eq!(
            decoder.decode(&frame(0x102, &[b'X'])),
            Some(DecodedEvent::Gear(GearMeasurement { code: 'X' }))
        );
    }

    #[test]
    fn test_short_and_unknown_frames() {
        let decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&frame(0x100, &[0x04])), None);
        assert_eq!(decoder.decode(&frame(0x102, &[])), None);
        assert_eq!(decoder.decode(&frame(0x101, &[1, 2, 3])), None);
        assert_eq!(decoder.decode(&frame(0x18FF_0100, &[0x04, 0xD2])), None);
    }

    #[test]
    fn test_decoding_iterator_skips_and_propagates() {
        let frames = vec![
            Ok(frame(0x200, &[1])),
            Ok(frame(0x100, &[0x00, 0x0A])),
            Err(TelemetryError::ReadFailure("bus off".to_string())),
            Ok(frame(0x102, &[b'R'])),
        ];

        let events: Vec<_> = FrameDecoder::new().decode_frames(frames.into_iter()).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Ok(DecodedEvent::Speed(m)) if m.value == 10.0));
        assert!(events[1].is_err());
        assert!(matches!(
            events[2],
            Ok(DecodedEvent::Gear(GearMeasurement { code: 'R' }))
        ));
    }
}
